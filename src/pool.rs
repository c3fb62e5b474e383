//! Fixed-granularity object pool with generation-checked handles

use std::{
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    sync::atomic::{AtomicU32, Ordering},
};

/// Counter used to give every pool (and every pool generation after `drain`) unique owner tag
static NEXT_POOL_OWNER: AtomicU32 = AtomicU32::new(1);

fn next_pool_owner() -> u32 {
    NEXT_POOL_OWNER.fetch_add(1, Ordering::Relaxed)
}

/// Handle of object allocated in some `Pool`
pub struct Handle<T> {
    /// Slot index
    index: u32,

    /// Slot generation at allocation moment
    generation: u32,

    /// Tag of pool this handle was produced by
    owner: u32,

    _phantom: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Slot index (unique among live objects of the pool)
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation && self.owner == other.owner
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
        self.owner.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{}@{})", self.index, self.generation, self.owner)
    }
}

enum Slot<T> {
    Occupied {
        value: T,
        generation: u32,
    },
    Free {
        next_free: Option<u32>,
        generation: u32,
    },
}

/// Allocation counters of the pool
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total count of allocations since creation
    pub total_allocs: usize,

    /// Total count of deallocations since creation (drained objects included)
    pub total_frees: usize,

    /// Count of currently alive objects
    pub objects_alive: usize,

    /// Count of allocated blocks
    pub block_count: usize,

    /// Objects per block
    pub granularity: usize,

    /// Size of single object in bytes
    pub object_size: usize,
}

/// Pool of `T` objects, grown by blocks of `GRANULARITY` slots.
///
/// Freed slots are reused through free list. Slots are never released
/// until `drain`, which invalidates every outstanding handle.
pub struct Pool<T, const GRANULARITY: usize> {
    slots: Vec<Slot<T>>,
    first_free: Option<u32>,
    owner: u32,
    total_allocs: usize,
    total_frees: usize,
    objects_alive: usize,
}

impl<T, const GRANULARITY: usize> Pool<T, GRANULARITY> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            first_free: None,
            owner: next_pool_owner(),
            total_allocs: 0,
            total_frees: 0,
            objects_alive: 0,
        }
    }

    /// Add one more block of free slots to free list
    fn grow(&mut self) -> u32 {
        let start = self.slots.len();
        self.slots.reserve(GRANULARITY);

        for index in start..start + GRANULARITY {
            let next_free = if index + 1 < start + GRANULARITY {
                Some(index as u32 + 1)
            } else {
                self.first_free
            };

            self.slots.push(Slot::Free { next_free, generation: 0 });
        }

        start as u32
    }

    /// Place value into pool
    pub fn allocate(&mut self, value: T) -> Handle<T> {
        let index = match self.first_free {
            Some(index) => index,
            None => self.grow(),
        };

        let slot = &mut self.slots[index as usize];

        let (next_free, generation) = match *slot {
            Slot::Free { next_free, generation } => (next_free, generation),
            Slot::Occupied { .. } => unreachable!("occupied slot in pool free list"),
        };

        *slot = Slot::Occupied { value, generation };
        self.first_free = next_free;
        self.total_allocs += 1;
        self.objects_alive += 1;

        Handle { index, generation, owner: self.owner, _phantom: PhantomData }
    }

    /// Return object to the pool. Returns `None` if handle is stale.
    pub fn deallocate(&mut self, handle: Handle<T>) -> Option<T> {
        if !self.contains(handle) {
            return None;
        }

        let slot = std::mem::replace(
            &mut self.slots[handle.index as usize],
            Slot::Free {
                next_free: self.first_free,
                generation: handle.generation.wrapping_add(1),
            },
        );

        self.first_free = Some(handle.index);
        self.total_frees += 1;
        self.objects_alive -= 1;

        match slot {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Free { .. } => None,
        }
    }

    /// Check if handle references live object of this pool
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        if handle.owner != self.owner {
            return None;
        }

        match self.slots.get(handle.index as usize)? {
            Slot::Occupied { value, generation } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        if handle.owner != self.owner {
            return None;
        }

        match self.slots.get_mut(handle.index as usize)? {
            Slot::Occupied { value, generation } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    /// Destroy all objects and release every block.
    /// All handles produced before the call become invalid.
    pub fn drain(&mut self) {
        self.total_frees += self.objects_alive;
        self.objects_alive = 0;
        self.slots = Vec::new();
        self.first_free = None;
        self.owner = next_pool_owner();
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_allocs: self.total_allocs,
            total_frees: self.total_frees,
            objects_alive: self.objects_alive,
            block_count: self.slots.len() / GRANULARITY,
            granularity: GRANULARITY,
            object_size: std::mem::size_of::<T>(),
        }
    }
}

impl<T, const GRANULARITY: usize> Default for Pool<T, GRANULARITY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const GRANULARITY: usize> std::ops::Index<Handle<T>> for Pool<T, GRANULARITY> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &T {
        match self.get(handle) {
            Some(value) => value,
            None => panic!("stale or foreign pool handle {:?}", handle),
        }
    }
}

impl<T, const GRANULARITY: usize> std::ops::IndexMut<Handle<T>> for Pool<T, GRANULARITY> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        match self.get_mut(handle) {
            Some(value) => value,
            None => panic!("stale or foreign pool handle {:?}", handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_by_blocks() {
        let mut pool = Pool::<u32, 4>::new();

        let handles = (0..5).map(|i| pool.allocate(i)).collect::<Vec<_>>();

        assert_eq!(pool.stats().block_count, 2);
        assert_eq!(pool.stats().objects_alive, 5);
        assert_eq!(pool[handles[3]], 3);
        assert_eq!(handles.iter().map(|h| h.index()).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn freed_slot_is_reused_with_new_generation() {
        let mut pool = Pool::<&'static str, 8>::new();

        let first = pool.allocate("first");
        let _second = pool.allocate("second");

        assert_eq!(pool.deallocate(first), Some("first"));
        assert_eq!(pool.deallocate(first), None);

        let third = pool.allocate("third");
        assert_eq!(third.index(), first.index());
        assert_ne!(third, first);
        assert!(pool.get(first).is_none());
        assert_eq!(pool[third], "third");

        let stats = pool.stats();
        assert_eq!(stats.total_allocs, 3);
        assert_eq!(stats.total_frees, 1);
        assert_eq!(stats.objects_alive, 2);
        assert_eq!(stats.granularity, 8);
    }

    #[test]
    fn drain_invalidates_handles() {
        let mut pool = Pool::<u64, 2>::new();
        let handle = pool.allocate(42);

        pool.drain();

        assert!(pool.get(handle).is_none());
        assert_eq!(pool.stats().objects_alive, 0);
        assert_eq!(pool.stats().block_count, 0);

        let fresh = pool.allocate(7);
        assert_eq!(fresh.index(), handle.index());
        assert!(pool.get(handle).is_none());
        assert_eq!(pool[fresh], 7);
    }

    #[test]
    fn foreign_handle_is_rejected() {
        let mut a = Pool::<i32, 4>::new();
        let mut b = Pool::<i32, 4>::new();

        let handle = a.allocate(1);
        b.allocate(2);

        assert!(b.get(handle).is_none());
        assert!(b.get_mut(handle).is_none());
    }

    #[test]
    #[should_panic]
    fn stale_index_panics() {
        let mut pool = Pool::<i32, 4>::new();
        let handle = pool.allocate(1);
        pool.deallocate(handle);

        let _ = pool[handle];
    }
}
