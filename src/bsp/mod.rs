//! World BSP structure declaration module

use std::{num::NonZeroU32, path::Path};

use bytemuck::{Pod, Zeroable};

use crate::{
    config::{RenderFlags, WorldConfig},
    geom::{self, BoundBox},
    math::{Vec2f, Vec3f},
    pool::{Handle, Pool, PoolStats},
};

/// BSP tree building
pub mod compiler;

/// Portal generation and true portal resolution
pub mod portal;

/// Potentially visible set calculation
pub mod pvs;

/// Text world datafile parser
pub mod datafile;

pub use portal::Portal;

/// Generic id implementation
macro_rules! impl_id {
    ($name: ident) => {
        /// Unique identifier, 1-based
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Ord, PartialOrd)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Build id from zero-based index
            pub fn from_index(index: usize) -> Self {
                $name(NonZeroU32::MIN.saturating_add(index as u32))
            }

            /// Get zero-based index by id
            pub fn into_index(self) -> usize {
                self.0.get() as usize - 1
            }

            /// Get id numeric value
            pub fn get(self) -> u32 {
                self.0.get()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

impl_id!(LeafId);
impl_id!(PartitionId);
impl_id!(PortalId);

/// Polygon pool granularity
pub const POLYGON_POOL_GRANULARITY: usize = 256;

/// Node pool granularity
pub const NODE_POOL_GRANULARITY: usize = 256;

/// Portal pool granularity
pub const PORTAL_POOL_GRANULARITY: usize = 64;

pub type PolygonHandle = Handle<Polygon>;
pub type NodeHandle = Handle<BspNode>;
pub type PortalHandle = Handle<Portal>;

/// Shared world vertex buffer element
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DrawVertex {
    /// Position
    pub position: [f32; 3],

    /// Normal of polygon vertex belongs to
    pub normal: [f32; 3],

    /// Vertex color. World geometry stores barycentric corner marker here, portal overlay stores portal color.
    pub color: [f32; 4],

    /// Texture coordinates
    pub uv: [f32; 2],
}

unsafe impl Zeroable for DrawVertex {}
unsafe impl Pod for DrawVertex {}

impl DrawVertex {
    pub fn position(&self) -> Vec3f {
        Vec3f::from(self.position)
    }

    pub fn uv(&self) -> Vec2f {
        Vec2f::from(self.uv)
    }
}

/// Source triangle vertex
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TriangleVertex {
    /// Position
    pub position: Vec3f,

    /// Texture coordinates
    pub uv: Vec2f,
}

/// Triangle soup element
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Triangle {
    pub vertices: [TriangleVertex; 3],
}

impl Triangle {
    /// Build triangle without texture coordinates
    pub fn from_positions(p1: Vec3f, p2: Vec3f, p3: Vec3f) -> Self {
        let vertex = |position| TriangleVertex { position, uv: Vec2f::zero() };

        Self { vertices: [vertex(p1), vertex(p2), vertex(p3)] }
    }

    /// Build triangle from (x, y, z, u, v) vertex tuples
    pub fn from_xyzuv(data: [[f32; 5]; 3]) -> Self {
        Self {
            vertices: data.map(|[x, y, z, u, v]| TriangleVertex {
                position: Vec3f::new(x, y, z),
                uv: Vec2f::new(u, v),
            }),
        }
    }
}

/// World polygon (triangle). References range of shared world vertex buffer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Polygon {
    /// Polygon plane
    pub plane: geom::Plane,

    /// Index of first vertex in world vertex buffer
    pub first_vertex: usize,

    /// Count of polygon vertices (always 3)
    pub vertex_count: usize,
}

impl Polygon {
    /// Vertex buffer range
    pub fn vertex_range(&self) -> std::ops::Range<usize> {
        self.first_vertex..self.first_vertex + self.vertex_count
    }
}

/// BSP node kind
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// Node that still holds unprocessed polygon list
    Unresolved,

    /// Space partition
    Partition {
        /// Partition identifier
        id: PartitionId,

        /// Plane that splits front/back subtrees. Front subtree is located in front of plane.
        plane: geom::Plane,

        /// Front subtree
        front: NodeHandle,

        /// Back subtree
        back: NodeHandle,
    },

    /// Final convex cell
    Leaf {
        /// Leaf identifier
        id: LeafId,
    },
}

/// BSP tree node
#[derive(Clone, Debug)]
pub struct BspNode {
    /// Node kind
    pub kind: NodeKind,

    /// Polygons (leaves and unresolved nodes only)
    pub polygons: Vec<PolygonHandle>,

    /// Portals (leaves only)
    pub portals: Vec<PortalHandle>,

    /// Number of last frame this node was marked visible at
    pub vis_frame: u32,
}

impl BspNode {
    /// Build unresolved node
    pub fn unresolved(polygons: Vec<PolygonHandle>) -> Self {
        Self {
            kind: NodeKind::Unresolved,
            polygons,
            portals: Vec::new(),
            vis_frame: 0,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Leaf identifier (if node is leaf)
    pub fn leaf_id(&self) -> Option<LeafId> {
        match self.kind {
            NodeKind::Leaf { id } => Some(id),
            _ => None,
        }
    }

    /// Partition plane (if node is partition)
    pub fn partition_plane(&self) -> Option<geom::Plane> {
        match self.kind {
            NodeKind::Partition { plane, .. } => Some(plane),
            _ => None,
        }
    }
}

/// World construction counters
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Count of input triangles
    pub input_triangles: usize,

    /// Count of input triangles without valid plane
    pub degenerate_triangles: usize,

    /// Polygons placed to node child by on-plane rule
    pub polygons_on_plane: usize,

    /// Polygons placed to front child
    pub polygons_front: usize,

    /// Polygons placed to back child
    pub polygons_back: usize,

    /// Polygons split by partition plane
    pub polygons_spanning: usize,

    /// Triangles produced by polygon splitting
    pub fragments_created: usize,

    /// Partition candidates rejected because they sent everything to one side
    pub degenerate_partitions: usize,

    /// Count of seed portals (one per partition)
    pub seed_portals: usize,

    /// Count of portal splits during refinement
    pub portal_splits: usize,

    /// Portals that spanned some partition during leaf insertion and were dropped
    pub portals_lost: usize,

    /// Portals referenced by single leaf only
    pub spurious_portals: usize,

    /// Portals removed by back leaf check
    pub extra_portals: usize,

    /// Portals removed because their id wasn't shared by exactly two mutually linked leaves
    pub unpaired_portals: usize,
}

/// Invariant violation during world construction
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    /// Splitting produced side with less than 3 vertices
    #[error("split produced degenerate result ({front} front, {back} back vertices)")]
    DegenerateSplit {
        /// Front side vertex count
        front: usize,

        /// Back side vertex count
        back: usize,
    },

    /// Split fragment is not located on its side of splitting plane
    #[error("split fragment is not located on its side of splitting plane")]
    InconsistentSplit,

    /// Portal has too many vertices
    #[error("portal has {points} points, maximum is {}", Portal::MAX_POINTS)]
    PortalTooComplex {
        /// Actual portal point count
        points: usize,
    },

    /// BSP is deeper than `compiler::MAX_TREE_DEPTH`
    #[error("BSP tree depth limit {depth} exceeded")]
    TreeTooDeep {
        /// Depth limit
        depth: usize,
    },
}

/// World loading error
#[derive(Debug, thiserror::Error)]
pub enum WorldLoadError {
    /// Input/Output error
    #[error("world file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Datafile contents error
    #[error("invalid world datafile: {0}")]
    Datafile(#[from] datafile::DatafileError),

    /// World construction error
    #[error("world construction failed: {0}")]
    Build(#[from] BuildError),
}

/// Allocation counters of all world pools
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WorldPoolStats {
    pub polygons: PoolStats,
    pub nodes: PoolStats,
    pub portals: PoolStats,
}

/// Shared vertex buffer range
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DrawRange {
    /// Index of first vertex
    pub first_vertex: usize,

    /// Vertex count
    pub vertex_count: usize,
}

/// World: shared vertex buffer, BSP tree, portals and visibility state
pub struct World {
    /// Shared vertex buffer (append-only during construction)
    pub(crate) vertices: Vec<DrawVertex>,

    /// Polygon pool
    pub(crate) polygon_pool: Pool<Polygon, POLYGON_POOL_GRANULARITY>,

    /// Node pool
    pub(crate) node_pool: Pool<BspNode, NODE_POOL_GRANULARITY>,

    /// Portal pool
    pub(crate) portal_pool: Pool<Portal, PORTAL_POOL_GRANULARITY>,

    /// Tree root
    pub(crate) root: Option<NodeHandle>,

    /// Partition nodes in pre-order
    pub(crate) partition_nodes: Vec<NodeHandle>,

    /// Leaf nodes in pre-order
    pub(crate) leaf_nodes: Vec<NodeHandle>,

    /// Count of portal references stored in leaves
    pub(crate) portal_count: usize,

    /// Count of created partitions (partition id source)
    pub(crate) partition_count: usize,

    /// Count of created leaves (leaf id source)
    pub(crate) leaf_count: usize,

    /// Bounds of input geometry
    pub(crate) bound_box: BoundBox,

    /// Portal overlay geometry
    pub(crate) debug_portal_range: DrawRange,

    /// Current frame number
    pub(crate) frame_number: u32,

    /// Configuration
    pub(crate) config: WorldConfig,

    /// Construction counters
    pub(crate) stats: BuildStats,
}

impl World {
    /// Empty (not loaded) world
    pub fn new(config: WorldConfig) -> Self {
        Self {
            vertices: Vec::new(),
            polygon_pool: Pool::new(),
            node_pool: Pool::new(),
            portal_pool: Pool::new(),
            root: None,
            partition_nodes: Vec::new(),
            leaf_nodes: Vec::new(),
            portal_count: 0,
            partition_count: 0,
            leaf_count: 0,
            bound_box: BoundBox::zero(),
            debug_portal_range: DrawRange::default(),
            frame_number: 1,
            config,
            stats: BuildStats::default(),
        }
    }

    /// Build world from triangle soup
    pub fn from_triangles(triangles: &[Triangle], config: WorldConfig) -> Result<Self, BuildError> {
        let mut world = Self::new(config);
        world.stats.input_triangles = triangles.len();

        let mut root_polygons = Vec::with_capacity(triangles.len());

        for triangle in triangles {
            let [p1, p2, p3] = triangle.vertices.map(|v| v.position);
            let plane = geom::Plane::from_points(p1, p2, p3);

            if !plane.normal.length2().is_finite() {
                world.stats.degenerate_triangles += 1;
            }

            root_polygons.push(world.add_polygon(
                plane,
                triangle.vertices.map(|v| (v.position, v.uv)),
            ));
        }

        if world.stats.degenerate_triangles != 0 {
            log::warn!("{} degenerate triangles in world geometry", world.stats.degenerate_triangles);
        }

        world.bound_box = BoundBox::for_points(world.vertices.iter().map(DrawVertex::position));

        let root = world.node_pool.allocate(BspNode::unresolved(root_polygons));
        world.root = Some(root);

        if world.config.flags.contains(RenderFlags::BUILD_BSP_TREE) {
            world.build_bsp_tree(root, 0)?;
            world.build_portals()?;
            world.append_debug_portals();

            log::info!(
                "BSP built: {} partitions, {} leaves, {} portals, {} polygons ({} on plane, {} front, {} back, {} spanning)",
                world.partition_nodes.len(),
                world.leaf_nodes.len(),
                world.portal_count,
                world.polygon_pool.stats().objects_alive,
                world.stats.polygons_on_plane,
                world.stats.polygons_front,
                world.stats.polygons_back,
                world.stats.polygons_spanning,
            );
        }

        Ok(world)
    }

    /// Load world from text datafile contents
    pub fn load(src: &mut dyn std::io::Read, config: WorldConfig) -> Result<Self, WorldLoadError> {
        let mut text = String::new();
        src.read_to_string(&mut text)?;

        let triangles = datafile::parse(&text, config.scale)?;
        log::info!("{} triangles read from world datafile", triangles.len());

        Ok(Self::from_triangles(&triangles, config)?)
    }

    /// Load world from text datafile
    pub fn load_datafile(path: impl AsRef<Path>, config: WorldConfig) -> Result<Self, WorldLoadError> {
        let mut file = std::fs::File::open(path.as_ref())?;

        Self::load(&mut file, config)
    }

    /// Replace world by one loaded from datafile. World is left untouched on failure.
    pub fn reload(&mut self, path: impl AsRef<Path>) -> Result<(), WorldLoadError> {
        *self = Self::load_datafile(path, self.config)?;

        Ok(())
    }

    /// Destroy all world contents
    pub fn cleanup(&mut self) {
        self.polygon_pool.drain();
        self.node_pool.drain();
        self.portal_pool.drain();
        self.vertices.clear();
        self.root = None;
        self.partition_nodes.clear();
        self.leaf_nodes.clear();
        self.portal_count = 0;
        self.partition_count = 0;
        self.leaf_count = 0;
        self.bound_box = BoundBox::zero();
        self.debug_portal_range = DrawRange::default();
        self.stats = BuildStats::default();
    }

    /// Append polygon and its vertices to the world
    fn add_polygon(&mut self, plane: geom::Plane, vertices: [(Vec3f, Vec2f); 3]) -> PolygonHandle {
        const CORNER_MARKERS: [[f32; 4]; 3] = [
            [1.0, 0.0, 0.0, 1.0],
            [0.0, 1.0, 0.0, 1.0],
            [0.0, 0.0, 1.0, 1.0],
        ];

        let first_vertex = self.vertices.len();

        for ((position, uv), color) in vertices.into_iter().zip(CORNER_MARKERS) {
            self.vertices.push(DrawVertex {
                position: position.into(),
                normal: plane.normal.into(),
                color,
                uv: uv.into(),
            });
        }

        self.polygon_pool.allocate(Polygon { plane, first_vertex, vertex_count: 3 })
    }

    /// Positions of polygon vertices
    pub fn polygon_points(&self, polygon: &Polygon) -> impl Iterator<Item = Vec3f> + '_ {
        self.vertices[polygon.vertex_range()].iter().map(DrawVertex::position)
    }

    /// Check if world contains any geometry
    pub fn is_loaded(&self) -> bool {
        self.root.is_some()
    }

    /// Shared vertex buffer
    pub fn vertices(&self) -> &[DrawVertex] {
        &self.vertices
    }

    /// Shared vertex buffer as bytes (for GPU upload)
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn polygon(&self, handle: PolygonHandle) -> Option<&Polygon> {
        self.polygon_pool.get(handle)
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&BspNode> {
        self.node_pool.get(handle)
    }

    pub fn portal(&self, handle: PortalHandle) -> Option<&Portal> {
        self.portal_pool.get(handle)
    }

    /// BSP root
    pub fn root(&self) -> Option<NodeHandle> {
        self.root
    }

    /// Partition nodes in pre-order
    pub fn partition_nodes(&self) -> &[NodeHandle] {
        &self.partition_nodes
    }

    /// Leaf nodes in pre-order
    pub fn leaf_nodes(&self) -> &[NodeHandle] {
        &self.leaf_nodes
    }

    /// Count of portal references stored in leaves
    pub fn portal_count(&self) -> usize {
        self.portal_count
    }

    pub fn bound_box(&self) -> BoundBox {
        self.bound_box
    }

    /// Portal overlay vertex range
    pub fn debug_portal_range(&self) -> DrawRange {
        self.debug_portal_range
    }

    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn flags(&self) -> RenderFlags {
        self.config.flags
    }

    /// Runtime switches
    pub fn flags_mut(&mut self) -> &mut RenderFlags {
        &mut self.config.flags
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    pub fn pool_stats(&self) -> WorldPoolStats {
        WorldPoolStats {
            polygons: self.polygon_pool.stats(),
            nodes: self.node_pool.stats(),
            portals: self.portal_pool.stats(),
        }
    }

    /// BSP tree depth (0 for empty world)
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut stack = self.root.map(|root| (root, 1)).into_iter().collect::<Vec<_>>();

        while let Some((handle, node_depth)) = stack.pop() {
            depth = depth.max(node_depth);

            if let NodeKind::Partition { front, back, .. } = self.node_pool[handle].kind {
                stack.push((front, node_depth + 1));
                stack.push((back, node_depth + 1));
            }
        }

        depth
    }
}
