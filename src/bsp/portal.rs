//! Portal generation and true portal resolution
//!
//! Every partition plane gets one seed portal covering the whole world
//! bound box. Seeds are cut by all partitions, inserted into the leaves
//! they touch and then filtered down to the portals actually connecting
//! two leaves.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;

use crate::{
    geom::{self, BoundBox, PointRelation, PolygonRelation},
    math::Vec3f,
};

use super::{BuildError, DrawRange, DrawVertex, NodeHandle, NodeKind, PortalHandle, PortalId, World};

/// Convex polygon lying on partition plane, connects two leaves
#[derive(Clone, Debug, PartialEq)]
pub struct Portal {
    /// Portal plane. Point winding is CCW if looking against normal.
    pub plane: geom::Plane,

    /// Portal boundary
    pub points: Vec<Vec3f>,

    /// Identifier, shared by all clones of the portal
    pub id: Option<PortalId>,

    /// Leaf portal plane normal points into
    pub front_leaf: Option<NodeHandle>,

    /// Leaf on the other side of portal
    pub back_leaf: Option<NodeHandle>,
}

/// Portal by plane splitting result, resembles `PolygonRelation` by structure
#[derive(Clone, Debug, PartialEq)]
pub enum PortalSplitResult {
    /// Portal located in front of plane, so it doesn't require splitting
    Front,

    /// Portal located back of plane, so it doesn't require splitting
    Back,

    /// Portal lies on plane
    OnPlane,

    /// Portal intersects with plane
    Spanning {
        /// Front part
        front: Portal,

        /// Back part
        back: Portal,
    },
}

impl Portal {
    /// Maximal count of portal points
    pub const MAX_POINTS: usize = 64;

    /// Build portal from point loop. Plane is calculated by first three points.
    pub fn new(points: Vec<Vec3f>) -> Self {
        let plane = match points.as_slice() {
            [p1, p2, p3, ..] => geom::Plane::from_points(*p1, *p2, *p3),
            _ => geom::Plane::default(),
        };

        Self { plane, points, id: None, front_leaf: None, back_leaf: None }
    }

    /// Build world-sized quad lying on `plane`. Quad normal matches plane normal.
    pub fn seed(plane: geom::Plane, bound_box: BoundBox) -> Self {
        let (min, max) = (bound_box.min(), bound_box.max());
        let n = plane.normal;
        let d = plane.distance;

        let (ax, ay, az) = (n.x.abs(), n.y.abs(), n.z.abs());

        let mut points = if ax >= ay && ax >= az {
            let solve = |y: f32, z: f32| Vec3f::new(-(n.y * y + n.z * z + d) / n.x, y, z);

            vec![solve(min.y, max.z), solve(min.y, min.z), solve(max.y, min.z), solve(max.y, max.z)]
        } else if ay >= az {
            let solve = |x: f32, z: f32| Vec3f::new(x, -(n.x * x + n.z * z + d) / n.y, z);

            vec![solve(min.x, max.z), solve(max.x, max.z), solve(max.x, min.z), solve(min.x, min.z)]
        } else {
            let solve = |x: f32, y: f32| Vec3f::new(x, y, -(n.x * x + n.y * y + d) / n.z);

            vec![solve(min.x, min.y), solve(max.x, min.y), solve(max.x, max.y), solve(min.x, max.y)]
        };

        // projection may flip winding
        let winding_normal = (points[1] - points[0]) % (points[2] - points[0]);
        if (winding_normal ^ n) < 0.0 {
            points.reverse();
        }

        Self { plane, points, id: None, front_leaf: None, back_leaf: None }
    }

    /// Portal boundary
    pub fn points(&self) -> &[Vec3f] {
        &self.points
    }

    /// Copy that shares id, but not leaf links
    pub fn clone_detached(&self) -> Self {
        Self {
            plane: self.plane,
            points: self.points.clone(),
            id: self.id,
            front_leaf: None,
            back_leaf: None,
        }
    }

    /// Portal with same plane, id and links, but another boundary
    fn with_points(&self, points: Vec<Vec3f>) -> Self {
        Self {
            plane: self.plane,
            points,
            id: self.id,
            front_leaf: self.front_leaf,
            back_leaf: self.back_leaf,
        }
    }

    /// Get relation of portal and plane
    pub fn get_relation(&self, plane: geom::Plane) -> PolygonRelation {
        plane.get_points_relation(self.points.iter().copied())
    }

    /// Get relation of inverted portal and plane. Portal lying on plane
    /// is classified by its inverted normal direction.
    pub fn get_inverted_relation(&self, plane: geom::Plane) -> PolygonRelation {
        match self.get_relation(plane) {
            PolygonRelation::OnPlane => {
                let direction = plane.normal ^ -self.plane.normal;

                if direction > geom::GEOM_EPSILON {
                    PolygonRelation::Front
                } else if direction < -geom::GEOM_EPSILON {
                    PolygonRelation::Back
                } else {
                    PolygonRelation::OnPlane
                }
            }
            relation => relation,
        }
    }

    /// Reverse portal winding and plane direction
    pub fn invert(&mut self) {
        self.points.reverse();
        self.plane = self.plane.negate_direction();
    }

    /// Check portal point count
    pub fn check_size(&self) -> Result<(), BuildError> {
        if self.points.len() > Self::MAX_POINTS {
            Err(BuildError::PortalTooComplex { points: self.points.len() })
        } else {
            Ok(())
        }
    }

    /// Split portal by plane. Fragments keep portal plane, id and links.
    pub fn split(&self, plane: geom::Plane) -> Result<PortalSplitResult, BuildError> {
        match self.get_relation(plane) {
            PolygonRelation::Front => return Ok(PortalSplitResult::Front),
            PolygonRelation::Back => return Ok(PortalSplitResult::Back),
            PolygonRelation::OnPlane => return Ok(PortalSplitResult::OnPlane),
            PolygonRelation::Spanning => {}
        }

        let Some(last) = self.points.last().copied() else {
            return Ok(PortalSplitResult::OnPlane);
        };

        let mut front_points = Vec::with_capacity(self.points.len() + 1);
        let mut back_points = Vec::with_capacity(self.points.len() + 1);

        for (point_a, point_b) in std::iter::once(last).chain(self.points.iter().copied()).tuple_windows() {
            let side_a = plane.get_point_relation(point_a);
            let side_b = plane.get_point_relation(point_b);

            match side_b {
                PointRelation::Front => {
                    if side_a == PointRelation::Back {
                        let intersection = plane.intersect_edge(point_a, point_b);
                        front_points.push(intersection);
                        back_points.push(intersection);
                    }
                    front_points.push(point_b);
                }
                PointRelation::Back => {
                    if side_a == PointRelation::Front {
                        let intersection = plane.intersect_edge(point_a, point_b);
                        front_points.push(intersection);
                        back_points.push(intersection);
                    }
                    back_points.push(point_b);
                }
                PointRelation::OnPlane => {
                    front_points.push(point_b);
                    back_points.push(point_b);
                }
            }
        }

        if front_points.len() < 3 || back_points.len() < 3 {
            return Err(BuildError::DegenerateSplit {
                front: front_points.len(),
                back: back_points.len(),
            });
        }

        Ok(PortalSplitResult::Spanning {
            front: self.with_points(front_points),
            back: self.with_points(back_points),
        })
    }
}

/// Portal overlay colors
const PORTAL_COLORS: [[f32; 4]; 8] = [
    [1.0, 0.3, 0.3, 0.5],
    [0.3, 1.0, 0.3, 0.5],
    [0.3, 0.3, 1.0, 0.5],
    [1.0, 1.0, 0.3, 0.5],
    [1.0, 0.3, 1.0, 0.5],
    [0.3, 1.0, 1.0, 0.5],
    [1.0, 0.6, 0.2, 0.5],
    [0.6, 0.2, 1.0, 0.5],
];

impl World {
    /// Collect partition and leaf node lists in pre-order
    fn gather_node_lists(&mut self) {
        self.partition_nodes.clear();
        self.leaf_nodes.clear();

        // I don't want to use recursion here
        let mut stack = self.root.into_iter().collect::<Vec<_>>();

        while let Some(node) = stack.pop() {
            match self.node_pool[node].kind {
                NodeKind::Partition { front, back, .. } => {
                    self.partition_nodes.push(node);
                    stack.push(back);
                    stack.push(front);
                }
                NodeKind::Leaf { .. } => self.leaf_nodes.push(node),
                NodeKind::Unresolved => {}
            }
        }
    }

    /// Build portals of already built BSP tree
    pub(crate) fn build_portals(&mut self) -> Result<(), BuildError> {
        self.gather_node_lists();

        let mut pending = Vec::with_capacity(self.partition_nodes.len());

        for node in &self.partition_nodes {
            if let Some(plane) = self.node_pool[*node].partition_plane() {
                pending.push(self.portal_pool.allocate(Portal::seed(plane, self.bound_box)));
            }
        }

        self.stats.seed_portals = pending.len();

        for node in &self.partition_nodes {
            let Some(plane) = self.node_pool[*node].partition_plane() else {
                continue;
            };

            let mut kept = Vec::with_capacity(pending.len());
            let mut appended = Vec::new();

            for handle in pending {
                match self.portal_pool[handle].split(plane)? {
                    PortalSplitResult::Spanning { front, back } => {
                        if front.get_relation(plane) != PolygonRelation::Front
                            || back.get_relation(plane) != PolygonRelation::Back
                        {
                            return Err(BuildError::InconsistentSplit);
                        }

                        front.check_size()?;
                        back.check_size()?;

                        self.portal_pool.deallocate(handle);
                        appended.push(self.portal_pool.allocate(front));
                        appended.push(self.portal_pool.allocate(back));
                        self.stats.portal_splits += 1;
                    }
                    _ => kept.push(handle),
                }
            }

            kept.extend(appended);
            pending = kept;
        }

        for (index, handle) in pending.iter().enumerate() {
            self.portal_pool[*handle].id = Some(PortalId::from_index(index));
        }

        log::debug!("{} portals after refinement", pending.len());

        for handle in pending {
            self.add_portal_to_tree(handle);
        }

        self.find_true_portals()?;

        self.portal_count = self.leaf_nodes
            .iter()
            .map(|leaf| self.node_pool[*leaf].portals.len())
            .sum();

        Ok(())
    }

    /// Insert portal into every leaf it touches. Portals lying on partition
    /// plane are cloned into both subtrees.
    fn add_portal_to_tree(&mut self, portal: PortalHandle) {
        let Some(root) = self.root else {
            return;
        };

        let mut stack = vec![(portal, root)];

        while let Some((portal, node)) = stack.pop() {
            let (plane, front, back) = match self.node_pool[node].kind {
                NodeKind::Partition { plane, front, back, .. } => (plane, front, back),
                NodeKind::Leaf { .. } | NodeKind::Unresolved => {
                    self.node_pool[node].portals.push(portal);
                    continue;
                }
            };

            match self.portal_pool[portal].get_relation(plane) {
                PolygonRelation::Front => stack.push((portal, front)),
                PolygonRelation::Back => stack.push((portal, back)),
                PolygonRelation::OnPlane => {
                    let clone = self.portal_pool[portal].clone_detached();
                    let clone = self.portal_pool.allocate(clone);

                    stack.push((clone, back));
                    stack.push((portal, front));
                }
                PolygonRelation::Spanning => {
                    log::debug!("portal {:?} spans partition on insertion, dropped", self.portal_pool[portal].id);
                    self.portal_pool.deallocate(portal);
                    self.stats.portals_lost += 1;
                }
            }
        }
    }

    /// Clip portal by planes of all leaf polygons, keep front parts
    fn clip_portal_to_leaf(&mut self, portal: PortalHandle, leaf: NodeHandle) -> Result<(), BuildError> {
        for polygon in &self.node_pool[leaf].polygons {
            let plane = self.polygon_pool[*polygon].plane;
            let target = &mut self.portal_pool[portal];

            if let PortalSplitResult::Spanning { front, .. } = target.split(plane)? {
                front.check_size()?;
                target.points = front.points;
            }
        }

        Ok(())
    }

    /// Orient leaf portals so that their normals point into the leaf
    fn invert_leaf_portals(&mut self, leaf: NodeHandle) {
        let vertices = &self.vertices;
        let polygon_pool = &self.polygon_pool;
        let node = &self.node_pool[leaf];

        for handle in &node.portals {
            let portal = &mut self.portal_pool[*handle];
            let plane = portal.plane;

            // first leaf vertex that is not on portal plane
            let side = node.polygons
                .iter()
                .flat_map(|polygon| vertices[polygon_pool[*polygon].vertex_range()].iter())
                .map(|vertex| plane.get_point_relation(vertex.position()))
                .find(|relation| *relation != PointRelation::OnPlane);

            let Some(side) = side else {
                continue;
            };

            if side == PointRelation::Back {
                portal.invert();
            }
        }
    }

    /// Check if portal doesn't bound its back leaf
    fn is_extra_portal(&self, handle: PortalHandle) -> bool {
        let portal = &self.portal_pool[handle];

        let Some(back_leaf) = portal.back_leaf else {
            return true;
        };

        !self.node_pool[back_leaf].polygons
            .iter()
            .all(|polygon| portal.get_inverted_relation(self.polygon_pool[*polygon].plane) == PolygonRelation::Front)
    }

    /// Leaf portal references grouped by portal id
    fn build_portal_index(&self) -> HashMap<PortalId, Vec<(NodeHandle, PortalHandle)>> {
        let mut index = HashMap::<PortalId, Vec<_>>::new();

        for leaf in &self.leaf_nodes {
            for handle in &self.node_pool[*leaf].portals {
                if let Some(id) = self.portal_pool[*handle].id {
                    index.entry(id).or_default().push((*leaf, *handle));
                }
            }
        }

        index
    }

    /// Leave only portals that connect two leaves
    fn find_true_portals(&mut self) -> Result<(), BuildError> {
        let index = self.build_portal_index();

        for leaf_index in 0..self.leaf_nodes.len() {
            let leaf = self.leaf_nodes[leaf_index];
            let portals = std::mem::take(&mut self.node_pool[leaf].portals);
            let mut linked = Vec::with_capacity(portals.len());

            for handle in portals {
                // removed portals stay in index, skip them by handle check
                let references = self.portal_pool[handle].id
                    .and_then(|id| index.get(&id))
                    .map(Vec::as_slice)
                    .unwrap_or_default();

                let mut back_leaf = None;
                let mut reference_count = 0;

                for (other, other_portal) in references {
                    if *other != leaf && self.portal_pool.contains(*other_portal) {
                        back_leaf = Some(*other);
                        reference_count += 1;
                    }
                }

                let Some(back_leaf) = back_leaf else {
                    self.portal_pool.deallocate(handle);
                    self.stats.spurious_portals += 1;
                    continue;
                };

                if reference_count > 1 {
                    log::trace!("portal {:?} is referenced by {} other leaves", self.portal_pool[handle].id, reference_count);
                }

                let portal = &mut self.portal_pool[handle];
                portal.front_leaf = Some(leaf);
                portal.back_leaf = Some(back_leaf);

                self.clip_portal_to_leaf(handle, leaf)?;
                self.clip_portal_to_leaf(handle, back_leaf)?;

                linked.push(handle);
            }

            self.node_pool[leaf].portals = linked;
            self.invert_leaf_portals(leaf);

            let portals = std::mem::take(&mut self.node_pool[leaf].portals);
            let mut kept = Vec::with_capacity(portals.len());

            for handle in portals {
                if self.is_extra_portal(handle) {
                    self.portal_pool.deallocate(handle);
                    self.stats.extra_portals += 1;
                } else {
                    kept.push(handle);
                }
            }

            self.node_pool[leaf].portals = kept;
        }

        self.remove_unpaired_portals();

        log::debug!(
            "portal resolution: {} spurious, {} extra, {} unpaired, {} lost",
            self.stats.spurious_portals,
            self.stats.extra_portals,
            self.stats.unpaired_portals,
            self.stats.portals_lost,
        );

        Ok(())
    }

    /// Remove every portal whose id isn't shared by exactly two leaves linked to each other
    fn remove_unpaired_portals(&mut self) {
        let mut removed = HashSet::new();

        for references in self.build_portal_index().into_values() {
            let is_pair = match references.as_slice() {
                [(leaf_a, portal_a), (leaf_b, portal_b)] => {
                    let (portal_a, portal_b) = (&self.portal_pool[*portal_a], &self.portal_pool[*portal_b]);

                    true
                        && leaf_a != leaf_b
                        && portal_a.front_leaf == Some(*leaf_a)
                        && portal_a.back_leaf == Some(*leaf_b)
                        && portal_b.front_leaf == Some(*leaf_b)
                        && portal_b.back_leaf == Some(*leaf_a)
                }
                _ => false,
            };

            if is_pair {
                continue;
            }

            for (_, handle) in references {
                self.portal_pool.deallocate(handle);
                self.stats.unpaired_portals += 1;
                removed.insert(handle);
            }
        }

        if removed.is_empty() {
            return;
        }

        for leaf in &self.leaf_nodes {
            self.node_pool[*leaf].portals.retain(|handle| !removed.contains(handle));
        }
    }

    /// Append portal overlay geometry (one fan per portal id) to vertex buffer
    pub(crate) fn append_debug_portals(&mut self) {
        let first_vertex = self.vertices.len();
        let mut added = HashSet::new();

        for leaf in &self.leaf_nodes {
            for handle in &self.node_pool[*leaf].portals {
                let portal = &self.portal_pool[*handle];

                let Some(id) = portal.id else {
                    continue;
                };

                if !added.insert(id) {
                    continue;
                }

                let color = PORTAL_COLORS[id.into_index() % PORTAL_COLORS.len()];
                let points = &portal.points;

                for index in 1..points.len().saturating_sub(1) {
                    for point in [points[0], points[index], points[index + 1]] {
                        self.vertices.push(DrawVertex {
                            position: point.into(),
                            normal: portal.plane.normal.into(),
                            color,
                            uv: [0.0, 0.0],
                        });
                    }
                }
            }
        }

        self.debug_portal_range = DrawRange {
            first_vertex,
            vertex_count: self.vertices.len() - first_vertex,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3f;

    fn square() -> Portal {
        Portal::new(vec![
            vec3f!(-1.0, -1.0, 0.0),
            vec3f!(1.0, -1.0, 0.0),
            vec3f!(1.0, 1.0, 0.0),
            vec3f!(-1.0, 1.0, 0.0),
        ])
    }

    #[test]
    fn square_plane() {
        let portal = square();

        assert_eq!(portal.plane.normal, vec3f!(0.0, 0.0, 1.0));
        assert_eq!(portal.plane.distance, 0.0);
    }

    #[test]
    fn split_not_intersecting() {
        let portal = square();

        let above = geom::Plane::new(vec3f!(0.0, 0.0, 1.0), -5.0);
        assert_eq!(portal.split(above).unwrap(), PortalSplitResult::Back);
        assert_eq!(portal.split(above.negate_direction()).unwrap(), PortalSplitResult::Front);

        let aside = geom::Plane::new(vec3f!(1.0, 0.0, 0.0), 1.0);
        assert_eq!(portal.split(aside).unwrap(), PortalSplitResult::Front);

        assert_eq!(portal.split(portal.plane).unwrap(), PortalSplitResult::OnPlane);
    }

    #[test]
    fn split_through_middle() {
        let portal = square();
        let plane = geom::Plane::new(vec3f!(1.0, 0.0, 0.0), 0.0);

        let PortalSplitResult::Spanning { front, back } = portal.split(plane).unwrap() else {
            panic!("portal must be split");
        };

        assert_eq!(front.points.len(), 4);
        assert_eq!(back.points.len(), 4);
        assert_eq!(front.get_relation(plane), PolygonRelation::Front);
        assert_eq!(back.get_relation(plane), PolygonRelation::Back);
        assert_eq!(front.plane, portal.plane);

        // winding is kept
        let normal = ((front.points[1] - front.points[0]) % (front.points[2] - front.points[0])).normalized();
        assert_eq!(normal, portal.plane.normal);
    }

    #[test]
    fn split_through_vertices() {
        let portal = square();
        let diagonal = geom::Plane::new(vec3f!(1.0, -1.0, 0.0).normalized(), 0.0);

        let PortalSplitResult::Spanning { front, back } = portal.split(diagonal).unwrap() else {
            panic!("portal must be split");
        };

        assert_eq!(front.points.len(), 3);
        assert_eq!(back.points.len(), 3);
    }

    #[test]
    fn invert_reverses_winding() {
        let mut portal = square();
        let points = portal.points.clone();

        portal.invert();

        assert_eq!(portal.plane.normal, vec3f!(0.0, 0.0, -1.0));
        assert_eq!(portal.points, points.into_iter().rev().collect::<Vec<_>>());
    }

    #[test]
    fn inverted_relation_of_coplanar_portal() {
        let portal = square();

        let same = geom::Plane::new(vec3f!(0.0, 0.0, 1.0), 0.0);
        let opposite = same.negate_direction();

        assert_eq!(portal.get_inverted_relation(same), PolygonRelation::Back);
        assert_eq!(portal.get_inverted_relation(opposite), PolygonRelation::Front);

        let below = geom::Plane::new(vec3f!(0.0, 0.0, 1.0), 1.0);
        assert_eq!(portal.get_inverted_relation(below), PolygonRelation::Front);
    }

    #[test]
    fn seed_covers_bound_box() {
        let bound_box = BoundBox::new(vec3f!(0.0, 0.0, 0.0), vec3f!(2.0, 1.0, 1.0));
        let plane = geom::Plane::new(vec3f!(-1.0, 0.0, 0.0), 1.0);

        let seed = Portal::seed(plane, bound_box);

        assert_eq!(seed.plane, plane);
        assert_eq!(seed.points.len(), 4);
        assert!(seed.points.iter().all(|p| plane.get_point_relation(*p) == PointRelation::OnPlane));
        assert!(seed.points.iter().all(|p| p.x == 1.0));

        let normal = ((seed.points[1] - seed.points[0]) % (seed.points[2] - seed.points[0])).normalized();
        assert_eq!(normal, plane.normal);
    }

    #[test]
    fn seed_of_diagonal_plane() {
        let bound_box = BoundBox::new(vec3f!(-1.0, -1.0, -1.0), vec3f!(1.0, 1.0, 1.0));
        let plane = geom::Plane::new(vec3f!(1.0, 1.0, 0.0).normalized(), 0.0);

        let seed = Portal::seed(plane, bound_box);

        for point in &seed.points {
            assert!(point.x.is_finite() && point.y.is_finite() && point.z.is_finite());
            assert_eq!(plane.get_point_relation(*point), PointRelation::OnPlane);
        }

        let normal = ((seed.points[1] - seed.points[0]) % (seed.points[2] - seed.points[0])).normalized();
        assert!((normal ^ plane.normal) > 0.99);
    }
}
