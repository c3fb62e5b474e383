//! Potentially visible set calculation

use itertools::Itertools;

use crate::{frustum::Frustum, geom::{self, PointRelation}, math::Vec3f};

use super::{portal::PortalSplitResult, NodeHandle, NodeKind, Portal, World};

/// Pending leaf visit
struct VisibilityTask {
    /// Leaf to mark and expand
    leaf: NodeHandle,

    /// Leaf the task came from
    parent: NodeHandle,

    /// Volume visible through the portal chain
    planes: Vec<geom::Plane>,

    /// Count of portals passed
    depth: usize,
}

/// Clip portal by plane set, keep parts in front of all planes.
/// Returns None if portal is completely clipped out.
fn clip_portal(portal: &Portal, planes: &[geom::Plane]) -> Option<Portal> {
    let mut clipped = portal.clone();

    for plane in planes {
        match clipped.split(*plane) {
            Ok(PortalSplitResult::Back) => return None,
            Ok(PortalSplitResult::Spanning { front, .. }) => clipped = front,
            Ok(PortalSplitResult::Front | PortalSplitResult::OnPlane) => {}
            Err(error) => {
                log::trace!("portal {:?} clipping failed: {}", portal.id, error);
                return None;
            }
        }
    }

    Some(clipped)
}

/// Build planes of pyramid with apex at `eye` and `points` loop as base.
/// Plane normals point inside the pyramid for loops wound as portals are.
fn build_portal_volume(eye: Vec3f, points: &[Vec3f]) -> Vec<geom::Plane> {
    points
        .iter()
        .circular_tuple_windows()
        .filter_map(|(prev, curr)| ((*curr - eye) % (*prev - eye)).checked_normalized())
        .map(|normal| geom::Plane::from_point_normal(eye, normal))
        .collect()
}

impl World {
    /// Find leaf containing point. Points on partition planes belong to front subtree.
    pub fn find_leaf(&self, point: Vec3f) -> Option<NodeHandle> {
        let mut node = self.root?;

        loop {
            match self.node_pool.get(node)?.kind {
                NodeKind::Partition { plane, front, back, .. } => {
                    node = match plane.get_point_relation(point) {
                        PointRelation::Back => back,
                        PointRelation::Front | PointRelation::OnPlane => front,
                    };
                }
                NodeKind::Leaf { .. } => return Some(node),
                NodeKind::Unresolved => return None,
            }
        }
    }

    /// Push visits of leaves visible from `leaf` through `planes` volume
    fn push_visibility_tasks(
        &self,
        eye: Vec3f,
        leaf: NodeHandle,
        parent: Option<NodeHandle>,
        planes: &[geom::Plane],
        depth: usize,
        stack: &mut Vec<VisibilityTask>,
    ) {
        for handle in &self.node_pool[leaf].portals {
            let portal = &self.portal_pool[*handle];

            let Some(back_leaf) = portal.back_leaf else {
                continue;
            };

            if Some(back_leaf) == parent {
                continue;
            }

            let Some(clipped) = clip_portal(portal, planes) else {
                continue;
            };

            stack.push(VisibilityTask {
                leaf: back_leaf,
                parent: leaf,
                planes: build_portal_volume(eye, &clipped.points),
                depth: depth + 1,
            });
        }
    }

    /// Mark leaves visible from `eye` through `frustum` in current frame.
    /// `start` is the leaf containing the eye.
    pub fn compute_pvs(&mut self, eye: Vec3f, frustum: &Frustum, start: NodeHandle) {
        let frame_number = self.frame_number;
        self.node_pool[start].vis_frame = frame_number;

        // I don't want to use recursion here
        let mut stack = Vec::new();
        self.push_visibility_tasks(eye, start, None, frustum.clipping_planes(), 0, &mut stack);

        while let Some(task) = stack.pop() {
            self.node_pool[task.leaf].vis_frame = frame_number;

            if task.depth >= self.config.max_portal_depth {
                log::trace!("portal depth limit {} reached", self.config.max_portal_depth);
                continue;
            }

            self.push_visibility_tasks(eye, task.leaf, Some(task.parent), &task.planes, task.depth, &mut stack);
        }
    }

    /// Check if leaf is marked visible in current frame
    pub fn is_leaf_visible(&self, leaf: NodeHandle) -> bool {
        self.node_pool
            .get(leaf)
            .is_some_and(|node| node.is_leaf() && node.vis_frame == self.frame_number)
    }

    /// Count leaves marked visible in current frame
    pub fn count_visible_leaves(&self) -> usize {
        self.leaf_nodes
            .iter()
            .filter(|leaf| self.node_pool[**leaf].vis_frame == self.frame_number)
            .count()
    }

    /// Find camera leaf and compute its PVS. Returns count of visible leaves.
    pub fn update_visibility(&mut self, eye: Vec3f, frustum: &Frustum) -> Option<usize> {
        let start = self.find_leaf(eye)?;

        self.compute_pvs(eye, frustum, start);

        Some(self.count_visible_leaves())
    }
}
