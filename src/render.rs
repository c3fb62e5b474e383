//! World renderer front-end
//!
//! Renderer doesn't touch any graphics API. It only walks the world and
//! reports ranges of the shared vertex buffer that should be drawn.

use crate::{
    bsp::{DrawRange, NodeKind, World},
    config::RenderFlags,
    frustum::Frustum,
    geom::PointRelation,
    math::Vec3f,
};

/// Host renderer primitive
pub trait DrawSink {
    /// Draw `range.vertex_count` vertices (as triangle list) starting from `range.first_vertex`
    fn draw_triangles(&mut self, range: DrawRange);
}

/// Sink that records draw calls
impl DrawSink for Vec<DrawRange> {
    fn draw_triangles(&mut self, range: DrawRange) {
        self.push(range);
    }
}

/// Single frame rendering counters
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Count of drawn triangles
    pub polygons_rendered: usize,

    /// Count of drawn polygon lists (leaves or raw soup)
    pub polygon_lists_rendered: usize,

    /// Count of issued draw calls
    pub draw_calls: usize,

    /// Count of portal overlay vertices drawn
    pub debug_portal_vertices: usize,
}

impl World {
    /// Draw world geometry. Leaves are drawn back-to-front relative to `eye`,
    /// only ones marked visible in current frame. Portal overlay goes after them
    /// and is never drawn with raw triangle soup. Frame number is advanced after drawing.
    pub fn render(&mut self, eye: Vec3f, sink: &mut dyn DrawSink) -> RenderStats {
        let mut stats = RenderStats::default();
        let flags = self.config().flags;

        if flags.contains(RenderFlags::BUILD_BSP_TREE | RenderFlags::RENDER_USE_BSP) {
            self.render_tree(eye, sink, &mut stats);

            let debug_range = self.debug_portal_range();
            if flags.contains(RenderFlags::DEBUG_PORTALS) && debug_range.vertex_count != 0 {
                sink.draw_triangles(debug_range);
                stats.draw_calls += 1;
                stats.debug_portal_vertices = debug_range.vertex_count;
            }
        } else {
            // input triangles occupy vertex buffer start
            let vertex_count = self.stats().input_triangles * 3;

            if vertex_count != 0 {
                sink.draw_triangles(DrawRange { first_vertex: 0, vertex_count });
                stats.draw_calls += 1;
                stats.polygon_lists_rendered += 1;
                stats.polygons_rendered += vertex_count / 3;
            }
        }

        self.frame_number = self.frame_number.wrapping_add(1);

        stats
    }

    /// Compute visibility from `eye` and render the frame
    pub fn render_frame(&mut self, eye: Vec3f, frustum: &Frustum, sink: &mut dyn DrawSink) -> RenderStats {
        if self.update_visibility(eye, frustum).is_none() {
            log::trace!("camera is outside of world tree");
        }

        self.render(eye, sink)
    }

    /// Back-to-front BSP traversal
    fn render_tree(&self, eye: Vec3f, sink: &mut dyn DrawSink, stats: &mut RenderStats) {
        // Visit stack (I don't want to use recursion here)
        let mut visit_stack = self.root().into_iter().collect::<Vec<_>>();

        while let Some(handle) = visit_stack.pop() {
            let node = &self.node_pool[handle];

            match node.kind {
                NodeKind::Partition { plane, front, back, .. } => {
                    let (first, second) = match plane.get_point_relation(eye) {
                        PointRelation::Front | PointRelation::OnPlane => (back, front),
                        PointRelation::Back => (front, back),
                    };

                    visit_stack.push(second);
                    visit_stack.push(first);
                }
                NodeKind::Leaf { .. } => {
                    if node.vis_frame != self.frame_number {
                        continue;
                    }

                    for polygon in &node.polygons {
                        let polygon = &self.polygon_pool[*polygon];

                        sink.draw_triangles(DrawRange {
                            first_vertex: polygon.first_vertex,
                            vertex_count: polygon.vertex_count,
                        });
                        stats.draw_calls += 1;
                        stats.polygons_rendered += 1;
                    }

                    stats.polygon_lists_rendered += 1;
                }
                NodeKind::Unresolved => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bsp::Triangle, config::WorldConfig, vec3f};

    fn slab() -> Vec<Triangle> {
        // two parallel triangles facing each other
        vec![
            Triangle::from_positions(vec3f!(0.0, 0.0, 0.0), vec3f!(1.0, 0.0, 0.0), vec3f!(0.0, 1.0, 0.0)),
            Triangle::from_positions(vec3f!(0.0, 0.0, 1.0), vec3f!(0.0, 1.0, 1.0), vec3f!(1.0, 0.0, 1.0)),
        ]
    }

    fn camera(eye: Vec3f) -> Frustum {
        Frustum::perspective(eye, vec3f!(1.0, 0.0, 0.0), vec3f!(0.0, 0.0, 1.0), 1.2, 1.0, 0.1, 100.0)
    }

    #[test]
    fn raw_soup_is_single_draw() {
        let config = WorldConfig::default().with_flags(RenderFlags::empty());
        let mut world = World::from_triangles(&slab(), config).unwrap();
        let mut draws = Vec::new();

        let stats = world.render(vec3f!(0.2, 0.2, 0.5), &mut draws);

        assert_eq!(draws, vec![DrawRange { first_vertex: 0, vertex_count: 6 }]);
        assert_eq!(stats.polygons_rendered, 2);
        assert_eq!(stats.polygon_lists_rendered, 1);
        assert_eq!(world.frame_number(), 2);
    }

    #[test]
    fn invisible_leaves_are_skipped() {
        let mut world = World::from_triangles(&slab(), WorldConfig::default()).unwrap();
        let mut draws = Vec::new();

        // no visibility pass for this frame
        let stats = world.render(vec3f!(0.2, 0.2, 0.5), &mut draws);

        assert!(draws.is_empty());
        assert_eq!(stats, RenderStats::default());
    }

    #[test]
    fn visible_leaf_polygons_are_drawn() {
        let mut world = World::from_triangles(&slab(), WorldConfig::default()).unwrap();
        let eye = vec3f!(0.2, 0.2, 0.5);
        let mut draws = Vec::new();

        let stats = world.render_frame(eye, &camera(eye), &mut draws);

        assert_eq!(stats.polygons_rendered, 2);
        assert_eq!(stats.polygon_lists_rendered, 1);
        assert_eq!(draws.len(), 2);
        assert!(draws.iter().all(|range| range.vertex_count == 3));

        // next frame requires new visibility pass
        draws.clear();
        world.render(eye, &mut draws);
        assert!(draws.is_empty());
    }

    #[test]
    fn soup_mode_without_bsp_rendering() {
        let config = WorldConfig::default().with_flags(RenderFlags::BUILD_BSP_TREE);
        let mut world = World::from_triangles(&slab(), config).unwrap();
        let mut draws = Vec::new();

        let stats = world.render(vec3f!(0.2, 0.2, 0.5), &mut draws);

        assert_eq!(stats.polygons_rendered, 2);
        assert_eq!(draws, vec![DrawRange { first_vertex: 0, vertex_count: 6 }]);
    }
}
