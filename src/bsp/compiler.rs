//! BSP tree building

use itertools::Itertools;

use crate::{
    geom::{self, PointRelation, PolygonRelation},
    math::{Vec2f, Vec3f},
};

use super::{BspNode, BuildError, LeafId, NodeHandle, NodeKind, PartitionId, PolygonHandle, World};

/// Maximal BSP tree depth
pub const MAX_TREE_DEPTH: usize = 512;

/// Statistics about polygon set split, collected per polygon vertex.
/// Used during partition selection to find the most balanced one.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PartitionSplitStat {
    /// Count of vertices assigned to front side
    pub front: u32,

    /// Count of vertices assigned to back side
    pub back: u32,
}

impl PartitionSplitStat {
    /// Check if partition leaves one of the sides empty
    pub fn is_one_sided(self) -> bool {
        self.front == 0 || self.back == 0
    }

    /// Balance rate, less is better
    pub fn rate(self) -> u32 {
        self.front.abs_diff(self.back)
    }
}

/// Check if polygon lying on partition plane belongs to partition back side
fn is_facing_back(partition: geom::Plane, polygon_plane: geom::Plane) -> bool {
    (partition.normal ^ polygon_plane.normal) < 0.0
}

/// Fan triangulation of split result (3 or 4 vertices)
fn triangulate(points: &[(Vec3f, Vec2f)]) -> impl Iterator<Item = [(Vec3f, Vec2f); 3]> + '_ {
    (1..points.len() - 1).map(move |index| [points[0], points[index], points[index + 1]])
}

impl World {
    /// Calculate split statistics of polygon set by plane
    pub fn get_partition_split_stat(&self, plane: geom::Plane, polygons: &[PolygonHandle]) -> PartitionSplitStat {
        let mut stat = PartitionSplitStat::default();

        for polygon in polygons.iter().map(|handle| &self.polygon_pool[*handle]) {
            for point in self.polygon_points(polygon) {
                match plane.get_point_relation(point) {
                    PointRelation::Front => stat.front += 1,
                    PointRelation::Back => stat.back += 1,
                    PointRelation::OnPlane => if is_facing_back(plane, polygon.plane) {
                        stat.back += 1;
                    } else {
                        stat.front += 1;
                    }
                }
            }
        }

        stat
    }

    /// Select partition plane for polygon set.
    ///
    /// # Returns
    /// Plane of the first candidate with minimal front/back disbalance,
    /// `None` if every candidate leaves one of the sides empty.
    pub fn select_partition(&self, polygons: &[PolygonHandle]) -> Option<geom::Plane> {
        let mut best: Option<(u32, geom::Plane)> = None;
        let mut one_sided_count = 0;

        for candidate in polygons {
            let plane = self.polygon_pool[*candidate].plane;
            let stat = self.get_partition_split_stat(plane, polygons);

            if stat.is_one_sided() {
                one_sided_count += 1;
            }

            if best.is_none_or(|(best_rate, _)| stat.rate() < best_rate) {
                best = Some((stat.rate(), plane));
            }
        }

        if one_sided_count == polygons.len() {
            return None;
        }

        best.map(|(_, plane)| plane)
    }

    /// Turn node into leaf
    fn make_leaf(&mut self, node: NodeHandle, polygons: Vec<PolygonHandle>) {
        self.leaf_count += 1;

        let node = &mut self.node_pool[node];
        node.kind = NodeKind::Leaf { id: LeafId::from_index(self.leaf_count - 1) };
        node.polygons = polygons;
    }

    /// Split triangle by plane, place fragments to front/back polygon lists
    fn split_triangle(
        &mut self,
        handle: PolygonHandle,
        plane: geom::Plane,
        front_polygons: &mut Vec<PolygonHandle>,
        back_polygons: &mut Vec<PolygonHandle>,
    ) -> Result<(), BuildError> {
        let polygon = self.polygon_pool[handle];
        let vertices = self.vertices[polygon.vertex_range()]
            .iter()
            .map(|vertex| (vertex.position(), vertex.uv()))
            .collect::<Vec<_>>();

        let mut front = Vec::with_capacity(4);
        let mut back = Vec::with_capacity(4);

        let Some(last) = vertices.last().copied() else {
            return Err(BuildError::DegenerateSplit { front: 0, back: 0 });
        };

        for ((point_a, uv_a), (point_b, uv_b)) in std::iter::once(last).chain(vertices.iter().copied()).tuple_windows() {
            let side_a = plane.get_point_relation(point_a);
            let side_b = plane.get_point_relation(point_b);

            let intersection = || {
                let point = plane.intersect_edge(point_a, point_b);

                (point, geom::interpolate_uv(point_a, point_b, point, uv_a, uv_b))
            };

            match side_b {
                PointRelation::Front => {
                    if side_a == PointRelation::Back {
                        let vertex = intersection();
                        front.push(vertex);
                        back.push(vertex);
                    }
                    front.push((point_b, uv_b));
                }
                PointRelation::Back => {
                    if side_a == PointRelation::Front {
                        let vertex = intersection();
                        front.push(vertex);
                        back.push(vertex);
                    }
                    back.push((point_b, uv_b));
                }
                PointRelation::OnPlane => {
                    front.push((point_b, uv_b));
                    back.push((point_b, uv_b));
                }
            }
        }

        if !(3..=4).contains(&front.len()) || !(3..=4).contains(&back.len()) {
            return Err(BuildError::DegenerateSplit { front: front.len(), back: back.len() });
        }

        // fragments lie in the source polygon plane
        for triangle in triangulate(&front) {
            front_polygons.push(self.add_polygon(polygon.plane, triangle));
            self.stats.fragments_created += 1;
        }

        for triangle in triangulate(&back) {
            back_polygons.push(self.add_polygon(polygon.plane, triangle));
            self.stats.fragments_created += 1;
        }

        // source vertices stay in buffer, they're still used by raw triangle soup rendering
        self.polygon_pool.deallocate(handle);

        Ok(())
    }

    /// Build BSP subtree of unresolved node
    pub(crate) fn build_bsp_tree(&mut self, node: NodeHandle, depth: usize) -> Result<(), BuildError> {
        if depth > MAX_TREE_DEPTH {
            return Err(BuildError::TreeTooDeep { depth: MAX_TREE_DEPTH });
        }

        let polygons = std::mem::take(&mut self.node_pool[node].polygons);

        let Some(partition) = self.select_partition(&polygons) else {
            self.make_leaf(node, polygons);
            return Ok(());
        };

        // (polygon, relation, 'belongs to back if on plane' flag)
        let placements = polygons
            .iter()
            .map(|handle| {
                let polygon = &self.polygon_pool[*handle];
                let relation = partition.get_points_relation(self.polygon_points(polygon));

                (*handle, relation, is_facing_back(partition, polygon.plane))
            })
            .collect::<Vec<_>>();

        let mut has_front = false;
        let mut has_back = false;

        for (_, relation, facing_back) in &placements {
            match relation {
                PolygonRelation::Front => has_front = true,
                PolygonRelation::Back => has_back = true,
                PolygonRelation::OnPlane => if *facing_back {
                    has_back = true;
                } else {
                    has_front = true;
                }
                PolygonRelation::Spanning => {
                    has_front = true;
                    has_back = true;
                }
            }
        }

        // Partition balanced by on-plane vertices only, nothing to split actually
        if !has_front || !has_back {
            log::debug!("partition {:?} leaves one side empty, making leaf of {} polygons", partition, polygons.len());
            self.stats.degenerate_partitions += 1;
            self.make_leaf(node, polygons);
            return Ok(());
        }

        let mut front_polygons = Vec::new();
        let mut back_polygons = Vec::new();

        for (handle, relation, facing_back) in placements {
            match relation {
                PolygonRelation::Front => {
                    self.stats.polygons_front += 1;
                    front_polygons.push(handle);
                }
                PolygonRelation::Back => {
                    self.stats.polygons_back += 1;
                    back_polygons.push(handle);
                }
                PolygonRelation::OnPlane => {
                    self.stats.polygons_on_plane += 1;

                    if facing_back {
                        back_polygons.push(handle);
                    } else {
                        front_polygons.push(handle);
                    }
                }
                PolygonRelation::Spanning => {
                    self.stats.polygons_spanning += 1;
                    self.split_triangle(handle, partition, &mut front_polygons, &mut back_polygons)?;
                }
            }
        }

        self.partition_count += 1;

        let front = self.node_pool.allocate(BspNode::unresolved(front_polygons));
        let back = self.node_pool.allocate(BspNode::unresolved(back_polygons));

        self.node_pool[node].kind = NodeKind::Partition {
            id: PartitionId::from_index(self.partition_count - 1),
            plane: partition,
            front,
            back,
        };

        self.build_bsp_tree(front, depth + 1)?;
        self.build_bsp_tree(back, depth + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bsp::Triangle,
        config::{RenderFlags, WorldConfig},
        vec3f,
    };

    fn unbuilt(triangles: &[Triangle]) -> World {
        World::from_triangles(triangles, WorldConfig::default().with_flags(RenderFlags::empty())).unwrap()
    }

    fn root_polygons(world: &World) -> Vec<PolygonHandle> {
        world.node(world.root().unwrap()).unwrap().polygons.clone()
    }

    #[test]
    fn single_polygon_is_leaf() {
        let world = unbuilt(&[Triangle::from_positions(
            vec3f!(0.0, 0.0, 0.0),
            vec3f!(1.0, 0.0, 0.0),
            vec3f!(0.0, 1.0, 0.0),
        )]);

        assert_eq!(world.select_partition(&root_polygons(&world)), None);
        assert_eq!(world.select_partition(&[]), None);
    }

    #[test]
    fn first_balanced_candidate_wins() {
        let facing_px = Triangle::from_positions(vec3f!(0.0, 0.0, 0.0), vec3f!(0.0, 1.0, 0.0), vec3f!(0.0, 0.0, 1.0));
        let facing_nx = Triangle::from_positions(vec3f!(0.0, 0.0, 0.0), vec3f!(0.0, 0.0, 1.0), vec3f!(0.0, 1.0, 0.0));
        let front = Triangle::from_positions(vec3f!(1.0, 0.0, 0.0), vec3f!(1.0, 1.0, 0.0), vec3f!(1.0, 0.0, 1.0));
        let back = Triangle::from_positions(vec3f!(-1.0, 0.0, 0.0), vec3f!(-1.0, 1.0, 0.0), vec3f!(-1.0, 0.0, 1.0));

        let world = unbuilt(&[facing_px, facing_nx, front, back]);
        let polygons = root_polygons(&world);

        let plane = world.select_partition(&polygons).unwrap();
        assert_eq!(plane.normal, vec3f!(1.0, 0.0, 0.0));

        let stat = world.get_partition_split_stat(plane, &polygons);
        assert_eq!(stat, PartitionSplitStat { front: 6, back: 6 });

        let world = unbuilt(&[facing_nx, facing_px, front, back]);
        let plane = world.select_partition(&root_polygons(&world)).unwrap();
        assert_eq!(plane.normal, vec3f!(-1.0, 0.0, 0.0));
    }

    #[test]
    fn one_sided_candidate_loses_to_balanced() {
        // floor below everything else, every polygon is in front of it
        let floor = Triangle::from_positions(vec3f!(-5.0, -5.0, -5.0), vec3f!(5.0, -5.0, -5.0), vec3f!(-5.0, 5.0, -5.0));
        let facing_px = Triangle::from_positions(vec3f!(0.0, 0.0, 0.0), vec3f!(0.0, 1.0, 0.0), vec3f!(0.0, 0.0, 1.0));
        let front = Triangle::from_positions(vec3f!(1.0, 0.0, 0.0), vec3f!(1.0, 1.0, 0.0), vec3f!(1.0, 0.0, 1.0));
        let back = Triangle::from_positions(vec3f!(-1.0, 0.0, 0.0), vec3f!(-1.0, 1.0, 0.0), vec3f!(-1.0, 0.0, 1.0));

        let world = unbuilt(&[floor, facing_px, front, back]);
        let polygons = root_polygons(&world);

        let floor_plane = world.polygon(polygons[0]).unwrap().plane;
        let floor_stat = world.get_partition_split_stat(floor_plane, &polygons);
        assert!(floor_stat.is_one_sided());
        assert_eq!(floor_stat.rate(), 12);

        let plane = world.select_partition(&polygons).unwrap();
        assert_eq!(plane.normal, vec3f!(1.0, 0.0, 0.0));
        assert_eq!(plane.distance, 0.0);
        assert_eq!(world.get_partition_split_stat(plane, &polygons), PartitionSplitStat { front: 7, back: 5 });
    }

    #[test]
    fn split_interpolates_uv() {
        let triangle = Triangle::from_xyzuv([
            [0.0, 0.0, 0.0, 0.0, 0.0],
            [2.0, 0.0, 0.0, 1.0, 0.0],
            [0.0, 2.0, 0.0, 0.0, 1.0],
        ]);
        let mut world = unbuilt(&[triangle]);
        let handle = root_polygons(&world)[0];
        let source_plane = world.polygon(handle).unwrap().plane;
        let plane = geom::Plane::new(vec3f!(1.0, 0.0, 0.0), -1.0);

        let mut front = Vec::new();
        let mut back = Vec::new();
        world.split_triangle(handle, plane, &mut front, &mut back).unwrap();

        assert_eq!(front.len(), 1);
        assert_eq!(back.len(), 2);
        assert_eq!(world.stats().fragments_created, 3);
        assert_eq!(world.vertices().len(), 3 + 9);

        let front_polygon = *world.polygon(front[0]).unwrap();
        let front_vertices = &world.vertices()[front_polygon.vertex_range()];
        let expected = [
            ([1.0, 0.0, 0.0], [0.5, 0.0]),
            ([2.0, 0.0, 0.0], [1.0, 0.0]),
            ([1.0, 1.0, 0.0], [0.5, 0.5]),
        ];

        for (vertex, (position, uv)) in front_vertices.iter().zip(expected) {
            assert_eq!(vertex.position, position);
            assert!((vertex.uv[0] - uv[0]).abs() < 1e-5);
            assert!((vertex.uv[1] - uv[1]).abs() < 1e-5);
        }

        assert_eq!(front_polygon.plane, source_plane);
        assert!(world.polygon(handle).is_none());

        for handle in &back {
            let polygon = world.polygon(*handle).unwrap();
            let relation = plane.get_points_relation(world.polygon_points(polygon));
            assert_eq!(relation, PolygonRelation::Back);
        }
    }
}
