use crate::math::{Vec2f, Vec3f};

/// Geometric epsilon (1 mm)
pub const GEOM_EPSILON: f32 = 0.001;

/// Plane represetnation structure
///
/// ## Equation
/// Standard plane equation is Ax + By + Cz + D = 0. In this case,
/// * (A, B, C) = normal
/// * D = distance
///
/// so signed distance of point P is `(P ^ normal) + distance`.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Plane {
    /// plane normal, unit length
    pub normal: Vec3f,

    /// plane equation constant term
    pub distance: f32,
}

/// Relation of plane and point
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PointRelation {
    /// Point it located behind plane
    Back,

    /// Point is located on plane (within `GEOM_EPSILON`)
    OnPlane,

    /// Point is located in front of plane
    Front,
}

/// Relation of plane and point set (polygon, portal, triangle)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PolygonRelation {
    /// Every point is in front of plane or on it
    Front,

    /// Every point is behind plane or on it
    Back,

    /// All points are located on plane
    OnPlane,

    /// At least one point is strictly in front and one strictly behind
    Spanning,
}

impl Plane {
    /// Build plane from normal and constant term
    pub const fn new(normal: Vec3f, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Build plane that contains `point` and has `normal` direction
    pub fn from_point_normal(point: Vec3f, normal: Vec3f) -> Self {
        Self { normal, distance: -(point ^ normal) }
    }

    /// Build plane by three points. Normal is CCW-oriented, so it points
    /// towards viewer if points are counter-clockwise from viewer's position.
    ///
    /// Collinear points produce plane with NaN normal.
    pub fn from_points(p1: Vec3f, p2: Vec3f, p3: Vec3f) -> Self {
        let normal = ((p2 - p1) % (p3 - p1)).normalized();

        Self::from_point_normal(p1, normal)
    }

    /// Make plane that contains equal point set, but has counter-directional normal
    pub fn negate_direction(self) -> Self {
        Self { normal: -self.normal, distance: -self.distance }
    }

    /// Signed distance from plane to point
    pub fn get_signed_distance(&self, point: Vec3f) -> f32 {
        (point ^ self.normal) + self.distance
    }

    /// Get relation of point and plane
    pub fn get_point_relation(&self, point: Vec3f) -> PointRelation {
        let metrics = self.get_signed_distance(point);

        if metrics > GEOM_EPSILON {
            PointRelation::Front
        } else if metrics < -GEOM_EPSILON {
            PointRelation::Back
        } else {
            PointRelation::OnPlane
        }
    }

    /// Get relation of plane and point set.
    ///
    /// Points on plane never force `Spanning`, empty set is `OnPlane`.
    pub fn get_points_relation(&self, points: impl IntoIterator<Item = Vec3f>) -> PolygonRelation {
        let mut front_occured = false;
        let mut back_occured = false;

        for point in points {
            match self.get_point_relation(point) {
                PointRelation::Front => front_occured = true,
                PointRelation::Back => back_occured = true,
                PointRelation::OnPlane => {}
            }
        }

        match (front_occured, back_occured) {
            (false, false) => PolygonRelation::OnPlane,
            (false, true ) => PolygonRelation::Back,
            (true , false) => PolygonRelation::Front,
            (true , true ) => PolygonRelation::Spanning,
        }
    }

    /// Intersection of plane and line passing through `begin` and `end`.
    /// Result is meaningful only if segment actually crosses the plane.
    pub fn intersect_edge(&self, begin: Vec3f, end: Vec3f) -> Vec3f {
        let direction = end - begin;
        let t = -self.get_signed_distance(begin) / (direction ^ self.normal);

        begin + direction * t
    }
}

/// Linearly interpolate texture coordinates of `intersection` lying on (begin, end) edge.
pub fn interpolate_uv(begin: Vec3f, end: Vec3f, intersection: Vec3f, begin_uv: Vec2f, end_uv: Vec2f) -> Vec2f {
    let edge_length = (end - begin).length();

    if edge_length <= f32::EPSILON {
        return begin_uv;
    }

    let scale = (intersection - begin).length() / edge_length;

    begin_uv + (end_uv - begin_uv) * scale
}

/// Bounding box
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundBox {
    /// minimal vector
    min: Vec3f,

    /// maximal vector
    max: Vec3f,
}

impl BoundBox {
    /// Zero-sized boundbox at origin
    pub const fn zero() -> Self {
        Self { min: Vec3f::zero(), max: Vec3f::zero() }
    }

    /// Build minimal boundbox that contains this pair of points
    pub fn new(p1: Vec3f, p2: Vec3f) -> Self {
        Self { min: p1.min(p2), max: p1.max(p2) }
    }

    /// Calculate common boundbox for some point set.
    /// Empty point set produces `BoundBox::zero()`.
    pub fn for_points(iter: impl IntoIterator<Item = Vec3f>) -> Self {
        let mut iter = iter.into_iter();

        let Some(first) = iter.next() else {
            return Self::zero();
        };

        iter.fold(Self { min: first, max: first }, |bound_box, point| Self {
            min: bound_box.min.min(point),
            max: bound_box.max.max(point),
        })
    }

    /// Get boundbox minimal fitting coordinates
    pub fn min(self) -> Vec3f {
        self.min
    }

    /// Get boundbox maximal fitting coordinates
    pub fn max(self) -> Vec3f {
        self.max
    }

    /// Get boundbox dimensions
    pub fn size(self) -> Vec3f {
        self.max - self.min
    }

    /// Check if point is inside of the box (borders included)
    pub fn contains(self, point: Vec3f) -> bool {
        true
            && point.x >= self.min.x && point.x <= self.max.x
            && point.y >= self.min.y && point.y <= self.max.y
            && point.z >= self.min.z && point.z <= self.max.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3f;

    #[test]
    fn point_relation_respects_epsilon() {
        let plane = Plane::from_point_normal(vec3f!(0.0, 0.0, 1.0), vec3f!(0.0, 0.0, 1.0));

        assert_eq!(plane.distance, -1.0);
        assert_eq!(plane.get_point_relation(vec3f!(5.0, 5.0, 2.0)), PointRelation::Front);
        assert_eq!(plane.get_point_relation(vec3f!(5.0, 5.0, 0.0)), PointRelation::Back);
        assert_eq!(plane.get_point_relation(vec3f!(5.0, 5.0, 1.0005)), PointRelation::OnPlane);
        assert_eq!(plane.get_point_relation(vec3f!(5.0, 5.0, 0.9995)), PointRelation::OnPlane);
    }

    #[test]
    fn points_relation_rules() {
        let plane = Plane::new(vec3f!(1.0, 0.0, 0.0), 0.0);

        let on = vec3f!(0.0, 1.0, 0.0);
        let front = vec3f!(1.0, 0.0, 0.0);
        let back = vec3f!(-1.0, 0.0, 0.0);

        assert_eq!(plane.get_points_relation([on, on, on]), PolygonRelation::OnPlane);
        assert_eq!(plane.get_points_relation([on, front, on]), PolygonRelation::Front);
        assert_eq!(plane.get_points_relation([back, on, back]), PolygonRelation::Back);
        assert_eq!(plane.get_points_relation([back, on, front]), PolygonRelation::Spanning);
        assert_eq!(plane.get_points_relation(std::iter::empty()), PolygonRelation::OnPlane);
    }

    #[test]
    fn from_points_is_ccw() {
        let plane = Plane::from_points(
            vec3f!(0.0, 0.0, 2.0),
            vec3f!(1.0, 0.0, 2.0),
            vec3f!(0.0, 1.0, 2.0),
        );

        assert_eq!(plane.normal, vec3f!(0.0, 0.0, 1.0));
        assert_eq!(plane.distance, -2.0);

        let negated = plane.negate_direction();
        assert_eq!(negated.get_point_relation(vec3f!(0.0, 0.0, 3.0)), PointRelation::Back);
    }

    #[test]
    fn edge_intersection_and_uv() {
        let plane = Plane::new(vec3f!(1.0, 0.0, 0.0), -1.0);
        let begin = vec3f!(0.0, 0.0, 0.0);
        let end = vec3f!(4.0, 4.0, 0.0);

        let point = plane.intersect_edge(begin, end);
        assert_eq!(point, vec3f!(1.0, 1.0, 0.0));

        let uv = interpolate_uv(begin, end, point, Vec2f::new(0.0, 0.0), Vec2f::new(1.0, 2.0));
        assert!((uv.x - 0.25).abs() < 1e-6);
        assert!((uv.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn bound_box_for_points() {
        assert_eq!(BoundBox::for_points(std::iter::empty()), BoundBox::zero());

        let bound_box = BoundBox::for_points([
            vec3f!(1.0, -1.0, 0.0),
            vec3f!(-2.0, 3.0, 0.5),
            vec3f!(0.0, 0.0, 4.0),
        ]);

        assert_eq!(bound_box.min(), vec3f!(-2.0, -1.0, 0.0));
        assert_eq!(bound_box.max(), vec3f!(1.0, 3.0, 4.0));
        assert!(bound_box.contains(vec3f!(0.0, 0.0, 0.0)));
        assert!(!bound_box.contains(vec3f!(0.0, 0.0, 5.0)));
    }
}
