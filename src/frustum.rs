//! View frustum

use crate::{geom::{BoundBox, Plane}, math::Vec3f};

/// Six clipping planes with normals pointing inside the viewed volume
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    pub const RIGHT: usize = 0;
    pub const LEFT: usize = 1;
    pub const BOTTOM: usize = 2;
    pub const TOP: usize = 3;
    pub const FAR: usize = 4;
    pub const NEAR: usize = 5;

    /// Build frustum from plane set in RIGHT, LEFT, BOTTOM, TOP, FAR, NEAR order
    pub const fn from_planes(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract clipping planes from column-major view-projection matrix
    pub fn from_view_projection(m: &[f32; 16]) -> Self {
        let row = |r: usize| [m[r], m[4 + r], m[8 + r], m[12 + r]];
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        let combine = |sign: f32, r: [f32; 4]| {
            let normal = Vec3f::new(r3[0] + sign * r[0], r3[1] + sign * r[1], r3[2] + sign * r[2]);
            let distance = r3[3] + sign * r[3];
            let inv_length = 1.0 / normal.length();

            Plane::new(normal * inv_length, distance * inv_length)
        };

        Self {
            planes: [
                combine(-1.0, r0),
                combine(1.0, r0),
                combine(1.0, r1),
                combine(-1.0, r1),
                combine(-1.0, r2),
                combine(1.0, r2),
            ],
        }
    }

    /// Build perspective frustum of camera located at `eye` and looking to `forward`
    ///
    /// `fov_y` is full vertical field of view (radians), `aspect` is width/height.
    pub fn perspective(eye: Vec3f, forward: Vec3f, up: Vec3f, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        let forward = forward.normalized();
        let right = (forward % up).normalized();
        let up = right % forward;

        let half_vertical = fov_y * 0.5;
        let half_horizontal = (half_vertical.tan() * aspect).atan();

        let (sin_h, cos_h) = half_horizontal.sin_cos();
        let (sin_v, cos_v) = half_vertical.sin_cos();

        let side = |normal: Vec3f| Plane::from_point_normal(eye, normal);

        Self {
            planes: [
                side(forward * sin_h - right * cos_h),
                side(forward * sin_h + right * cos_h),
                side(forward * sin_v + up * cos_v),
                side(forward * sin_v - up * cos_v),
                Plane::from_point_normal(eye + forward * far, -forward),
                Plane::from_point_normal(eye + forward * near, forward),
            ],
        }
    }

    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    pub fn plane(&self, index: usize) -> Plane {
        self.planes[index]
    }

    /// Planes used for portal clipping (near plane excluded)
    pub fn clipping_planes(&self) -> &[Plane] {
        &self.planes[..Self::NEAR]
    }

    pub fn test_point(&self, point: Vec3f) -> bool {
        self.planes.iter().all(|plane| plane.get_signed_distance(point) >= 0.0)
    }

    pub fn test_sphere(&self, center: Vec3f, radius: f32) -> bool {
        self.planes.iter().all(|plane| plane.get_signed_distance(center) >= -radius)
    }

    /// Check if box is (at least partially) inside of frustum
    pub fn test_bound_box(&self, bound_box: BoundBox) -> bool {
        let (min, max) = (bound_box.min(), bound_box.max());

        self.planes.iter().all(|plane| {
            // farthest box corner along plane normal
            let corner = Vec3f::new(
                if plane.normal.x >= 0.0 { max.x } else { min.x },
                if plane.normal.y >= 0.0 { max.y } else { min.y },
                if plane.normal.z >= 0.0 { max.z } else { min.z },
            );

            plane.get_signed_distance(corner) >= 0.0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3f;

    fn camera() -> Frustum {
        Frustum::perspective(
            vec3f!(0.0, 0.0, 0.0),
            vec3f!(1.0, 0.0, 0.0),
            vec3f!(0.0, 0.0, 1.0),
            std::f32::consts::FRAC_PI_2,
            1.0,
            0.1,
            100.0,
        )
    }

    #[test]
    fn perspective_contains_forward_points() {
        let frustum = camera();

        assert!(frustum.test_point(vec3f!(10.0, 0.0, 0.0)));
        assert!(frustum.test_point(vec3f!(10.0, 5.0, -5.0)));
        assert!(!frustum.test_point(vec3f!(-1.0, 0.0, 0.0)));
        assert!(!frustum.test_point(vec3f!(10.0, 20.0, 0.0)));
        assert!(!frustum.test_point(vec3f!(10.0, 0.0, 20.0)));
        assert!(!frustum.test_point(vec3f!(200.0, 0.0, 0.0)));
        assert!(!frustum.test_point(vec3f!(0.05, 0.0, 0.0)));
    }

    #[test]
    fn perspective_plane_order() {
        let frustum = camera();

        // camera right is -Y for X-forward, Z-up camera
        assert!(frustum.plane(Frustum::RIGHT).get_signed_distance(vec3f!(10.0, -20.0, 0.0)) < 0.0);
        assert!(frustum.plane(Frustum::LEFT).get_signed_distance(vec3f!(10.0, 20.0, 0.0)) < 0.0);
        assert!(frustum.plane(Frustum::BOTTOM).get_signed_distance(vec3f!(10.0, 0.0, -20.0)) < 0.0);
        assert!(frustum.plane(Frustum::TOP).get_signed_distance(vec3f!(10.0, 0.0, 20.0)) < 0.0);
        assert_eq!(frustum.clipping_planes().len(), 5);
    }

    #[test]
    fn sphere_and_box_tests() {
        let frustum = camera();

        assert!(frustum.test_sphere(vec3f!(-0.5, 0.0, 0.0), 1.0));
        assert!(!frustum.test_sphere(vec3f!(-5.0, 0.0, 0.0), 1.0));

        assert!(frustum.test_bound_box(BoundBox::new(vec3f!(5.0, -1.0, -1.0), vec3f!(6.0, 1.0, 1.0))));
        assert!(!frustum.test_bound_box(BoundBox::new(vec3f!(-6.0, -1.0, -1.0), vec3f!(-5.0, 1.0, 1.0))));
    }

    #[test]
    fn identity_matrix_is_unit_cube() {
        #[rustfmt::skip]
        let identity = [
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        let frustum = Frustum::from_view_projection(&identity);

        assert!(frustum.test_point(vec3f!(0.0, 0.0, 0.0)));
        assert!(frustum.test_point(vec3f!(0.9, -0.9, 0.5)));
        assert!(!frustum.test_point(vec3f!(2.0, 0.0, 0.0)));
        assert!(!frustum.test_point(vec3f!(0.0, 0.0, -2.0)));
        assert_eq!(frustum.plane(Frustum::RIGHT).normal, vec3f!(-1.0, 0.0, 0.0));
        assert_eq!(frustum.plane(Frustum::NEAR).normal, vec3f!(0.0, 0.0, 1.0));
    }
}
