//! View frustum extraction and conservative visibility tests.
//!
//! Planes are pulled from a view-projection matrix with the Gribb-Hartmann
//! method, adjusted for the [0, 1] clip depth range wgpu uses: the near plane is
//! row 2 alone rather than row 3 + row 2.

use glam::{Mat4, Vec3, Vec4};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center_half_extents(center: Vec3, half: Vec3) -> Self {
        Self::new(center - half.abs(), center + half.abs())
    }

    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self { min, max })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Box enclosing this box after `transform`, which may rotate or scale.
    pub fn transformed(&self, transform: Mat4) -> Self {
        let center = transform.transform_point3(self.center());
        let half = self.half_extents();
        // |M| * h bounds the rotated box
        let x = transform.x_axis.truncate().abs() * half.x;
        let y = transform.y_axis.truncate().abs() * half.y;
        let z = transform.z_axis.truncate().abs() * half.z;
        Self::from_center_half_extents(center, x + y + z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Points into the inside half-space.
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    pub fn from_vec4(v: Vec4) -> Self {
        let normal = v.truncate();
        let length = normal.length();

        if length > 0.0 {
            Self {
                normal: normal / length,
                distance: v.w / length,
            }
        } else {
            Self {
                normal: Vec3::Y,
                distance: 0.0,
            }
        }
    }

    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Six half-spaces: left, right, bottom, top, near, far.
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    pub fn from_matrix(view_proj: Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);

        Self {
            planes: [
                Plane::from_vec4(r3 + r0),
                Plane::from_vec4(r3 - r0),
                Plane::from_vec4(r3 + r1),
                Plane::from_vec4(r3 - r1),
                Plane::from_vec4(r2),
                Plane::from_vec4(r3 - r2),
            ],
        }
    }

    /// False only when the box lies entirely outside one plane.
    pub fn intersects_box(&self, center: Vec3, half_extents: Vec3) -> bool {
        self.planes.iter().all(|plane| {
            let radius = half_extents.abs().dot(plane.normal.abs());
            plane.distance_to_point(center) >= -radius
        })
    }

    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.intersects_box(aabb.center(), aabb.half_extents())
    }

    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(center) >= -radius)
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.intersects_sphere(point, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frustum() -> Frustum {
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.5, 50.0);
        Frustum::from_matrix(proj * view)
    }

    #[test]
    fn near_plane_follows_zero_to_one_depth() {
        let frustum = test_frustum();
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, -0.25)));
        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -0.75)));
        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -49.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, -51.0)));
    }

    #[test]
    fn box_straddling_a_plane_is_kept() {
        let frustum = test_frustum();
        // Centre behind the camera, extent reaching into view
        assert!(frustum.intersects_box(Vec3::new(0.0, 0.0, 1.0), Vec3::splat(2.0)));
        assert!(!frustum.intersects_box(Vec3::new(0.0, 0.0, 5.0), Vec3::splat(1.0)));
    }

    #[test]
    fn transformed_box_encloses_rotated_corners() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let transform = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4)
            * Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let world = aabb.transformed(transform);

        for x in [-1.0, 1.0] {
            for y in [-1.0, 1.0] {
                for z in [-1.0, 1.0] {
                    let p = transform.transform_point3(Vec3::new(x, y, z));
                    assert!(p.cmpge(world.min - 1e-5).all() && p.cmple(world.max + 1e-5).all());
                }
            }
        }
    }
}
