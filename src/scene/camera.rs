use glam::{Mat4, Vec3};

use super::frustum::Frustum;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    Perspective { fov_y_radians: f32 },
    Orthographic { half_width: f32, half_height: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn perspective(eye: Vec3, target: Vec3, fov_y_radians: f32, near: f32, far: f32) -> Self {
        Self {
            eye,
            target,
            up: Vec3::Y,
            projection: Projection::Perspective { fov_y_radians },
            aspect: 1.0,
            near,
            far,
        }
    }

    pub fn orthographic(
        eye: Vec3,
        target: Vec3,
        half_width: f32,
        half_height: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            eye,
            target,
            up: Vec3::Y,
            projection: Projection::Orthographic {
                half_width,
                half_height,
            },
            aspect: 1.0,
            near,
            far,
        }
    }

    pub fn with_up(mut self, up: Vec3) -> Self {
        self.up = up;
        self
    }

    pub fn with_aspect(mut self, aspect: f32) -> Self {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
        self
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn proj(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective { fov_y_radians } => {
                Mat4::perspective_rh(fov_y_radians, self.aspect, self.near, self.far)
            }
            Projection::Orthographic {
                half_width,
                half_height,
            } => Mat4::orthographic_rh(
                -half_width,
                half_width,
                -half_height,
                half_height,
                self.near,
                self.far,
            ),
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj() * self.view()
    }

    pub fn position(&self) -> Vec3 {
        self.eye
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.eye).normalize_or_zero()
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(self.view_proj())
    }

    pub fn test_box_in_frustum(&self, center: Vec3, half_extents: Vec3) -> bool {
        self.frustum().intersects_box(center, half_extents)
    }

    pub fn test_sphere_in_frustum(&self, center: Vec3, radius: f32) -> bool {
        self.frustum().intersects_sphere(center, radius)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(
            Vec3::new(0.0, 0.0, 3.0),
            Vec3::ZERO,
            60f32.to_radians(),
            0.1,
            100.0,
        )
    }
}

/// Up vector for a look-at along `forward` that never degenerates.
pub fn stable_up(forward: Vec3) -> Vec3 {
    if forward.normalize_or_zero().abs().dot(Vec3::Y) > 0.95 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}
