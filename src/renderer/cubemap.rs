//! Cube face orientation shared by probe capture and SH projection.
//!
//! Faces follow the layer order +X, -X, +Y, -Y, +Z, -Z. Within a face, image
//! columns run along `right()` and rows run down along `-up()`, which is the
//! orientation cube sampling expects. Looking out from the centre that image is
//! mirrored relative to a right-handed camera, so captures flip clip-space x.

use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn layer(self) -> u32 {
        self as u32
    }

    pub fn forward(self) -> Vec3 {
        match self {
            CubeFace::PositiveX => Vec3::X,
            CubeFace::NegativeX => Vec3::NEG_X,
            CubeFace::PositiveY => Vec3::Y,
            CubeFace::NegativeY => Vec3::NEG_Y,
            CubeFace::PositiveZ => Vec3::Z,
            CubeFace::NegativeZ => Vec3::NEG_Z,
        }
    }

    pub fn up(self) -> Vec3 {
        match self {
            CubeFace::PositiveY => Vec3::NEG_Z,
            CubeFace::NegativeY => Vec3::Z,
            _ => Vec3::Y,
        }
    }

    pub fn right(self) -> Vec3 {
        self.up().cross(self.forward())
    }

    /// World direction through the centre of texel (`col`, `row`) of a face
    /// `size` texels wide. Not normalised.
    pub fn texel_direction(self, col: u32, row: u32, size: u32) -> Vec3 {
        let (s, t) = texel_coords(col, row, size);
        self.forward() + self.right() * s - self.up() * t
    }

    /// View-projection capturing this face from `eye` with a 90 degree frustum.
    pub fn view_proj(self, eye: Vec3, near: f32, far: f32) -> Mat4 {
        let view = Mat4::look_at_rh(eye, eye + self.forward(), self.up());
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far);
        Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0)) * proj * view
    }
}

/// Texel centre mapped to [-1, 1]; `t` grows downwards.
pub(crate) fn texel_coords(col: u32, row: u32, size: u32) -> (f32, f32) {
    let size = size.max(1) as f32;
    let s = 2.0 * (col as f32 + 0.5) / size - 1.0;
    let t = 2.0 * (row as f32 + 0.5) / size - 1.0;
    (s, t)
}
