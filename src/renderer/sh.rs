//! Second-order (L2) spherical harmonics for diffuse irradiance.

use std::f32::consts::PI;

use glam::Vec3;
use rayon::prelude::*;

use super::cubemap::{texel_coords, CubeFace};

pub const SH_COEFFICIENTS: usize = 9;

const Y00: f32 = 0.282_095;
const Y1: f32 = 0.488_603;
const Y2_CROSS: f32 = 1.092_548;
const Y20: f32 = 0.315_392;
const Y22: f32 = 0.546_274;

/// Cosine-lobe convolution weight per band.
const BAND_WEIGHTS: [f32; 3] = [PI, 2.0 * PI / 3.0, PI / 4.0];
const COEFFICIENT_BAND: [usize; SH_COEFFICIENTS] = [0, 1, 1, 1, 2, 2, 2, 2, 2];

/// Evaluate the nine real SH basis functions for a unit direction.
pub fn basis(dir: Vec3) -> [f32; SH_COEFFICIENTS] {
    let Vec3 { x, y, z } = dir;
    [
        Y00,
        Y1 * y,
        Y1 * z,
        Y1 * x,
        Y2_CROSS * x * y,
        Y2_CROSS * y * z,
        Y20 * (3.0 * z * z - 1.0),
        Y2_CROSS * x * z,
        Y22 * (x * x - y * y),
    ]
}

/// Radiance projected onto the L2 basis, one RGB triple per coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SphericalHarmonics {
    pub coeffs: [Vec3; SH_COEFFICIENTS],
}

impl SphericalHarmonics {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Project six cube faces, each `size` x `size` RGBA texels in row-major
    /// order, onto the basis. Faces are in [`CubeFace::ALL`] order.
    ///
    /// Returns `None` when a face is missing or has the wrong texel count.
    pub fn from_cubemap(faces: &[Vec<[f32; 4]>], size: u32) -> Option<Self> {
        let texels = (size as usize).pow(2);
        if size == 0
            || faces.len() != CubeFace::ALL.len()
            || faces.iter().any(|f| f.len() != texels)
        {
            return None;
        }

        let (sum, weight) = faces
            .par_iter()
            .enumerate()
            .map(|(i, pixels)| project_face(CubeFace::ALL[i], pixels, size))
            .reduce(
                || ([Vec3::ZERO; SH_COEFFICIENTS], 0.0),
                |(mut a, wa), (b, wb)| {
                    for (lhs, rhs) in a.iter_mut().zip(b) {
                        *lhs += rhs;
                    }
                    (a, wa + wb)
                },
            );

        if weight <= 0.0 {
            return None;
        }

        // Normalise the discrete solid angles to exactly cover the sphere
        let norm = 4.0 * PI / weight;
        Some(Self {
            coeffs: sum.map(|c| c * norm),
        })
    }

    /// Diffuse irradiance around `normal`, divided by pi so that a uniform
    /// environment of colour C reconstructs to C.
    pub fn irradiance(&self, normal: Vec3) -> Vec3 {
        let dir = normal.normalize_or_zero();
        let y = basis(dir);
        let mut result = Vec3::ZERO;
        for i in 0..SH_COEFFICIENTS {
            result += self.coeffs[i] * (BAND_WEIGHTS[COEFFICIENT_BAND[i]] * y[i]);
        }
        (result / PI).max(Vec3::ZERO)
    }

    /// Flattened as 9 RGB triples.
    pub fn to_array(&self) -> [f32; SH_COEFFICIENTS * 3] {
        let mut out = [0.0; SH_COEFFICIENTS * 3];
        for (i, c) in self.coeffs.iter().enumerate() {
            out[i * 3..i * 3 + 3].copy_from_slice(&c.to_array());
        }
        out
    }

    pub fn from_array(values: &[f32; SH_COEFFICIENTS * 3]) -> Self {
        let mut coeffs = [Vec3::ZERO; SH_COEFFICIENTS];
        for (i, c) in coeffs.iter_mut().enumerate() {
            *c = Vec3::new(values[i * 3], values[i * 3 + 1], values[i * 3 + 2]);
        }
        Self { coeffs }
    }
}

fn project_face(face: CubeFace, pixels: &[[f32; 4]], size: u32) -> ([Vec3; SH_COEFFICIENTS], f32) {
    let mut sum = [Vec3::ZERO; SH_COEFFICIENTS];
    let mut weight_sum = 0.0;

    for row in 0..size {
        for col in 0..size {
            let (s, t) = texel_coords(col, row, size);
            // Solid angle subtended by the texel, up to a constant factor
            let weight = (1.0 + s * s + t * t).powf(-1.5);
            let dir = face.texel_direction(col, row, size).normalize();
            let [r, g, b, _] = pixels[(row * size + col) as usize];
            let radiance = Vec3::new(r, g, b) * weight;

            for (acc, y) in sum.iter_mut().zip(basis(dir)) {
                *acc += radiance * y;
            }
            weight_sum += weight;
        }
    }

    (sum, weight_sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_faces(color: [f32; 4], size: u32) -> Vec<Vec<[f32; 4]>> {
        vec![vec![color; (size * size) as usize]; 6]
    }

    #[test]
    fn basis_band_zero_is_constant() {
        assert_eq!(basis(Vec3::X)[0], basis(Vec3::NEG_Y)[0]);
    }

    #[test]
    fn uniform_environment_has_only_dc_term() {
        let sh = SphericalHarmonics::from_cubemap(&uniform_faces([0.5, 0.25, 1.0, 1.0], 8), 8)
            .unwrap();
        for c in &sh.coeffs[1..] {
            assert!(c.abs().max_element() < 1e-4, "{c:?}");
        }
        let expected_dc = Vec3::new(0.5, 0.25, 1.0) * Y00 * 4.0 * PI;
        assert!(sh.coeffs[0].abs_diff_eq(expected_dc, 1e-3));
    }

    #[test]
    fn bright_ceiling_lights_upward_normals_more() {
        let size = 8;
        let mut faces = uniform_faces([0.0; 4], size);
        faces[CubeFace::PositiveY.layer() as usize] = vec![[1.0, 1.0, 1.0, 1.0]; 64];
        let sh = SphericalHarmonics::from_cubemap(&faces, size).unwrap();

        let up = sh.irradiance(Vec3::Y);
        let down = sh.irradiance(Vec3::NEG_Y);
        let side = sh.irradiance(Vec3::X);
        assert!(up.x > side.x && side.x > down.x, "{up:?} {side:?} {down:?}");
    }

    #[test]
    fn rejects_malformed_faces() {
        assert!(SphericalHarmonics::from_cubemap(&uniform_faces([1.0; 4], 4)[..5], 4).is_none());
        assert!(SphericalHarmonics::from_cubemap(&uniform_faces([1.0; 4], 4), 5).is_none());
        assert!(SphericalHarmonics::from_cubemap(&[], 0).is_none());
    }

    #[test]
    fn array_layout_is_rgb_per_coefficient() {
        let mut sh = SphericalHarmonics::zero();
        sh.coeffs[1] = Vec3::new(1.0, 2.0, 3.0);
        let flat = sh.to_array();
        assert_eq!(&flat[3..6], &[1.0, 2.0, 3.0]);
        assert_eq!(SphericalHarmonics::from_array(&flat), sh);
    }
}
