//! Screen-space ambient occlusion: the sample kernel and the occlusion pass.

use glam::Vec3;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::config::SsaoSettings;
use crate::renderer::device::{
    slots, Extent, Geometry, PassDesc, PassTarget, RasterState, TextureDesc, TextureFormat,
    TextureRef,
};
use crate::renderer::frame::{FrameContext, RenderView};
use crate::renderer::programs;
use crate::renderer::resources::FrameTargets;

/// Fixed seed so the kernel, and therefore the noise pattern, is stable.
pub const KERNEL_SEED: u64 = 0x55A0_2024;

/// Sample offsets inside the unit sphere (or +Z hemisphere when folded).
#[derive(Debug, Clone, PartialEq)]
pub struct SsaoKernel {
    samples: Vec<Vec3>,
}

impl SsaoKernel {
    /// `count` samples. Radii use the cube root of a uniform variable, further
    /// scaled by an accelerating ramp so early samples sit close to the origin.
    /// With `fold_hemisphere`, samples below z = 0 are mirrored up.
    pub fn generate(count: usize, seed: u64, fold_hemisphere: bool) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut samples = Vec::with_capacity(count);

        while samples.len() < count {
            let candidate = Vec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            );
            let length = candidate.length();
            if !(1e-3..=1.0).contains(&length) {
                continue;
            }
            let mut direction = candidate / length;
            if fold_hemisphere && direction.z < 0.0 {
                direction.z = -direction.z;
            }

            let u: f32 = rng.gen();
            let t = samples.len() as f32 / count as f32;
            let ramp = 0.1 + 0.9 * t * t;
            samples.push(direction * u.cbrt() * ramp);
        }

        Self { samples }
    }

    pub fn samples(&self) -> &[Vec3] {
        &self.samples
    }

    /// One `Rgba32Float` texel per sample.
    pub fn texel_bytes(&self) -> Vec<u8> {
        let texels: Vec<[f32; 4]> = self.samples.iter().map(|s| s.extend(0.0).to_array()).collect();
        bytemuck::cast_slice(&texels).to_vec()
    }

    pub fn texture_desc(&self) -> TextureDesc {
        TextureDesc {
            label: "ssao kernel",
            size: Extent::new(self.samples.len().max(1) as u32, 1),
            format: TextureFormat::Rgba32Float,
            cube: false,
        }
    }
}

/// Fill the AO target from the G-buffer depth and normals. Returns `false`
/// when there is no AO target to write.
pub(crate) fn render_ssao(
    ctx: &mut FrameContext<'_>,
    view: &RenderView,
    targets: &FrameTargets,
    settings: &SsaoSettings,
) -> bool {
    let Some(ao) = targets.ambient_occlusion else {
        return false;
    };

    ctx.device.begin_pass(&PassDesc::clear(
        "ssao",
        PassTarget::offscreen(ao),
        [1.0, 1.0, 1.0, 1.0],
    ));

    let mut params = view.params();
    params.viewport[0] = targets.size.half().width as f32;
    params.viewport[1] = targets.size.half().height as f32;
    params.effect = [
        settings.radius,
        settings.bias,
        settings.kernel_size as f32,
        0.0,
    ];
    let textures = [
        (slots::SCENE_DEPTH, TextureRef::Depth(targets.gbuffer)),
        (
            slots::NORMAL,
            TextureRef::Color {
                target: targets.gbuffer,
                attachment: 1,
            },
        ),
        (slots::DATA, TextureRef::Texture(ctx.resources.ssao_kernel())),
    ];
    ctx.draw(
        programs::SSAO,
        Geometry::Fullscreen,
        RasterState::fullscreen(),
        &params,
        &textures,
    );
    ctx.device.end_pass();
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_is_deterministic_for_a_seed() {
        let a = SsaoKernel::generate(16, KERNEL_SEED, true);
        let b = SsaoKernel::generate(16, KERNEL_SEED, true);
        assert_eq!(a, b);
        assert_eq!(a.samples().len(), 16);
    }

    #[test]
    fn texels_hold_one_vec4_per_sample() {
        let kernel = SsaoKernel::generate(8, 1, false);
        assert_eq!(kernel.texel_bytes().len(), 8 * 16);
        assert_eq!(kernel.texture_desc().size, Extent::new(8, 1));
    }
}
