use glam::Vec3;
use wgpu_lighting::renderer::device::TextureFormat;
use wgpu_lighting::renderer::ssao::{SsaoKernel, KERNEL_SEED};

#[test]
fn folded_kernel_stays_in_the_upper_hemisphere() {
    let kernel = SsaoKernel::generate(64, KERNEL_SEED, true);
    assert_eq!(kernel.samples().len(), 64);
    for sample in kernel.samples() {
        assert!(sample.z >= 0.0, "{sample:?} below the surface");
        assert!(sample.length() <= 1.0 + 1e-5, "{sample:?} outside unit sphere");
    }
}

#[test]
fn unfolded_kernel_covers_both_hemispheres() {
    let kernel = SsaoKernel::generate(64, KERNEL_SEED, false);
    assert!(kernel.samples().iter().any(|s| s.z < 0.0));
    assert!(kernel.samples().iter().any(|s| s.z > 0.0));
}

#[test]
fn early_samples_cluster_near_the_origin() {
    let kernel = SsaoKernel::generate(64, KERNEL_SEED, true);
    let mean = |samples: &[Vec3]| {
        samples.iter().map(|s| s.length()).sum::<f32>() / samples.len() as f32
    };
    let (early, late) = kernel.samples().split_at(16);
    assert!(mean(early) < mean(&late[32..]));
    // The ramp starts at a tenth of the radius
    assert!(kernel.samples()[0].length() <= 0.1 + 1e-5);
}

#[test]
fn kernel_is_deterministic_per_seed() {
    let a = SsaoKernel::generate(32, KERNEL_SEED, true);
    let b = SsaoKernel::generate(32, KERNEL_SEED, true);
    let c = SsaoKernel::generate(32, KERNEL_SEED + 1, true);
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn kernel_texture_holds_one_texel_per_sample() {
    let kernel = SsaoKernel::generate(16, KERNEL_SEED, true);
    let desc = kernel.texture_desc();
    assert_eq!(desc.format, TextureFormat::Rgba32Float);
    assert_eq!(desc.size.width, 16);
    assert_eq!(desc.size.height, 1);
    assert_eq!(kernel.texel_bytes().len(), 16 * 16);
}
