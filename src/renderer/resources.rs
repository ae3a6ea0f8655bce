//! GPU resources the renderer owns for its whole lifetime.
//!
//! Resolution-dependent targets live together in [`FrameTargets`] and are
//! replaced as one unit: a resize either produces a complete new set or leaves
//! the old one in place.

use crate::error::{RenderError, RenderResult};
use crate::renderer::device::{
    Extent, GraphicsDevice, MeshId, TargetDesc, TargetId, TextureDesc, TextureFormat, TextureId,
};
use crate::renderer::primitives::{cube_mesh, sphere_mesh};
use crate::renderer::ssao::{SsaoKernel, KERNEL_SEED};
use crate::config::SsaoSettings;

/// Colour attachments of the G-buffer.
pub const GBUFFER_ALBEDO: u8 = 0;
pub const GBUFFER_NORMAL: u8 = 1;
pub const GBUFFER_MATERIAL: u8 = 2;

/// Every target sized to the output.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTargets {
    pub size: Extent,
    /// albedo + occlusion, normal + roughness, emissive + metallic, depth.
    pub gbuffer: TargetId,
    /// Scratch copy decals blend into.
    pub gbuffer_copy: TargetId,
    /// HDR lighting result with its own depth.
    pub illumination: TargetId,
    /// Half-resolution single-channel occlusion, when enabled.
    pub ambient_occlusion: Option<TargetId>,
    /// LDR ping-pong pair for the post chain.
    pub post: [TargetId; 2],
    pub post_scratch: TargetId,
}

impl FrameTargets {
    fn create(device: &mut dyn GraphicsDevice, size: Extent, with_ao: bool) -> RenderResult<Self> {
        let mut batch = TargetBatch {
            device,
            created: Vec::new(),
        };
        match Self::create_in(&mut batch, size, with_ao) {
            Ok(targets) => Ok(targets),
            Err(err) => {
                batch.rollback();
                Err(err)
            }
        }
    }

    fn create_in(batch: &mut TargetBatch<'_>, size: Extent, with_ao: bool) -> RenderResult<Self> {
        let gbuffer_desc = TargetDesc::color("gbuffer", size, TextureFormat::Rgba8Unorm)
            .with_attachment(TextureFormat::Rgba16Float)
            .with_attachment(TextureFormat::Rgba16Float)
            .with_depth();
        let gbuffer = batch.make(&gbuffer_desc)?;
        let gbuffer_copy = batch.make(&TargetDesc {
            label: "gbuffer copy",
            ..gbuffer_desc
        })?;
        let illumination = batch.make(
            &TargetDesc::color("illumination", size, TextureFormat::Rgba16Float).with_depth(),
        )?;
        let ambient_occlusion = if with_ao {
            Some(batch.make(&TargetDesc::color(
                "ambient occlusion",
                size.half(),
                TextureFormat::R8Unorm,
            ))?)
        } else {
            None
        };
        let post = [
            batch.make(&TargetDesc::color("post a", size, TextureFormat::Rgba8Unorm))?,
            batch.make(&TargetDesc::color("post b", size, TextureFormat::Rgba8Unorm))?,
        ];
        let post_scratch =
            batch.make(&TargetDesc::color("post scratch", size, TextureFormat::Rgba8Unorm))?;

        Ok(Self {
            size,
            gbuffer,
            gbuffer_copy,
            illumination,
            ambient_occlusion,
            post,
            post_scratch,
        })
    }

    fn all(&self) -> Vec<TargetId> {
        let mut targets = vec![self.gbuffer, self.gbuffer_copy, self.illumination];
        targets.extend(self.ambient_occlusion);
        targets.extend(self.post);
        targets.push(self.post_scratch);
        targets
    }

    fn destroy(&self, device: &mut dyn GraphicsDevice) {
        for target in self.all() {
            device.destroy_target(target);
        }
    }
}

struct TargetBatch<'a> {
    device: &'a mut dyn GraphicsDevice,
    created: Vec<TargetId>,
}

impl TargetBatch<'_> {
    fn make(&mut self, desc: &TargetDesc) -> RenderResult<TargetId> {
        let target = self.device.create_target(desc)?;
        self.created.push(target);
        Ok(target)
    }

    fn rollback(self) {
        for target in self.created {
            self.device.destroy_target(target);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ShadowAtlas {
    target: TargetId,
    slice: u32,
    lights: u32,
}

/// Owner of the renderer's shared targets, default textures and proxy meshes.
pub struct ResourceManager {
    targets: FrameTargets,
    shadow_atlas: Option<ShadowAtlas>,
    irradiance_lookup: Option<TextureId>,
    white: TextureId,
    ssao_kernel: TextureId,
    sphere: MeshId,
    cube: MeshId,
}

impl ResourceManager {
    pub fn new(
        device: &mut dyn GraphicsDevice,
        size: Extent,
        ssao: &SsaoSettings,
    ) -> RenderResult<Self> {
        if size.is_empty() {
            return Err(RenderError::InvalidTargetSize {
                width: size.width,
                height: size.height,
            });
        }

        let white = device.create_texture(
            &TextureDesc {
                label: "default white",
                size: Extent::new(1, 1),
                format: TextureFormat::Rgba8Unorm,
                cube: false,
            },
            &[255, 255, 255, 255],
        )?;
        let kernel = SsaoKernel::generate(SsaoSettings::MAX_KERNEL_SIZE as usize, KERNEL_SEED, true);
        let ssao_kernel = device.create_texture(&kernel.texture_desc(), &kernel.texel_bytes())?;

        let (vertices, indices) = sphere_mesh(16, 12);
        let sphere = device.create_mesh(&vertices, &indices)?;
        let (vertices, indices) = cube_mesh();
        let cube = device.create_mesh(&vertices, &indices)?;

        let targets = FrameTargets::create(device, size, ssao.enabled)?;
        log::info!(
            "Allocated frame targets {}x{} (ambient occlusion {})",
            size.width,
            size.height,
            if ssao.enabled { "on" } else { "off" }
        );

        Ok(Self {
            targets,
            shadow_atlas: None,
            irradiance_lookup: None,
            white,
            ssao_kernel,
            sphere,
            cube,
        })
    }

    pub fn targets(&self) -> &FrameTargets {
        &self.targets
    }

    /// Replace every resolution-dependent target. On failure the previous set
    /// stays intact and the error is returned.
    pub fn resize(
        &mut self,
        device: &mut dyn GraphicsDevice,
        size: Extent,
        with_ao: bool,
    ) -> RenderResult<()> {
        if size.is_empty() {
            return Err(RenderError::InvalidTargetSize {
                width: size.width,
                height: size.height,
            });
        }
        let fresh = FrameTargets::create(device, size, with_ao)?;
        let old = std::mem::replace(&mut self.targets, fresh);
        old.destroy(device);
        log::info!("Reallocated frame targets at {}x{}", size.width, size.height);
        Ok(())
    }

    /// Reallocate when the AO setting no longer matches the current set.
    pub fn sync_ambient_occlusion(
        &mut self,
        device: &mut dyn GraphicsDevice,
        enabled: bool,
    ) -> RenderResult<()> {
        if self.targets.ambient_occlusion.is_some() != enabled {
            self.resize(device, self.targets.size, enabled)?;
        }
        Ok(())
    }

    /// Atlas with `lights` horizontal slices of `slice` x `slice` texels,
    /// recreated when either changes.
    pub fn shadow_atlas(
        &mut self,
        device: &mut dyn GraphicsDevice,
        slice: u32,
        lights: u32,
    ) -> RenderResult<TargetId> {
        if let Some(atlas) = self.shadow_atlas {
            if atlas.slice == slice && atlas.lights == lights {
                return Ok(atlas.target);
            }
        }
        let target = device.create_target(&TargetDesc::depth_only(
            "shadow atlas",
            Extent::new(slice * lights.max(1), slice),
        ))?;
        if let Some(old) = self.shadow_atlas.replace(ShadowAtlas {
            target,
            slice,
            lights,
        }) {
            device.destroy_target(old.target);
        }
        Ok(target)
    }

    pub fn irradiance_lookup(&self) -> Option<TextureId> {
        self.irradiance_lookup
    }

    pub fn set_irradiance_lookup(&mut self, device: &mut dyn GraphicsDevice, lookup: TextureId) {
        if let Some(old) = self.irradiance_lookup.replace(lookup) {
            device.destroy_texture(old);
        }
    }

    pub fn white(&self) -> TextureId {
        self.white
    }

    pub fn ssao_kernel(&self) -> TextureId {
        self.ssao_kernel
    }

    /// Unit-radius sphere for light proxies and probes.
    pub fn sphere(&self) -> MeshId {
        self.sphere
    }

    /// Unit cube for decal volumes.
    pub fn cube(&self) -> MeshId {
        self.cube
    }

    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        self.targets.destroy(device);
        if let Some(atlas) = self.shadow_atlas.take() {
            device.destroy_target(atlas.target);
        }
        if let Some(lookup) = self.irradiance_lookup.take() {
            device.destroy_texture(lookup);
        }
        device.destroy_texture(self.white);
        device.destroy_texture(self.ssao_kernel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::device::HeadlessDevice;

    fn settings(enabled: bool) -> SsaoSettings {
        SsaoSettings {
            enabled,
            ..SsaoSettings::default()
        }
    }

    #[test]
    fn failed_resize_keeps_previous_targets() {
        let mut device = HeadlessDevice::new(Extent::new(800, 600)).with_max_target_dimension(1024);
        let mut resources =
            ResourceManager::new(&mut device, Extent::new(800, 600), &settings(true)).unwrap();
        let before = resources.targets().clone();
        let live = device.live_target_count();

        let result = resources.resize(&mut device, Extent::new(1920, 1080), true);
        assert!(matches!(result, Err(RenderError::InvalidTargetSize { .. })));
        assert_eq!(resources.targets(), &before);
        assert_eq!(device.live_target_count(), live);
        assert!(device.is_live(before.gbuffer));
    }

    #[test]
    fn zero_size_is_rejected() {
        let mut device = HeadlessDevice::new(Extent::new(8, 8));
        let mut resources =
            ResourceManager::new(&mut device, Extent::new(8, 8), &settings(false)).unwrap();
        assert!(resources.resize(&mut device, Extent::new(0, 8), false).is_err());
        assert_eq!(resources.targets().size, Extent::new(8, 8));
    }

    #[test]
    fn ao_target_is_half_resolution_and_toggles() {
        let mut device = HeadlessDevice::new(Extent::new(64, 32));
        let mut resources =
            ResourceManager::new(&mut device, Extent::new(64, 32), &settings(true)).unwrap();
        let ao = resources.targets().ambient_occlusion.unwrap();
        assert_eq!(device.target_size(ao), Some(Extent::new(32, 16)));

        resources.sync_ambient_occlusion(&mut device, false).unwrap();
        assert!(resources.targets().ambient_occlusion.is_none());
        assert!(!device.is_live(ao));
    }

    #[test]
    fn atlas_is_reused_until_layout_changes() {
        let mut device = HeadlessDevice::new(Extent::new(8, 8));
        let mut resources =
            ResourceManager::new(&mut device, Extent::new(8, 8), &settings(false)).unwrap();
        let a = resources.shadow_atlas(&mut device, 256, 4).unwrap();
        assert_eq!(resources.shadow_atlas(&mut device, 256, 4).unwrap(), a);
        assert_eq!(device.target_size(a), Some(Extent::new(1024, 256)));

        let b = resources.shadow_atlas(&mut device, 512, 4).unwrap();
        assert_ne!(a, b);
        assert!(!device.is_live(a));
    }
}
