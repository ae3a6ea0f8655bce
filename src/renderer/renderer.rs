// renderer/renderer.rs
use glam::{Mat4, Vec3};
use instant::Instant;

use crate::asset::Assets;
use crate::config::{DebugView, LightingMode, PipelineMode, RendererConfig};
use crate::error::{RenderError, RenderResult};
use crate::renderer::debug;
use crate::renderer::deferred::{render_deferred, DeferredFrame};
use crate::renderer::device::{Extent, GraphicsDevice, PassTarget, TargetId};
use crate::renderer::forward::{render_forward, ForwardSettings};
use crate::renderer::frame::{collect_lights, FrameContext, FrameLight, RenderView};
use crate::renderer::irradiance::{self, IrradianceBinding};
use crate::renderer::postprocess;
use crate::renderer::reflections::capture_probe;
use crate::renderer::render_calls::{
    build_render_calls, sort_render_calls, RenderCall, RenderCondition,
};
use crate::renderer::resources::{FrameTargets, ResourceManager};
use crate::renderer::shadows::{atlas_slice, ShadowMaps, ShadowState};
use crate::scene::{Camera, Frustum, Scene};

/// Counters for one `render_frame` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RendererStats {
    /// Calls that survived culling.
    pub render_calls: usize,
    pub culled_calls: usize,
    /// Every submitted draw, shadow and post passes included.
    pub draw_calls: usize,
    /// Draws dropped for a missing program, mesh or material.
    pub skipped_draws: usize,
    pub shadow_maps: usize,
    pub shadow_draw_calls: usize,
    pub geometry_draw_calls: usize,
    pub light_draw_calls: usize,
    pub overlay_draw_calls: usize,
    pub post_passes: usize,
}

impl RendererStats {
    pub fn scene_draw_calls(&self) -> usize {
        self.draw_calls
            .saturating_sub(self.shadow_draw_calls)
            .saturating_sub(self.post_passes)
    }
}

#[derive(Debug, Clone, Copy)]
struct AtlasSlices {
    target: TargetId,
    slice: u32,
    max_lights: u32,
}

/// Everything resolved for one frame before the device frame begins.
struct FramePlan<'a> {
    scene: &'a Scene,
    assets: &'a Assets,
    config: &'a RendererConfig,
    view: RenderView,
    frustum: Frustum,
    calls: Vec<RenderCall>,
    lights: Vec<FrameLight>,
    irradiance: Option<IrradianceBinding>,
    targets: FrameTargets,
    atlas: Option<AtlasSlices>,
    deferred: bool,
}

/// The rendering core: owns the device, the frame targets and the shadow maps,
/// and turns a scene into one presented frame per `render_frame` call.
pub struct Renderer<D: GraphicsDevice> {
    device: D,
    resources: ResourceManager,
    shadows: ShadowMaps,
    previous_view_proj: Option<Mat4>,
    frame_in_flight: bool,
}

impl<D: GraphicsDevice> Renderer<D> {
    pub fn new(mut device: D, config: &RendererConfig) -> RenderResult<Self> {
        let size = device.output_size();
        let resources = ResourceManager::new(&mut device, size, &config.ssao)?;
        log::info!(
            "Renderer ready on {} backend at {}x{}",
            device.backend_name(),
            size.width,
            size.height
        );
        let shadows = ShadowMaps::new(
            config
                .quality
                .shadow_map_size()
                .min(device.max_target_dimension()),
        );
        Ok(Self {
            device,
            resources,
            shadows,
            previous_view_proj: None,
            frame_in_flight: false,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn shadow_state(&self, light_entity: usize) -> ShadowState {
        self.shadows.state(light_entity)
    }

    pub fn shadow_map(&self, light_entity: usize) -> Option<TargetId> {
        self.shadows.target(light_entity)
    }

    pub fn is_frame_in_flight(&self) -> bool {
        self.frame_in_flight
    }

    /// Reallocate every resolution-dependent target and the output. On error
    /// both keep their previous size.
    pub fn handle_resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        let size = Extent::new(width, height);
        if size.is_empty() {
            return Err(RenderError::InvalidTargetSize { width, height });
        }
        let previous = self.device.output_size();
        self.device.resize_output(size)?;

        let with_ao = self.resources.targets().ambient_occlusion.is_some();
        if let Err(err) = self.resources.resize(&mut self.device, size, with_ao) {
            if let Err(restore) = self.device.resize_output(previous) {
                log::error!("Could not restore output size after failed resize: {restore}");
            }
            return Err(err);
        }
        self.previous_view_proj = None;
        self.frame_in_flight = false;
        Ok(())
    }

    /// Render and present one frame of `scene` seen through `camera`.
    ///
    /// Once the device frame has begun it is always ended, even when a pass
    /// fails; the first error is returned.
    pub fn render_frame(
        &mut self,
        scene: &Scene,
        assets: &Assets,
        camera: &Camera,
        config: &RendererConfig,
    ) -> RenderResult<RendererStats> {
        if self.frame_in_flight {
            log::warn!("Previous frame did not complete, starting a new one");
        }
        self.frame_in_flight = true;
        let result = self.draw_frame(scene, assets, camera, config);
        self.frame_in_flight = false;

        if let Ok(stats) = &result {
            log::debug!(
                "Frame: {} calls ({} culled), {} draws, {} shadow maps",
                stats.render_calls,
                stats.culled_calls,
                stats.draw_calls,
                stats.shadow_maps
            );
        }
        result
    }

    fn draw_frame(
        &mut self,
        scene: &Scene,
        assets: &Assets,
        camera: &Camera,
        config: &RendererConfig,
    ) -> RenderResult<RendererStats> {
        let max_dimension = self.device.max_target_dimension();
        let map_size = config.quality.shadow_map_size().min(max_dimension);
        self.shadows.set_map_size(&mut self.device, map_size);
        self.resources
            .sync_ambient_occlusion(&mut self.device, config.ssao.enabled)?;

        let size = self.resources.targets().size;
        let camera = camera.with_aspect(size.aspect());
        let mut view = RenderView::from_camera(&camera, size);
        if let Some(previous) = self.previous_view_proj {
            view.previous_view_proj = previous;
        }

        let deferred =
            config.pipeline == PipelineMode::Deferred || config.debug_view == DebugView::GBuffers;
        let atlas = if !deferred && config.lighting == LightingMode::SinglePass {
            let max_lights = config.shadow_atlas_max_lights;
            let slice = atlas_slice(map_size, max_lights, max_dimension);
            let target = self
                .resources
                .shadow_atlas(&mut self.device, slice, max_lights)?;
            Some(AtlasSlices {
                target,
                slice,
                max_lights,
            })
        } else {
            None
        };

        let (mut calls, build) = build_render_calls(scene, assets, Some(&camera));
        sort_render_calls(&mut calls);
        let mut stats = RendererStats {
            render_calls: build.emitted as usize,
            culled_calls: build.culled as usize,
            ..RendererStats::default()
        };
        let mut plan = FramePlan {
            scene,
            assets,
            config,
            view,
            frustum: camera.frustum(),
            calls,
            lights: collect_lights(scene),
            irradiance: self.irradiance_binding(scene, config),
            targets: self.resources.targets().clone(),
            atlas,
            deferred,
        };

        self.device.begin_frame()?;
        let recorded = self.record_passes(&mut plan, &mut stats);
        let presented = self.device.end_frame();
        recorded?;
        presented?;

        self.previous_view_proj = Some(plan.view.view_proj);
        Ok(stats)
    }

    /// Every pass of one frame, between `begin_frame` and `end_frame`.
    fn record_passes(
        &mut self,
        plan: &mut FramePlan<'_>,
        stats: &mut RendererStats,
    ) -> RenderResult<()> {
        let config = plan.config;
        let mut ctx = FrameContext {
            device: &mut self.device,
            assets: plan.assets,
            scene: plan.scene,
            config,
            resources: &self.resources,
            stats,
        };

        match plan.atlas {
            Some(atlas) => self.shadows.render_atlas(
                &mut ctx,
                atlas.target,
                atlas.slice,
                atlas.max_lights,
                &mut plan.lights,
                &plan.frustum,
            ),
            None => self
                .shadows
                .render(&mut ctx, &mut plan.lights, &plan.frustum)?,
        }

        let view = &plan.view;
        let targets = &plan.targets;
        let debug_property = config.debug_view.property_index();
        if plan.deferred {
            let frame = DeferredFrame {
                view,
                frustum: &plan.frustum,
                calls: &plan.calls,
                lights: &plan.lights,
                irradiance: plan.irradiance,
                debug_property,
            };
            render_deferred(&mut ctx, targets, &frame);
        } else {
            let settings = ForwardSettings {
                lights: &plan.lights,
                mode: config.lighting,
                condition: RenderCondition::All,
                debug_property,
                ambient: plan.scene.ambient_light,
                irradiance: plan.irradiance,
            };
            let background = plan.scene.background_color.extend(1.0).to_array();
            render_forward(
                &mut ctx,
                "forward",
                PassTarget::offscreen(targets.illumination),
                Some(background),
                view,
                &plan.calls,
                &settings,
            );
        }

        if config.show_probes {
            debug::render_probes(&mut ctx, view, targets.illumination, plan.irradiance);
        }

        if config.debug_view == DebugView::GBuffers {
            debug::render_gbuffer_quadrants(&mut ctx, targets);
        } else {
            postprocess::run(&mut ctx, view, targets, self.previous_view_proj);
        }

        if config.debug_view == DebugView::ShadowMap {
            debug::render_shadow_overlay(&mut ctx, &plan.lights);
        }
        Ok(())
    }

    fn irradiance_binding(
        &self,
        scene: &Scene,
        config: &RendererConfig,
    ) -> Option<IrradianceBinding> {
        if !config.irradiance {
            return None;
        }
        let grid = scene.irradiance_grid()?;
        let lookup = self.resources.irradiance_lookup()?;
        Some(IrradianceBinding::new(lookup, grid))
    }

    fn ensure_idle(&self) -> RenderResult<()> {
        if self.frame_in_flight {
            return Err(RenderError::FrameInFlight);
        }
        Ok(())
    }

    /// Capture SH irradiance at every probe of the scene's grid and upload the
    /// lookup texture. Blocking; returns the number of probes baked.
    pub fn bake_irradiance(
        &mut self,
        scene: &mut Scene,
        assets: &Assets,
        config: &RendererConfig,
    ) -> RenderResult<usize> {
        self.ensure_idle()?;
        let positions: Vec<Vec3> = scene
            .irradiance_grid()
            .ok_or(RenderError::NoIrradianceGrid)?
            .probes()
            .iter()
            .map(|probe| probe.position)
            .collect();

        let started = Instant::now();
        let size = config.quality.irradiance_capture_size();
        let capture = self
            .device
            .create_target(&irradiance::capture_target_desc(size))?;

        let baked = {
            let lights = collect_lights(scene);
            let (calls, _) = build_render_calls(scene, assets, None);
            let mut stats = RendererStats::default();
            let mut ctx = FrameContext {
                device: &mut self.device,
                assets,
                scene,
                config,
                resources: &self.resources,
                stats: &mut stats,
            };
            irradiance::bake_probes(&mut ctx, capture, size, &positions, &calls, &lights)
        };
        self.device.destroy_target(capture);
        let baked = baked?;

        let grid = scene
            .irradiance_grid_mut()
            .ok_or(RenderError::NoIrradianceGrid)?;
        for (probe, sh) in grid.probes_mut().iter_mut().zip(baked) {
            probe.sh = sh;
        }
        self.upload_irradiance(scene)?;

        log::info!(
            "Baked {} irradiance probes at {}px in {:.2?}",
            positions.len(),
            size,
            started.elapsed()
        );
        Ok(positions.len())
    }

    fn upload_irradiance(&mut self, scene: &Scene) -> RenderResult<()> {
        let probes = scene
            .irradiance_grid()
            .ok_or(RenderError::NoIrradianceGrid)?
            .probes();
        let lookup = self.device.create_texture(
            &irradiance::lookup_desc(probes.len()),
            &irradiance::lookup_bytes(probes),
        )?;
        self.resources.set_irradiance_lookup(&mut self.device, lookup);
        Ok(())
    }

    /// Capture a mipmapped cubemap at every reflection probe, then refresh the
    /// nearest-probe assignment. Returns the number of probes captured.
    pub fn bake_reflections(
        &mut self,
        scene: &mut Scene,
        assets: &Assets,
        config: &RendererConfig,
    ) -> RenderResult<usize> {
        self.ensure_idle()?;
        let started = Instant::now();
        let size = config.quality.reflection_capture_size();
        let positions: Vec<Vec3> = scene
            .reflection_probes()
            .map(|(entity, _)| entity.position())
            .collect();
        let irradiance = self.irradiance_binding(scene, config);

        let mut captured: Vec<TargetId> = Vec::with_capacity(positions.len());
        let mut failure = None;
        {
            let lights: Vec<FrameLight> = collect_lights(scene);
            let (calls, _) = build_render_calls(scene, assets, None);
            let mut stats = RendererStats::default();
            let mut ctx = FrameContext {
                device: &mut self.device,
                assets,
                scene,
                config,
                resources: &self.resources,
                stats: &mut stats,
            };
            for &position in &positions {
                match capture_probe(&mut ctx, position, size, &calls, &lights, irradiance) {
                    Ok(cubemap) => captured.push(cubemap),
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
        }
        if let Some(err) = failure {
            for cubemap in captured {
                self.device.destroy_target(cubemap);
            }
            return Err(err);
        }
        self.device.flush();

        for ((_, probe), cubemap) in scene.reflection_probes_mut().zip(captured) {
            if let Some(old) = probe.cubemap.replace(cubemap) {
                self.device.destroy_target(old);
            }
        }
        scene.update_nearest_reflection_probes();

        log::info!(
            "Captured {} reflection probes at {}px in {:.2?}",
            positions.len(),
            size,
            started.elapsed()
        );
        Ok(positions.len())
    }

    pub fn save_irradiance_cache(&self, scene: &Scene, config: &RendererConfig) -> RenderResult<()> {
        let grid = scene.irradiance_grid().ok_or(RenderError::NoIrradianceGrid)?;
        irradiance::save_cache(grid, &config.irradiance_cache_path)
    }

    /// Replace the scene's grid with the cached one and upload its lookup.
    /// The grid is untouched when the file is missing or malformed.
    pub fn load_irradiance_cache(
        &mut self,
        scene: &mut Scene,
        config: &RendererConfig,
    ) -> RenderResult<()> {
        self.ensure_idle()?;
        let grid = scene
            .irradiance_grid_mut()
            .ok_or(RenderError::NoIrradianceGrid)?;
        irradiance::load_cache(grid, &config.irradiance_cache_path)?;
        self.upload_irradiance(scene)
    }

    /// Destroy every GPU resource the renderer owns.
    pub fn release(&mut self) {
        self.shadows.release(&mut self.device);
        self.resources.release(&mut self.device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::device::HeadlessDevice;

    #[test]
    fn bake_is_rejected_while_a_frame_is_in_flight() {
        let device = HeadlessDevice::new(Extent::new(32, 32));
        let mut renderer = Renderer::new(device, &RendererConfig::default()).unwrap();
        renderer.frame_in_flight = true;
        let mut scene = Scene::new();
        let result = renderer.bake_reflections(&mut scene, &Assets::default(), &RendererConfig::default());
        assert!(matches!(result, Err(RenderError::FrameInFlight)));

        renderer.handle_resize(16, 16).unwrap();
        assert!(!renderer.is_frame_in_flight());
    }

    #[test]
    fn zero_resize_is_an_error() {
        let device = HeadlessDevice::new(Extent::new(32, 32));
        let mut renderer = Renderer::new(device, &RendererConfig::default()).unwrap();
        assert!(matches!(
            renderer.handle_resize(0, 10),
            Err(RenderError::InvalidTargetSize { .. })
        ));
        assert_eq!(renderer.resources().targets().size, Extent::new(32, 32));
    }

    #[test]
    fn stats_split_scene_draws() {
        let stats = RendererStats {
            draw_calls: 10,
            shadow_draw_calls: 3,
            post_passes: 2,
            ..RendererStats::default()
        };
        assert_eq!(stats.scene_draw_calls(), 5);
    }
}
