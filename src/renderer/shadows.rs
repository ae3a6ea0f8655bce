use std::collections::HashMap;

use glam::Mat4;

use crate::error::RenderResult;
use crate::renderer::device::{
    slots, Extent, Geometry, GraphicsDevice, LoadOp, PassDesc, PassTarget, RasterState, Rect,
    TargetDesc, TargetId, TextureRef,
};
use crate::renderer::frame::{apply_material, material_cull, FrameContext, FrameLight};
use crate::renderer::programs;
use crate::renderer::render_calls::{build_with_frustum, RenderCall, RenderCondition};
use crate::renderer::uniforms::ShaderParams;
use crate::scene::Frustum;

/// Lifecycle of one light's shadow map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowState {
    #[default]
    NotCasting,
    Capturing,
    /// Holds a map captured this frame or earlier.
    Idle,
}

#[derive(Debug, Clone, Copy)]
struct ShadowMap {
    target: TargetId,
    state: ShadowState,
}

/// Reference for the depth comparison the lighting programs perform: 1 when
/// the fragment is lit, 0 when something nearer to the light occludes it.
pub fn shadow_factor(fragment_depth: f32, stored_depth: f32, bias: f32) -> f32 {
    if fragment_depth - bias <= stored_depth {
        1.0
    } else {
        0.0
    }
}

/// Width of one atlas slice: the per-light map size, shrunk so that
/// `lights` slices side by side stay within `max_dimension`.
pub fn atlas_slice(map_size: u32, lights: u32, max_dimension: u32) -> u32 {
    map_size.min(max_dimension / lights.max(1)).max(1)
}

/// Per-light depth maps, keyed by the light's entity index.
#[derive(Debug, Default)]
pub struct ShadowMaps {
    maps: HashMap<usize, ShadowMap>,
    /// Lights captured into the shared atlas on the last atlas frame.
    atlas_states: HashMap<usize, ShadowState>,
    size: u32,
}

impl ShadowMaps {
    pub fn new(size: u32) -> Self {
        Self {
            maps: HashMap::new(),
            atlas_states: HashMap::new(),
            size,
        }
    }

    pub fn map_size(&self) -> u32 {
        self.size
    }

    pub fn state(&self, entity: usize) -> ShadowState {
        self.maps
            .get(&entity)
            .map(|map| map.state)
            .or_else(|| self.atlas_states.get(&entity).copied())
            .unwrap_or(ShadowState::NotCasting)
    }

    pub fn target(&self, entity: usize) -> Option<TargetId> {
        self.maps.get(&entity).map(|map| map.target)
    }

    /// Number of per-light maps currently allocated.
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Drop every map when the quality setting changes the size; they are
    /// recreated at the new size on their next capture.
    pub fn set_map_size(&mut self, device: &mut dyn GraphicsDevice, size: u32) {
        if size == self.size {
            return;
        }
        log::info!(
            "Shadow map size {} -> {}, releasing {} maps",
            self.size,
            size,
            self.maps.len()
        );
        self.release(device);
        self.size = size;
    }

    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        for (_, map) in self.maps.drain() {
            device.destroy_target(map.target);
        }
        self.atlas_states.clear();
    }

    /// Destroy the maps of entities that are no longer casting lights.
    fn retain_casting(&mut self, device: &mut dyn GraphicsDevice, lights: &[FrameLight]) {
        let stale: Vec<usize> = self
            .maps
            .keys()
            .copied()
            .filter(|entity| {
                !lights
                    .iter()
                    .any(|light| light.entity == *entity && light.light.cast_shadows)
            })
            .collect();
        for entity in stale {
            if let Some(map) = self.maps.remove(&entity) {
                log::debug!("Releasing shadow map of light entity {entity}");
                device.destroy_target(map.target);
            }
        }
    }

    fn map_for(&mut self, device: &mut dyn GraphicsDevice, entity: usize) -> RenderResult<TargetId> {
        if let Some(map) = self.maps.get(&entity) {
            return Ok(map.target);
        }
        let target = device.create_target(&TargetDesc::depth_only(
            "shadow map",
            Extent::new(self.size, self.size),
        ))?;
        self.maps.insert(
            entity,
            ShadowMap {
                target,
                state: ShadowState::Idle,
            },
        );
        Ok(target)
    }

    fn set_state(&mut self, entity: usize, state: ShadowState) {
        if let Some(map) = self.maps.get_mut(&entity) {
            map.state = state;
        }
    }

    /// Capture one map per casting light that can reach the camera frustum,
    /// and bind it into that light's parameters.
    pub(crate) fn render(
        &mut self,
        ctx: &mut FrameContext<'_>,
        lights: &mut [FrameLight],
        camera_frustum: &Frustum,
    ) -> RenderResult<()> {
        self.atlas_states.clear();
        self.retain_casting(ctx.device, lights);

        for light in lights.iter_mut() {
            if !light.light.cast_shadows {
                continue;
            }
            if let Some((center, radius)) = light.light.influence_sphere(&light.model) {
                if !camera_frustum.intersects_sphere(center, radius) {
                    continue;
                }
            }

            let target = self.map_for(ctx.device, light.entity)?;
            self.set_state(light.entity, ShadowState::Capturing);

            let view_proj = light.light.shadow_camera(&light.model).view_proj();
            ctx.device.begin_pass(&depth_pass("shadow map", PassTarget::offscreen(target)));
            draw_casters(ctx, view_proj);
            ctx.device.end_pass();

            self.set_state(light.entity, ShadowState::Idle);
            light.params.shadow = [1.0, light.light.shadow_bias, 0.0, 1.0];
            light.params.shadow_view_proj = view_proj.to_cols_array_2d();
            light.shadow = Some(TextureRef::Depth(target));
            ctx.stats.shadow_maps += 1;
        }
        Ok(())
    }

    /// Capture up to `max_lights` casting lights into horizontal slices of
    /// one atlas target, `slice` pixels wide each. Per-light maps are
    /// released while the atlas is in use.
    pub(crate) fn render_atlas(
        &mut self,
        ctx: &mut FrameContext<'_>,
        atlas: TargetId,
        slice: u32,
        max_lights: u32,
        lights: &mut [FrameLight],
        camera_frustum: &Frustum,
    ) {
        for (_, map) in self.maps.drain() {
            ctx.device.destroy_target(map.target);
        }
        self.atlas_states.clear();

        let mut pass_open = false;
        let mut slot = 0u32;

        for light in lights.iter_mut() {
            if slot >= max_lights {
                break;
            }
            if !light.light.cast_shadows {
                continue;
            }
            if let Some((center, radius)) = light.light.influence_sphere(&light.model) {
                if !camera_frustum.intersects_sphere(center, radius) {
                    continue;
                }
            }

            if !pass_open {
                ctx.device
                    .begin_pass(&depth_pass("shadow atlas", PassTarget::offscreen(atlas)));
                pass_open = true;
            }
            self.atlas_states.insert(light.entity, ShadowState::Capturing);

            let rect = Rect::new(slot * slice, 0, slice, slice);
            ctx.device.set_viewport(rect);
            ctx.device.set_scissor(Some(rect));

            let view_proj = light.light.shadow_camera(&light.model).view_proj();
            draw_casters(ctx, view_proj);

            let scale = 1.0 / max_lights as f32;
            light.params.shadow = [1.0, light.light.shadow_bias, slot as f32 * scale, scale];
            light.params.shadow_view_proj = view_proj.to_cols_array_2d();
            light.shadow = Some(TextureRef::Depth(atlas));
            ctx.stats.shadow_maps += 1;
            self.atlas_states.insert(light.entity, ShadowState::Idle);
            slot += 1;
        }

        if pass_open {
            ctx.device.set_scissor(None);
            ctx.device.end_pass();
        }
    }
}

fn depth_pass(label: &'static str, target: PassTarget) -> PassDesc {
    PassDesc {
        label,
        target,
        color: LoadOp::Load,
        depth: LoadOp::Clear(1.0),
    }
}

/// Solid geometry seen from the light, depth only.
fn draw_casters(ctx: &mut FrameContext<'_>, view_proj: Mat4) {
    let frustum = Frustum::from_matrix(view_proj);
    let (calls, _) = build_with_frustum(ctx.scene, ctx.assets, Some(&frustum), None);
    let base = ShaderParams {
        view_proj: view_proj.to_cols_array_2d(),
        ..Default::default()
    };
    for call in calls
        .iter()
        .filter(|call| RenderCondition::NoAlpha.accepts(call.transparent))
    {
        draw_caster(ctx, call, &base);
    }
}

fn draw_caster(
    ctx: &mut FrameContext<'_>,
    call: &RenderCall,
    base: &ShaderParams,
) {
    let Some((mesh, material)) = ctx.resolve(call) else {
        return;
    };
    let mut params = base.with_model(call.model);
    apply_material(&mut params, material);
    let textures = [(
        slots::ALBEDO,
        TextureRef::Texture(material.color_texture.unwrap_or(ctx.white())),
    )];
    let state = RasterState::default()
        .with_cull(material_cull(material))
        .without_color();
    if ctx.draw(
        programs::SHADOW_DEPTH,
        Geometry::Mesh(mesh.gpu()),
        state,
        &params,
        &textures,
    ) {
        ctx.stats.shadow_draw_calls += 1;
    }
}
