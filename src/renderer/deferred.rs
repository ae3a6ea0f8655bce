//! Deferred shading: surface attributes go to the G-buffer first, lighting is
//! reconstructed in screen space, transparency is overlaid forward.

use glam::{Mat4, Vec3};

use crate::config::LightingMode;
use crate::renderer::device::{
    slots, Blend, Cull, DepthTest, Geometry, LoadOp, PassDesc, PassTarget, RasterState,
    TextureRef,
};
use crate::renderer::forward::{draw_background, draw_calls, ForwardSettings};
use crate::renderer::frame::{
    apply_material, material_cull, material_textures, FrameContext, FrameLight, RenderView,
};
use crate::renderer::irradiance::IrradianceBinding;
use crate::renderer::programs;
use crate::renderer::render_calls::{RenderCall, RenderCondition};
use crate::renderer::resources::{FrameTargets, GBUFFER_ALBEDO, GBUFFER_MATERIAL, GBUFFER_NORMAL};
use crate::renderer::ssao::render_ssao;
use crate::renderer::uniforms::ShaderParams;
use crate::scene::{Frustum, LightType};

/// Proxy spheres are tessellated; grow them so the flat facets still cover
/// the full light range.
const PROXY_SCALE: f32 = 1.05;

pub(crate) struct DeferredFrame<'f> {
    pub view: &'f RenderView,
    pub frustum: &'f Frustum,
    pub calls: &'f [RenderCall],
    pub lights: &'f [FrameLight],
    pub irradiance: Option<IrradianceBinding>,
    pub debug_property: Option<u32>,
}

/// Record the whole deferred path into the illumination target.
pub(crate) fn render_deferred(
    ctx: &mut FrameContext<'_>,
    targets: &FrameTargets,
    frame: &DeferredFrame<'_>,
) {
    geometry_pass(ctx, targets, frame);
    decal_pass(ctx, targets, frame.view);

    let config = ctx.config;
    let ao_bound = match targets.ambient_occlusion {
        Some(_) if config.ssao.enabled => render_ssao(ctx, frame.view, targets, &config.ssao),
        _ => false,
    };

    ctx.device.copy_depth(targets.gbuffer, targets.illumination);
    let background = ctx.scene.background_color.extend(1.0).to_array();
    ctx.device.begin_pass(&PassDesc {
        label: "deferred lighting",
        target: PassTarget::offscreen(targets.illumination),
        color: LoadOp::Clear(background),
        depth: LoadOp::Load,
    });
    draw_background(ctx, frame.view);

    if let Some(property) = frame.debug_property {
        let mut params = frame.view.params();
        params.effect[0] = property as f32;
        ctx.draw(
            programs::DEBUG_GBUFFER,
            Geometry::Fullscreen,
            RasterState::fullscreen(),
            &params,
            &gbuffer_textures(targets),
        );
        ctx.device.end_pass();
        return;
    }

    ambient_pass(ctx, targets, frame, ao_bound);
    for light in frame.lights {
        match light.light.light_type {
            LightType::Directional => directional_pass(ctx, targets, frame.view, light),
            LightType::Point | LightType::Spot => {
                local_light_pass(ctx, targets, frame.view, frame.frustum, light)
            }
        }
    }

    // Blended materials were left out of the G-buffer.
    let settings = ForwardSettings {
        lights: frame.lights,
        mode: LightingMode::MultiPass,
        condition: RenderCondition::OnlyAlpha,
        debug_property: None,
        ambient: ctx.scene.ambient_light,
        irradiance: frame.irradiance,
    };
    let before = ctx.stats.draw_calls;
    draw_calls(ctx, frame.view, frame.calls, &settings);
    ctx.stats.overlay_draw_calls += ctx.stats.draw_calls - before;
    ctx.device.end_pass();
}

fn geometry_pass(ctx: &mut FrameContext<'_>, targets: &FrameTargets, frame: &DeferredFrame<'_>) {
    ctx.device.begin_pass(&PassDesc::clear(
        "gbuffer",
        PassTarget::offscreen(targets.gbuffer),
        [0.0, 0.0, 0.0, 0.0],
    ));
    let dither = ctx.config.dither_transparency;
    for call in frame.calls {
        if call.transparent && !dither {
            continue;
        }
        let Some((mesh, material)) = ctx.resolve(call) else {
            continue;
        };
        let mut params = frame.view.params().with_model(call.model);
        apply_material(&mut params, material);
        if call.transparent {
            params.effect[0] = 1.0;
        }
        let textures = material_textures(material, ctx.white());
        let state = RasterState::default().with_cull(frame.view.cull(material_cull(material)));
        if ctx.draw(
            programs::GBUFFER,
            Geometry::Mesh(mesh.gpu()),
            state,
            &params,
            &textures,
        ) {
            ctx.stats.geometry_draw_calls += 1;
        }
    }
    ctx.device.end_pass();
}

/// Blend decal textures into a copy of the G-buffer, then copy it back.
fn decal_pass(ctx: &mut FrameContext<'_>, targets: &FrameTargets, view: &RenderView) {
    let scene = ctx.scene;
    let mut decals = scene.decals().peekable();
    if decals.peek().is_none() {
        return;
    }

    ctx.device.copy_target(targets.gbuffer, targets.gbuffer_copy);
    ctx.device.begin_pass(&PassDesc::load(
        "decals",
        PassTarget::offscreen(targets.gbuffer_copy),
    ));
    let cube = ctx.resources.cube();
    let state = RasterState::default()
        .with_blend(Blend::Alpha)
        .with_depth(DepthTest::Always, false)
        .with_cull(Cull::Front);
    for (entity, decal) in decals {
        let params = view.params().with_model(entity.model);
        let albedo = decal.albedo.unwrap_or(ctx.white());
        ctx.draw(
            programs::DECAL,
            Geometry::Mesh(cube),
            state,
            &params,
            &[
                (slots::SCENE_DEPTH, TextureRef::Depth(targets.gbuffer)),
                (slots::ALBEDO, TextureRef::Texture(albedo)),
            ],
        );
    }
    ctx.device.end_pass();
    ctx.device.copy_target(targets.gbuffer_copy, targets.gbuffer);
}

fn gbuffer_textures(targets: &FrameTargets) -> Vec<(u32, TextureRef)> {
    let attachment = |attachment| TextureRef::Color {
        target: targets.gbuffer,
        attachment,
    };
    vec![
        (slots::ALBEDO, attachment(GBUFFER_ALBEDO)),
        (slots::NORMAL, attachment(GBUFFER_NORMAL)),
        (slots::METALLIC_ROUGHNESS, attachment(GBUFFER_MATERIAL)),
        (slots::SCENE_DEPTH, TextureRef::Depth(targets.gbuffer)),
    ]
}

fn lighting_state() -> RasterState {
    RasterState::fullscreen().with_blend(Blend::Additive)
}

fn ambient_pass(
    ctx: &mut FrameContext<'_>,
    targets: &FrameTargets,
    frame: &DeferredFrame<'_>,
    ao_bound: bool,
) {
    let mut params = frame
        .view
        .params()
        .with_ambient(ctx.scene.ambient_light, true);
    params.emissive[3] = 1.0;
    params.flags[3] = u32::from(ao_bound);

    let mut textures = gbuffer_textures(targets);
    let occlusion = match targets.ambient_occlusion {
        Some(target) if ao_bound => TextureRef::color(target),
        _ => TextureRef::Texture(ctx.white()),
    };
    textures.push((slots::AUX0, occlusion));
    if let Some(environment) = ctx.scene.environment {
        textures.push((slots::ENVIRONMENT, TextureRef::Texture(environment)));
        params.effect_extra[0] = 1.0;
    }
    if let Some(irradiance) = frame.irradiance {
        irradiance.apply(&mut params);
        textures.push(irradiance.slot());
    }

    if ctx.draw(
        programs::DEFERRED_AMBIENT,
        Geometry::Fullscreen,
        lighting_state(),
        &params,
        &textures,
    ) {
        ctx.stats.light_draw_calls += 1;
    }
}

fn light_textures(targets: &FrameTargets, light: &FrameLight) -> Vec<(u32, TextureRef)> {
    let mut textures = gbuffer_textures(targets);
    if let Some(shadow) = light.shadow {
        textures.push((slots::SHADOW_MAP, shadow));
    }
    textures
}

fn directional_pass(
    ctx: &mut FrameContext<'_>,
    targets: &FrameTargets,
    view: &RenderView,
    light: &FrameLight,
) {
    let params = view.params().with_light(light.params);
    if ctx.draw(
        programs::DEFERRED_DIRECTIONAL,
        Geometry::Fullscreen,
        lighting_state(),
        &params,
        &light_textures(targets, light),
    ) {
        ctx.stats.light_draw_calls += 1;
    }
}

/// Model matrix of the sphere proxy covering a local light's range.
pub(crate) fn proxy_model(position: Vec3, range: f32) -> Mat4 {
    Mat4::from_translation(position) * Mat4::from_scale(Vec3::splat(range * PROXY_SCALE))
}

/// Back faces normally; front faces would vanish once the eye is inside the
/// volume, so those draw the far side instead.
pub(crate) fn proxy_cull(eye: Vec3, near: f32, position: Vec3, range: f32) -> Cull {
    if eye.distance(position) <= range * PROXY_SCALE + near {
        Cull::Front
    } else {
        Cull::Back
    }
}

fn local_light_pass(
    ctx: &mut FrameContext<'_>,
    targets: &FrameTargets,
    view: &RenderView,
    frustum: &Frustum,
    light: &FrameLight,
) {
    let Some((position, range)) = light.light.influence_sphere(&light.model) else {
        return;
    };
    if range <= 0.0 || !frustum.intersects_sphere(position, range) {
        return;
    }
    let params: ShaderParams = view
        .params()
        .with_model(proxy_model(position, range))
        .with_light(light.params);
    let state = RasterState::default()
        .with_blend(Blend::Additive)
        .with_depth(DepthTest::Always, false)
        .with_cull(proxy_cull(view.eye, view.near, position, range));
    if ctx.draw(
        programs::DEFERRED_LOCAL,
        Geometry::Mesh(ctx.resources.sphere()),
        state,
        &params,
        &light_textures(targets, light),
    ) {
        ctx.stats.light_draw_calls += 1;
    }
}
