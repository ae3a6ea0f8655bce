//! Forward shading: every call is lit as it is drawn.

use glam::Vec3;

use crate::asset::{Material, Mesh};
use crate::config::LightingMode;
use crate::renderer::device::{
    slots, Blend, DepthTest, Geometry, PassDesc, PassTarget, RasterState, TextureRef,
};
use crate::renderer::frame::{
    apply_material, material_cull, material_textures, FrameContext, FrameLight, RenderView,
};
use crate::renderer::irradiance::IrradianceBinding;
use crate::renderer::programs;
use crate::renderer::render_calls::{RenderCall, RenderCondition};
use crate::renderer::uniforms::{LightParams, ShaderParams, MAX_SINGLE_PASS_LIGHTS};
use crate::scene::LightType;

/// How a forward pass lights and filters its calls.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ForwardSettings<'l> {
    pub lights: &'l [FrameLight],
    pub mode: LightingMode,
    pub condition: RenderCondition,
    /// Material property view in place of lighting.
    pub debug_property: Option<u32>,
    pub ambient: Vec3,
    pub irradiance: Option<IrradianceBinding>,
}

/// Open a pass on `target`, draw the background when clearing, then the calls.
pub(crate) fn render_forward(
    ctx: &mut FrameContext<'_>,
    label: &'static str,
    target: PassTarget,
    clear: Option<[f32; 4]>,
    view: &RenderView,
    calls: &[RenderCall],
    settings: &ForwardSettings<'_>,
) {
    match clear {
        Some(color) => {
            ctx.device.begin_pass(&PassDesc::clear(label, target, color));
            draw_background(ctx, view);
        }
        None => ctx.device.begin_pass(&PassDesc::load(label, target)),
    }
    draw_calls(ctx, view, calls, settings);
    ctx.device.end_pass();
}

/// Environment cube behind everything, when the scene has one.
pub(crate) fn draw_background(ctx: &mut FrameContext<'_>, view: &RenderView) {
    let Some(environment) = ctx.scene.environment else {
        return;
    };
    let params = view.params();
    let state = RasterState::fullscreen().with_depth(DepthTest::LessEqual, false);
    ctx.draw(
        programs::SKYBOX,
        Geometry::Fullscreen,
        state,
        &params,
        &[(slots::ENVIRONMENT, TextureRef::Texture(environment))],
    );
}

/// Draw the accepted calls of an already open pass.
pub(crate) fn draw_calls(
    ctx: &mut FrameContext<'_>,
    view: &RenderView,
    calls: &[RenderCall],
    settings: &ForwardSettings<'_>,
) {
    for call in calls
        .iter()
        .filter(|call| settings.condition.accepts(call.transparent))
    {
        let Some((mesh, material)) = ctx.resolve(call) else {
            continue;
        };
        let (params, textures) = call_inputs(ctx, view, call, material, settings);
        let state = RasterState::default()
            .with_cull(view.cull(material_cull(material)))
            .with_blend(if material.is_transparent() {
                Blend::Alpha
            } else {
                Blend::Opaque
            });

        if let Some(property) = settings.debug_property {
            let mut params = params;
            params.flags[1] = property;
            ctx.draw(
                programs::DEBUG_PROPERTY,
                Geometry::Mesh(mesh.gpu()),
                state,
                &params,
                &textures,
            );
            continue;
        }

        match settings.mode {
            LightingMode::MultiPass => {
                draw_multi_pass(ctx, mesh, call, params, textures, state, settings.lights)
            }
            LightingMode::SinglePass => {
                draw_single_pass(ctx, mesh, call, params, textures, state, settings.lights)
            }
        }
    }
}

/// Parameters and texture slots shared by every draw of one call.
fn call_inputs(
    ctx: &FrameContext<'_>,
    view: &RenderView,
    call: &RenderCall,
    material: &Material,
    settings: &ForwardSettings<'_>,
) -> (ShaderParams, Vec<(u32, TextureRef)>) {
    let mut params = view.params().with_model(call.model);
    apply_material(&mut params, material);

    let mut textures = material_textures(material, ctx.white()).to_vec();

    let reflection = call
        .reflection_probe
        .and_then(|index| ctx.scene.reflection_probe(index))
        .and_then(|probe| probe.cubemap())
        .filter(|_| ctx.config.reflections);
    let environment = match (reflection, ctx.scene.environment) {
        (Some(cubemap), _) => Some(TextureRef::color(cubemap)),
        (None, Some(environment)) => Some(TextureRef::Texture(environment)),
        (None, None) => None,
    };
    if let Some(environment) = environment {
        textures.push((slots::ENVIRONMENT, environment));
        params.effect_extra[0] = 1.0;
    }

    if let Some(irradiance) = settings.irradiance {
        irradiance.apply(&mut params);
        textures.push(irradiance.slot());
    }

    params.ambient = settings.ambient.extend(0.0).to_array();
    (params, textures)
}

fn with_shadow(textures: &[(u32, TextureRef)], shadow: Option<TextureRef>) -> Vec<(u32, TextureRef)> {
    let mut textures = textures.to_vec();
    if let Some(shadow) = shadow {
        textures.push((slots::SHADOW_MAP, shadow));
    }
    textures
}

/// First light writes ambient and emissive with the normal depth test; every
/// further light adds on top where depth matches exactly.
fn draw_multi_pass(
    ctx: &mut FrameContext<'_>,
    mesh: &Mesh,
    call: &RenderCall,
    mut params: ShaderParams,
    textures: Vec<(u32, TextureRef)>,
    state: RasterState,
    lights: &[FrameLight],
) {
    let geometry = Geometry::Mesh(mesh.gpu());
    let affecting: Vec<&FrameLight> = lights.iter().filter(|light| light.affects(call)).collect();

    params.ambient[3] = 1.0;
    params.emissive[3] = 1.0;

    if affecting.is_empty() {
        params.light = LightParams::none();
        ctx.draw(programs::FORWARD_LIT, geometry, state, &params, &textures);
        return;
    }

    for (index, light) in affecting.iter().enumerate() {
        params.light = light.params;
        let state = if index == 0 {
            state
        } else {
            params.ambient[3] = 0.0;
            params.emissive[3] = 0.0;
            state
                .with_blend(Blend::Additive)
                .with_depth(DepthTest::Equal, false)
        };
        let textures = with_shadow(&textures, light.shadow);
        ctx.draw(programs::FORWARD_LIT, geometry, state, &params, &textures);
    }
}

/// All lights in one draw, capped at the array capacity; the nearest are kept.
fn draw_single_pass(
    ctx: &mut FrameContext<'_>,
    mesh: &Mesh,
    call: &RenderCall,
    mut params: ShaderParams,
    textures: Vec<(u32, TextureRef)>,
    state: RasterState,
    lights: &[FrameLight],
) {
    let selected = select_lights(call, lights);

    params.ambient[3] = 1.0;
    params.emissive[3] = 1.0;
    params.flags[2] = selected.len() as u32;
    for (slot, light) in params.lights.iter_mut().zip(&selected) {
        *slot = light.params;
    }
    let shadow = selected.iter().find_map(|light| light.shadow);
    let textures = with_shadow(&textures, shadow);

    ctx.draw(
        programs::FORWARD_SINGLE_PASS,
        Geometry::Mesh(mesh.gpu()),
        state,
        &params,
        &textures,
    );
}

/// Lights reaching `call`, directional first, then by distance, at most
/// [`MAX_SINGLE_PASS_LIGHTS`].
pub(crate) fn select_lights<'l>(call: &RenderCall, lights: &'l [FrameLight]) -> Vec<&'l FrameLight> {
    let center = call.bounds.center();
    let mut selected: Vec<(f32, &FrameLight)> = lights
        .iter()
        .filter(|light| light.affects(call))
        .map(|light| {
            let distance = match light.light.light_type {
                LightType::Directional => 0.0,
                LightType::Point | LightType::Spot => light.position().distance(center),
            };
            (distance, light)
        })
        .collect();
    selected.sort_by(|a, b| a.0.total_cmp(&b.0));
    selected.truncate(MAX_SINGLE_PASS_LIGHTS);
    selected.into_iter().map(|(_, light)| light).collect()
}
