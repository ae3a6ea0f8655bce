// renderer/debug.rs
use glam::{Mat4, Vec3};

use crate::renderer::device::{
    slots, Geometry, PassDesc, PassTarget, RasterState, Rect, TargetId, TextureRef,
};
use crate::renderer::frame::{FrameContext, FrameLight, RenderView};
use crate::renderer::irradiance::IrradianceBinding;
use crate::renderer::programs;
use crate::renderer::resources::{FrameTargets, GBUFFER_ALBEDO, GBUFFER_MATERIAL, GBUFFER_NORMAL};
use crate::renderer::uniforms::ShaderParams;

/// Output quadrants, clockwise from top-left: albedo, normal, material, depth.
pub fn quadrants(width: u32, height: u32) -> [Rect; 4] {
    let half_w = (width / 2).max(1);
    let half_h = (height / 2).max(1);
    [
        Rect::new(0, 0, half_w, half_h),
        Rect::new(half_w, 0, width - half_w, half_h),
        Rect::new(half_w, half_h, width - half_w, height - half_h),
        Rect::new(0, half_h, half_w, height - half_h),
    ]
}

/// Top-right third of the output, where the shadow map overlay goes.
pub fn shadow_overlay_rect(width: u32, height: u32) -> Rect {
    let w = (width / 3).max(1);
    let h = (height / 3).max(1);
    Rect::new(width - w, 0, w, h)
}

pub(crate) fn render_gbuffer_quadrants(ctx: &mut FrameContext<'_>, targets: &FrameTargets) {
    let output = ctx.device.output_size();
    ctx.device.begin_pass(&PassDesc::clear(
        "gbuffer debug",
        PassTarget::Output,
        [0.0, 0.0, 0.0, 1.0],
    ));
    let planes = [
        TextureRef::Color {
            target: targets.gbuffer,
            attachment: GBUFFER_ALBEDO,
        },
        TextureRef::Color {
            target: targets.gbuffer,
            attachment: GBUFFER_NORMAL,
        },
        TextureRef::Color {
            target: targets.gbuffer,
            attachment: GBUFFER_MATERIAL,
        },
        TextureRef::Depth(targets.gbuffer),
    ];
    for (rect, plane) in quadrants(output.width, output.height).into_iter().zip(planes) {
        ctx.device.set_viewport(rect);
        let mut params = ShaderParams::default();
        let slot = match plane {
            TextureRef::Depth(_) => {
                params.effect[0] = 1.0;
                slots::SCENE_DEPTH
            }
            _ => slots::ALBEDO,
        };
        ctx.draw(
            programs::DEBUG_TEXTURE,
            Geometry::Fullscreen,
            RasterState::fullscreen(),
            &params,
            &[(slot, plane)],
        );
    }
    ctx.device.end_pass();
}

/// Draw the first captured shadow map over the finished frame.
pub(crate) fn render_shadow_overlay(ctx: &mut FrameContext<'_>, lights: &[FrameLight]) {
    let Some((light, shadow)) = lights
        .iter()
        .find_map(|light| light.shadow.map(|shadow| (light, shadow)))
    else {
        log::debug!("No shadow map captured, overlay skipped");
        return;
    };
    let output = ctx.device.output_size();
    let mut params = ShaderParams::default();
    params.effect[0] = 1.0;
    // Atlas slice of this light
    params.effect_extra = [light.params.shadow[2], light.params.shadow[3], 0.0, 0.0];

    ctx.device
        .begin_pass(&PassDesc::load("shadow map debug", PassTarget::Output));
    ctx.device
        .set_viewport(shadow_overlay_rect(output.width, output.height));
    ctx.draw(
        programs::DEBUG_TEXTURE,
        Geometry::Fullscreen,
        RasterState::fullscreen(),
        &params,
        &[(slots::SCENE_DEPTH, shadow)],
    );
    ctx.device.end_pass();
}

/// Irradiance probes as SH-shaded spheres and captured reflection probes as
/// mirror spheres, drawn into `target` over the lit scene.
pub(crate) fn render_probes(
    ctx: &mut FrameContext<'_>,
    view: &RenderView,
    target: TargetId,
    irradiance: Option<IrradianceBinding>,
) {
    let scene = ctx.scene;
    let sphere = ctx.resources.sphere();
    ctx.device
        .begin_pass(&PassDesc::load("probes", PassTarget::offscreen(target)));

    if let (Some(grid), Some(binding)) = (scene.irradiance_grid(), irradiance) {
        for probe in grid.probes() {
            let model = sphere_model(probe.position, probe.size);
            let mut params = view.params().with_model(model);
            binding.apply(&mut params);
            params.flags[1] = probe.index as u32;
            ctx.draw(
                programs::PROBE,
                Geometry::Mesh(sphere),
                RasterState::default(),
                &params,
                &[binding.slot()],
            );
        }
    }

    for (entity, probe) in scene.reflection_probes() {
        let Some(cubemap) = probe.cubemap() else {
            continue;
        };
        let params = view
            .params()
            .with_model(sphere_model(entity.position(), 0.5))
            .with_effect([1.0, 0.0, 0.0, 0.0]);
        ctx.draw(
            programs::PROBE,
            Geometry::Mesh(sphere),
            RasterState::default(),
            &params,
            &[(slots::ENVIRONMENT, TextureRef::color(cubemap))],
        );
    }
    ctx.device.end_pass();
}

fn sphere_model(position: Vec3, radius: f32) -> Mat4 {
    Mat4::from_translation(position) * Mat4::from_scale(Vec3::splat(radius.max(0.01)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadrants_tile_the_output() {
        let rects = quadrants(801, 601);
        let area: u32 = rects.iter().map(|r| r.width * r.height).sum();
        assert_eq!(area, 801 * 601);
        assert_eq!(rects[0], Rect::new(0, 0, 400, 300));
        assert_eq!(rects[2], Rect::new(400, 300, 401, 301));
    }

    #[test]
    fn overlay_sits_in_top_right_third() {
        let rect = shadow_overlay_rect(900, 600);
        assert_eq!(rect, Rect::new(600, 0, 300, 200));
    }
}
