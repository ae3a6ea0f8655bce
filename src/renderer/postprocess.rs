//! The full-screen chain from the HDR illumination buffer to the output.

use glam::Mat4;

use crate::config::RendererConfig;
use crate::renderer::device::{slots, Geometry, PassDesc, PassTarget, RasterState, TargetId, TextureRef};
use crate::renderer::frame::{FrameContext, RenderView};
use crate::renderer::programs;
use crate::renderer::resources::FrameTargets;
use crate::renderer::uniforms::ShaderParams;

/// One full-screen step of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostStage {
    /// Tone mapping, or plain gamma when tone mapping is off.
    Resolve,
    MotionBlur,
    Blur,
    Pixelate,
    DepthOfField,
}

/// Stages in execution order for `config`. Motion blur needs the previous
/// frame's matrix and is dropped without one.
pub fn plan_stages(config: &RendererConfig, has_previous_frame: bool) -> Vec<PostStage> {
    let effects = config.post_effects;
    let mut stages = vec![PostStage::Resolve];
    if effects.motion_blur && has_previous_frame {
        stages.push(PostStage::MotionBlur);
    }
    if effects.blur {
        stages.push(PostStage::Blur);
    }
    if effects.pixelate {
        stages.push(PostStage::Pixelate);
    }
    if effects.depth_of_field {
        stages.push(PostStage::DepthOfField);
    }
    stages
}

/// Run the chain on the illumination buffer; the last stage writes to the
/// presented output.
pub(crate) fn run(
    ctx: &mut FrameContext<'_>,
    view: &RenderView,
    targets: &FrameTargets,
    previous_view_proj: Option<Mat4>,
) {
    let stages = plan_stages(ctx.config, previous_view_proj.is_some());
    let mut view = *view;
    if let Some(previous) = previous_view_proj {
        view.previous_view_proj = previous;
    }

    let mut source = targets.illumination;
    for (index, stage) in stages.iter().enumerate() {
        let last = index + 1 == stages.len();
        let (output, output_target) = if last {
            (PassTarget::Output, None)
        } else {
            let target = targets.post[index % 2];
            (PassTarget::offscreen(target), Some(target))
        };
        run_stage(ctx, *stage, &view, targets, source, output);
        if let Some(target) = output_target {
            source = target;
        }
    }
}

fn run_stage(
    ctx: &mut FrameContext<'_>,
    stage: PostStage,
    view: &RenderView,
    targets: &FrameTargets,
    source: TargetId,
    output: PassTarget,
) {
    let config = ctx.config;
    let mut params = view.params();
    let depth = (slots::SCENE_DEPTH, TextureRef::Depth(targets.illumination));
    let input = (slots::ALBEDO, TextureRef::color(source));

    if stage == PostStage::DepthOfField {
        // Blurred copy first, then the depth-weighted blend
        params.effect = blur_effect(config.blur_radius.max(2), view);
        full_screen_pass(
            ctx,
            "dof blur",
            PassTarget::offscreen(targets.post_scratch),
            programs::BLUR,
            &params,
            &[input],
        );
        params.effect = [
            config.depth_of_field.focal_distance,
            config.depth_of_field.focal_range,
            view.near,
            view.far,
        ];
        let blurred = (slots::AUX0, TextureRef::color(targets.post_scratch));
        full_screen_pass(
            ctx,
            "depth of field",
            output,
            programs::DEPTH_OF_FIELD,
            &params,
            &[input, blurred, depth],
        );
        return;
    }

    let (label, program) = match stage {
        PostStage::Resolve if config.tonemap.enabled => {
            let tonemap = config.tonemap;
            params.effect = [
                tonemap.gamma,
                tonemap.scale,
                tonemap.white,
                tonemap.average_luminance,
            ];
            ("tonemap", programs::TONEMAP)
        }
        PostStage::Resolve => {
            params.effect = [config.tonemap.gamma, 0.0, 0.0, 0.0];
            ("gamma", programs::GAMMA)
        }
        PostStage::MotionBlur => {
            params.effect = [config.motion_blur_strength, 0.0, 0.0, 0.0];
            ("motion blur", programs::MOTION_BLUR)
        }
        PostStage::Blur => {
            params.effect = blur_effect(config.blur_radius, view);
            ("blur", programs::BLUR)
        }
        PostStage::Pixelate => {
            params.effect = [config.pixelate_block_size() as f32, 0.0, 0.0, 0.0];
            ("pixelate", programs::PIXELATE)
        }
        PostStage::DepthOfField => return,
    };
    full_screen_pass(ctx, label, output, program, &params, &[input, depth]);
}

fn blur_effect(radius: u32, view: &RenderView) -> [f32; 4] {
    [
        radius as f32,
        1.0 / view.size.width.max(1) as f32,
        1.0 / view.size.height.max(1) as f32,
        0.0,
    ]
}

fn full_screen_pass(
    ctx: &mut FrameContext<'_>,
    label: &'static str,
    output: PassTarget,
    program: &str,
    params: &ShaderParams,
    textures: &[(u32, TextureRef)],
) {
    ctx.device
        .begin_pass(&PassDesc::clear(label, output, [0.0, 0.0, 0.0, 1.0]));
    ctx.draw(
        program,
        Geometry::Fullscreen,
        RasterState::fullscreen(),
        params,
        textures,
    );
    ctx.device.end_pass();
    ctx.stats.post_passes += 1;
}
