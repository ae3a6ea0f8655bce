mod common;

use common::{fixture, translation, CUBE_AT, PLANE_AT};
use wgpu_lighting::config::{DebugView, LightingMode, PipelineMode, RendererConfig};
use wgpu_lighting::renderer::device::{
    slots, Blend, DeviceEvent, Extent, GraphicsDevice, LoadOp, PassTarget, TextureRef,
};
use wgpu_lighting::renderer::programs;
use wgpu_lighting::renderer::HeadlessDevice;
use wgpu_lighting::Renderer;

fn forward_config() -> RendererConfig {
    let mut config = RendererConfig::default();
    config.pipeline = PipelineMode::Forward;
    config.lighting = LightingMode::MultiPass;
    config
}

fn deferred_config() -> RendererConfig {
    let mut config = RendererConfig::default();
    config.pipeline = PipelineMode::Deferred;
    config.ssao.enabled = false;
    config
}

#[test]
fn forward_multi_pass_draws_opaque_before_blended() {
    let f = fixture(800, 600);
    let config = forward_config();
    let mut renderer = Renderer::new(f.device, &config).unwrap();

    let stats = renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .unwrap();
    assert_eq!(stats.render_calls, 2);
    assert_eq!(stats.culled_calls, 0);

    let lit: Vec<_> = renderer
        .device()
        .draws()
        .filter(|d| d.pass == "forward" && d.program == programs::FORWARD_LIT)
        .collect();
    assert_eq!(lit.len(), 2);
    assert!(translation(lit[0]).abs_diff_eq(CUBE_AT, 1e-5));
    assert_eq!(lit[0].state.blend, Blend::Opaque);
    assert!(translation(lit[1]).abs_diff_eq(PLANE_AT, 1e-5));
    assert_eq!(lit[1].state.blend, Blend::Alpha);
    // First light pass carries ambient and emissive
    assert_eq!(lit[0].params.ambient[3], 1.0);
    assert_eq!(lit[0].params.emissive[3], 1.0);
}

#[test]
fn single_pass_lighting_packs_lights_into_one_draw() {
    let f = fixture(320, 240);
    let mut config = forward_config();
    config.lighting = LightingMode::SinglePass;
    let mut renderer = Renderer::new(f.device, &config).unwrap();
    renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .unwrap();

    let draws: Vec<_> = renderer
        .device()
        .draws()
        .filter(|d| d.program == programs::FORWARD_SINGLE_PASS)
        .collect();
    assert_eq!(draws.len(), 2);
    assert!(draws.iter().all(|d| d.params.flags[2] == 1));
}

#[test]
fn deferred_without_ssao_binds_white_occlusion() {
    let f = fixture(800, 600);
    let config = deferred_config();
    let mut renderer = Renderer::new(f.device, &config).unwrap();
    renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .unwrap();

    assert!(renderer.resources().targets().ambient_occlusion.is_none());
    let white = renderer.resources().white();
    let device = renderer.device();
    assert!(!device.draws().any(|d| d.program == programs::SSAO));

    let ambient = device
        .draws()
        .find(|d| d.program == programs::DEFERRED_AMBIENT)
        .expect("ambient draw");
    assert_eq!(ambient.params.flags[3], 0);
    assert_eq!(ambient.params.ambient, [0.25, 0.25, 0.25, 1.0]);
    assert_eq!(ambient.state.blend, Blend::Additive);
    assert!(ambient
        .textures
        .contains(&(slots::AUX0, TextureRef::Texture(white))));

    assert_eq!(
        device
            .draws()
            .filter(|d| d.program == programs::DEFERRED_DIRECTIONAL)
            .count(),
        1
    );
    // The blended plane is shaded by the forward overlay
    let overlay: Vec<_> = device
        .draws()
        .filter(|d| d.program == programs::FORWARD_LIT)
        .collect();
    assert_eq!(overlay.len(), 1);
    assert!(translation(overlay[0]).abs_diff_eq(PLANE_AT, 1e-5));
}

#[test]
fn deferred_with_ssao_marks_occlusion_bound() {
    let f = fixture(640, 480);
    let mut config = deferred_config();
    config.ssao.enabled = true;
    let mut renderer = Renderer::new(f.device, &config).unwrap();
    renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .unwrap();

    let ao = renderer
        .resources()
        .targets()
        .ambient_occlusion
        .expect("occlusion target");
    let ambient = renderer
        .device()
        .draws()
        .find(|d| d.program == programs::DEFERRED_AMBIENT)
        .expect("ambient draw");
    assert_eq!(ambient.params.flags[3], 1);
    assert!(ambient
        .textures
        .contains(&(slots::AUX0, TextureRef::color(ao))));
}

#[test]
fn resize_reallocates_and_clears_targets() {
    let f = fixture(800, 600);
    let config = deferred_config();
    let mut renderer = Renderer::new(f.device, &config).unwrap();
    renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .unwrap();
    let old = renderer.resources().targets().clone();

    renderer.handle_resize(1920, 1080).unwrap();
    renderer.device_mut().clear_events();
    renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .unwrap();

    let targets = renderer.resources().targets().clone();
    let device = renderer.device();
    let size = Extent::new(1920, 1080);
    assert_eq!(device.output_size(), size);
    assert_eq!(device.target_size(targets.gbuffer), Some(size));
    assert_eq!(device.target_size(targets.illumination), Some(size));
    assert!(!device.is_live(old.gbuffer));
    assert!(!device.is_live(old.illumination));

    let cleared = |target| {
        device.events().iter().any(|event| {
            matches!(
                event,
                DeviceEvent::BeginPass(pass)
                    if pass.target == PassTarget::offscreen(target)
                        && matches!(pass.color, LoadOp::Clear(_))
            )
        })
    };
    assert!(cleared(targets.gbuffer));
    assert!(cleared(targets.illumination));
}

#[test]
fn failed_resize_keeps_output_and_targets() {
    let f = fixture(320, 240);
    let config = deferred_config();
    let mut renderer = Renderer::new(f.device, &config).unwrap();
    let before = renderer.resources().targets().clone();

    renderer.device_mut().set_allocation_failure(true);
    assert!(renderer.handle_resize(1280, 720).is_err());

    let original = Extent::new(320, 240);
    let device = renderer.device();
    assert_eq!(device.output_size(), original);
    assert_eq!(renderer.resources().targets(), &before);
    assert!(device.is_live(before.gbuffer));
    assert_eq!(device.target_size(before.illumination), Some(original));
}

#[test]
fn missing_program_skips_draws_but_finishes_frame() {
    let mut f = fixture(200, 100);
    f.device.remove_program(programs::FORWARD_LIT);
    let config = forward_config();
    let mut renderer = Renderer::new(f.device, &config).unwrap();

    let stats = renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .unwrap();
    assert_eq!(stats.skipped_draws, 2);
    assert!(!renderer.is_frame_in_flight());
    assert!(matches!(
        renderer.device().events().last(),
        Some(DeviceEvent::EndFrame)
    ));
}

#[test]
fn post_chain_ends_on_the_output() {
    let f = fixture(400, 300);
    let mut config = forward_config();
    config.post_effects.blur = true;
    let mut renderer = Renderer::new(f.device, &config).unwrap();
    renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .unwrap();

    let last = renderer.device().draws().last().expect("post draw");
    assert_eq!(last.program, programs::BLUR);
    assert_eq!(last.target, PassTarget::Output);
}

#[test]
fn motion_blur_waits_for_a_previous_frame() {
    let f = fixture(400, 300);
    let mut config = forward_config();
    config.post_effects.motion_blur = true;
    let mut renderer = Renderer::new(f.device, &config).unwrap();

    let motion_blur_draws = |renderer: &Renderer<HeadlessDevice>| {
        renderer
            .device()
            .draws()
            .filter(|d| d.program == programs::MOTION_BLUR)
            .count()
    };
    renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .unwrap();
    assert_eq!(motion_blur_draws(&renderer), 0);

    renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .unwrap();
    assert_eq!(motion_blur_draws(&renderer), 1);
}

#[test]
fn gbuffer_view_fills_four_quadrants() {
    let f = fixture(800, 600);
    let mut config = forward_config();
    config.debug_view = DebugView::GBuffers;
    let mut renderer = Renderer::new(f.device, &config).unwrap();
    renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .unwrap();

    let device = renderer.device();
    assert!(device.draws().any(|d| d.program == programs::GBUFFER));
    let quadrants = device
        .draws()
        .filter(|d| d.program == programs::DEBUG_TEXTURE && d.target == PassTarget::Output)
        .count();
    assert_eq!(quadrants, 4);
    assert!(!device.draws().any(|d| d.program == programs::TONEMAP));
}
