mod common;

use common::{fixture, translation, CUBE_AT};
use glam::{Mat4, Vec3};
use wgpu_lighting::config::{LightingMode, PipelineMode, Quality, RendererConfig};
use wgpu_lighting::renderer::device::{
    slots, DeviceEvent, GraphicsDevice, LoadOp, PassTarget, Rect, TextureRef,
};
use wgpu_lighting::renderer::programs;
use wgpu_lighting::renderer::shadows::shadow_factor;
use wgpu_lighting::renderer::ShadowState;
use wgpu_lighting::scene::{Entity, Light};
use wgpu_lighting::Renderer;

const EPSILON: f32 = 1e-4;

/// Shadow-map UV and depth of a world position, as the lighting programs
/// compute it.
fn project_shadow(view_proj: Mat4, world: Vec3) -> Vec3 {
    let clip = view_proj * world.extend(1.0);
    let ndc = clip.truncate() / clip.w;
    Vec3::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5, ndc.z)
}

#[test]
fn directional_shadow_camera_covers_the_scene_centre() {
    let light = Light::directional(Vec3::ONE, 1.0).with_shadows(0.002);
    let entity = Entity::light("sun", light.clone())
        .at(Vec3::new(10.0, 20.0, 10.0))
        .looking_at(Vec3::ZERO);
    let camera = light.shadow_camera(&entity.model);
    let view_proj = camera.view_proj();

    for point in [
        Vec3::ZERO,
        Vec3::new(-3.5, 0.0, -2.0),
        Vec3::new(2.0, 1.0, 4.0),
        Vec3::new(4.5, -0.5, -3.0),
    ] {
        let uvz = project_shadow(view_proj, point);
        assert!((-EPSILON..=1.0 + EPSILON).contains(&uvz.x), "{point:?} -> {uvz:?}");
        assert!((-EPSILON..=1.0 + EPSILON).contains(&uvz.y), "{point:?} -> {uvz:?}");
        assert!((-EPSILON..=1.0 + EPSILON).contains(&uvz.z), "{point:?} -> {uvz:?}");
    }

    let centre = project_shadow(view_proj, Vec3::ZERO);
    assert!((centre.x - 0.5).abs() < EPSILON && (centre.y - 0.5).abs() < EPSILON);
}

#[test]
fn nearer_points_along_the_light_have_smaller_depth() {
    let light = Light::spot(Vec3::ONE, 1.0, 30.0, 50.0);
    let entity = Entity::light("spot", light.clone())
        .at(Vec3::new(0.0, 10.0, 0.0))
        .looking_at(Vec3::ZERO);
    let view_proj = light.shadow_camera(&entity.model).view_proj();
    let near = project_shadow(view_proj, Vec3::new(0.0, 5.0, 0.0));
    let far = project_shadow(view_proj, Vec3::ZERO);
    assert!(near.z < far.z);
}

#[test]
fn larger_bias_never_adds_shadow() {
    let stored = 0.5;
    for fragment in [0.49, 0.5, 0.501, 0.505, 0.52, 0.9] {
        let mut previous = 0.0;
        for bias in [0.0, 0.001, 0.005, 0.01, 0.05] {
            let lit = shadow_factor(fragment, stored, bias);
            assert!(lit >= previous, "bias {bias} darkened depth {fragment}");
            previous = lit;
        }
    }
    assert_eq!(shadow_factor(0.4, 0.5, 0.0), 1.0);
    assert_eq!(shadow_factor(0.6, 0.5, 0.01), 0.0);
}

fn forward_config(lighting: LightingMode) -> RendererConfig {
    let mut config = RendererConfig::default();
    config.pipeline = PipelineMode::Forward;
    config.lighting = lighting;
    config
}

#[test]
fn sun_captures_a_depth_only_map_of_solid_casters() {
    let f = fixture(320, 240);
    let config = forward_config(LightingMode::MultiPass);
    let mut renderer = Renderer::new(f.device, &config).unwrap();
    assert_eq!(renderer.shadow_state(f.sun), ShadowState::NotCasting);

    let stats = renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .unwrap();
    assert_eq!(stats.shadow_maps, 1);
    assert_eq!(stats.shadow_draw_calls, 1);
    assert_eq!(renderer.shadow_state(f.sun), ShadowState::Idle);
    let map = renderer.shadow_map(f.sun).expect("sun shadow map");

    let device = renderer.device();
    let pass = device
        .events()
        .iter()
        .find_map(|event| match event {
            DeviceEvent::BeginPass(pass) if pass.label == "shadow map" => Some(*pass),
            _ => None,
        })
        .expect("shadow pass");
    assert_eq!(pass.target, PassTarget::offscreen(map));
    assert_eq!(pass.color, LoadOp::Load);
    assert_eq!(pass.depth, LoadOp::Clear(1.0));

    // Only the opaque cube casts; the blended plane is skipped
    let casters: Vec<_> = device
        .draws()
        .filter(|d| d.program == programs::SHADOW_DEPTH)
        .collect();
    assert_eq!(casters.len(), 1);
    assert_eq!(casters[0].pass, "shadow map");
    assert!(!casters[0].state.color_write);
    assert!(translation(casters[0]).abs_diff_eq(CUBE_AT, 1e-5));

    let lit = device
        .draws()
        .find(|d| d.program == programs::FORWARD_LIT)
        .expect("lit draw");
    assert_eq!(lit.params.light.shadow[0], 1.0);
    assert!(lit
        .textures
        .contains(&(slots::SHADOW_MAP, TextureRef::Depth(map))));
}

#[test]
fn atlas_slices_are_scissored_and_reset() {
    let f = fixture(320, 240);
    let config = forward_config(LightingMode::SinglePass);
    let mut renderer = Renderer::new(f.device, &config).unwrap();
    renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .unwrap();
    assert_eq!(renderer.shadow_state(f.sun), ShadowState::Idle);
    assert_eq!(renderer.shadow_map(f.sun), None);

    let device = renderer.device();
    let events = device.events();
    let begin = events
        .iter()
        .position(|event| {
            matches!(event, DeviceEvent::BeginPass(pass) if pass.label == "shadow atlas")
        })
        .expect("atlas pass");
    let atlas = match events[begin] {
        DeviceEvent::BeginPass(pass) => match pass.target {
            PassTarget::Offscreen { target, .. } => target,
            PassTarget::Output => panic!("atlas rendered to the output"),
        },
        _ => unreachable!(),
    };
    let size = device.target_size(atlas).unwrap();
    let slice = size.height;
    assert_eq!(size.width, slice * config.shadow_atlas_max_lights);

    let first = Rect::new(0, 0, slice, slice);
    assert_eq!(events[begin + 1], DeviceEvent::Viewport(first));
    assert_eq!(events[begin + 2], DeviceEvent::Scissor(Some(first)));
    let end = begin
        + events[begin..]
            .iter()
            .position(|event| *event == DeviceEvent::EndPass)
            .unwrap();
    assert_eq!(events[end - 1], DeviceEvent::Scissor(None));

    let draw = device
        .draws()
        .find(|d| d.program == programs::FORWARD_SINGLE_PASS)
        .expect("single pass draw");
    let scale = 1.0 / config.shadow_atlas_max_lights as f32;
    assert_eq!(draw.params.lights[0].shadow, [1.0, 0.005, 0.0, scale]);
    assert!(draw
        .textures
        .contains(&(slots::SHADOW_MAP, TextureRef::Depth(atlas))));
}

#[test]
fn ultra_atlas_fits_within_the_device_limit() {
    let f = fixture(320, 240);
    let device = f.device.with_max_target_dimension(8192);
    let mut config = forward_config(LightingMode::SinglePass);
    config.quality = Quality::Ultra;
    config.shadow_atlas_max_lights = 4;
    let config = config.validate();

    let mut renderer = Renderer::new(device, &config).unwrap();
    renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .unwrap();

    let device = renderer.device();
    let atlas = device
        .events()
        .iter()
        .find_map(|event| match event {
            DeviceEvent::CreateTarget { target, desc } if desc.label == "shadow atlas" => {
                Some(*target)
            }
            _ => None,
        })
        .expect("atlas target");
    let size = device.target_size(atlas).unwrap();
    assert!(size.width <= 8192);
    assert_eq!(size.height, 2048);
}

#[test]
fn oversized_map_quality_is_clamped_to_the_device() {
    let f = fixture(320, 240);
    let device = f.device.with_max_target_dimension(1024);
    let mut config = forward_config(LightingMode::MultiPass);
    config.quality = Quality::Ultra;
    let mut renderer = Renderer::new(device, &config).unwrap();
    renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .unwrap();

    let map = renderer.shadow_map(f.sun).expect("sun shadow map");
    assert_eq!(renderer.device().target_size(map).unwrap().width, 1024);
}

#[test]
fn failed_capture_still_ends_the_frame() {
    let mut f = fixture(320, 240);
    let config = forward_config(LightingMode::MultiPass);
    let mut renderer = Renderer::new(f.device, &config).unwrap();
    renderer.device_mut().set_allocation_failure(true);

    assert!(renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .is_err());
    assert!(!renderer.is_frame_in_flight());
    assert!(matches!(
        renderer.device().events().last(),
        Some(DeviceEvent::EndFrame)
    ));

    // Bakes and later frames are not locked out
    renderer.device_mut().set_allocation_failure(false);
    assert_eq!(
        renderer
            .bake_reflections(&mut f.scene, &f.assets, &config)
            .unwrap(),
        0
    );
    renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .unwrap();
    assert_eq!(renderer.shadow_state(f.sun), ShadowState::Idle);
}

#[test]
fn removed_light_releases_its_map() {
    let mut f = fixture(320, 240);
    let config = forward_config(LightingMode::MultiPass);
    let mut renderer = Renderer::new(f.device, &config).unwrap();
    renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .unwrap();
    let map = renderer.shadow_map(f.sun).expect("sun shadow map");

    f.scene.entities.remove(f.sun);
    renderer
        .render_frame(&f.scene, &f.assets, &f.camera, &config)
        .unwrap();
    assert!(!renderer.device().is_live(map));
    assert_eq!(renderer.shadow_map(f.sun), None);
    assert_eq!(renderer.shadow_state(f.sun), ShadowState::NotCasting);
}
