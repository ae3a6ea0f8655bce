mod common;

use std::fs;
use std::path::PathBuf;

use common::fixture;
use glam::{UVec3, Vec3};
use wgpu_lighting::config::{Quality, RendererConfig};
use wgpu_lighting::renderer::device::{
    mip_level_count, DeviceEvent, Extent, GraphicsDevice, TargetKind,
};
use wgpu_lighting::scene::{nearest_probe, Entity, EntityKind, IrradianceGrid, ReflectionProbe};
use wgpu_lighting::{RenderError, Renderer};

fn cache_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "wgpu-lighting-{}-{}.bin",
        name,
        std::process::id()
    ))
}

fn grid_entity() -> Entity {
    Entity::new(
        "probes",
        EntityKind::IrradianceGrid(IrradianceGrid::new(
            Vec3::new(-2.0, 0.5, -2.0),
            Vec3::new(2.0, 0.5, 2.0),
            UVec3::new(2, 1, 2),
        )),
    )
}

fn low_quality() -> RendererConfig {
    let mut config = RendererConfig::default();
    config.quality = Quality::Low;
    config
}

#[test]
fn uniform_background_bakes_to_its_own_colour() {
    let mut f = fixture(64, 64);
    f.scene.add(grid_entity());
    let config = low_quality();
    let mut renderer = Renderer::new(f.device, &config).unwrap();

    let baked = renderer
        .bake_irradiance(&mut f.scene, &f.assets, &config)
        .unwrap();
    assert_eq!(baked, 4);
    assert!(renderer.resources().irradiance_lookup().is_some());

    // Headless read-back returns the capture clear colour
    let background = f.scene.background_color;
    for probe in f.scene.irradiance_grid().unwrap().probes() {
        for normal in [Vec3::X, Vec3::Y, Vec3::NEG_Z] {
            let irradiance = probe.sh.irradiance(normal);
            assert!(
                irradiance.abs_diff_eq(background, 1e-2),
                "{irradiance:?} != {background:?}"
            );
        }
    }

    // Capture target is released after the bake
    let capture_size = Extent::new(16, 16);
    let device = renderer.device();
    let leaked = device.events().iter().any(|event| match event {
        DeviceEvent::CreateTarget { target, desc } => {
            desc.size == capture_size && device.is_live(*target)
        }
        _ => false,
    });
    assert!(!leaked);
}

#[test]
fn bake_without_grid_is_an_error() {
    let mut f = fixture(64, 64);
    let config = low_quality();
    let mut renderer = Renderer::new(f.device, &config).unwrap();
    assert!(matches!(
        renderer.bake_irradiance(&mut f.scene, &f.assets, &config),
        Err(RenderError::NoIrradianceGrid)
    ));
}

#[test]
fn irradiance_cache_round_trips_through_disk() {
    let mut f = fixture(64, 64);
    f.scene.add(grid_entity());
    let mut config = low_quality();
    config.irradiance_cache_path = cache_path("round-trip");
    let mut renderer = Renderer::new(f.device, &config).unwrap();
    renderer
        .bake_irradiance(&mut f.scene, &f.assets, &config)
        .unwrap();
    // Give every probe its own lighting so an order mix-up shows
    for (i, probe) in f
        .scene
        .irradiance_grid_mut()
        .unwrap()
        .probes_mut()
        .iter_mut()
        .enumerate()
    {
        for (j, coeff) in probe.sh.coeffs.iter_mut().enumerate() {
            *coeff = Vec3::new(i as f32, j as f32 * 0.1, 1.0 / (i + j + 1) as f32);
        }
    }
    renderer.save_irradiance_cache(&f.scene, &config).unwrap();

    let mut fresh = fixture(64, 64);
    fresh.scene.add(Entity::new(
        "probes",
        EntityKind::IrradianceGrid(IrradianceGrid::new(
            Vec3::ZERO,
            Vec3::ONE,
            UVec3::new(3, 1, 1),
        )),
    ));
    renderer
        .load_irradiance_cache(&mut fresh.scene, &config)
        .unwrap();
    assert_eq!(fresh.scene.irradiance_grid(), f.scene.irradiance_grid());

    let _ = fs::remove_file(&config.irradiance_cache_path);
}

#[test]
fn truncated_cache_leaves_the_grid_alone() {
    let mut f = fixture(64, 64);
    f.scene.add(grid_entity());
    let mut config = low_quality();
    config.irradiance_cache_path = cache_path("truncated");
    fs::write(&config.irradiance_cache_path, [0u8; 20]).unwrap();

    let mut renderer = Renderer::new(f.device, &config).unwrap();
    let before = f.scene.irradiance_grid().unwrap().clone();
    let result = renderer.load_irradiance_cache(&mut f.scene, &config);
    assert!(matches!(result, Err(RenderError::MalformedCache { .. })));
    assert_eq!(f.scene.irradiance_grid(), Some(&before));

    let _ = fs::remove_file(&config.irradiance_cache_path);
}

#[test]
fn missing_cache_file_is_an_io_error() {
    let mut f = fixture(64, 64);
    f.scene.add(grid_entity());
    let mut config = low_quality();
    config.irradiance_cache_path = cache_path("missing");
    let mut renderer = Renderer::new(f.device, &config).unwrap();
    assert!(matches!(
        renderer.load_irradiance_cache(&mut f.scene, &config),
        Err(RenderError::Io { .. })
    ));
}

#[test]
fn reflection_bake_captures_mipmapped_cubes() {
    let mut f = fixture(64, 64);
    let probe = f.scene.add(
        Entity::new("mirror", EntityKind::ReflectionProbe(ReflectionProbe::new(1.0)))
            .at(Vec3::new(0.0, 1.0, 0.0)),
    );
    let config = low_quality();
    let mut renderer = Renderer::new(f.device, &config).unwrap();

    assert_eq!(
        renderer
            .bake_reflections(&mut f.scene, &f.assets, &config)
            .unwrap(),
        1
    );
    let cubemap = f.scene.reflection_probe(0).unwrap().cubemap().unwrap();
    let size = config.quality.reflection_capture_size();
    let desc = renderer.device().target_desc(cubemap).unwrap();
    assert_eq!(desc.kind, TargetKind::Cube);
    assert_eq!(desc.size, Extent::new(size, size));
    assert_eq!(desc.mip_levels, mip_level_count(Extent::new(size, size)));
    assert!(renderer
        .device()
        .events()
        .contains(&DeviceEvent::GenerateMipmaps(cubemap)));

    // Every prefab now points at the only probe
    for entity in &f.scene.entities {
        if let EntityKind::Prefab(instance) = &entity.kind {
            assert_eq!(instance.nearest_reflection_probe, Some(0));
        }
    }
    assert!(matches!(f.scene.entities[probe].kind, EntityKind::ReflectionProbe(_)));

    // A second bake replaces and frees the first cubemap
    renderer
        .bake_reflections(&mut f.scene, &f.assets, &config)
        .unwrap();
    let replaced = f.scene.reflection_probe(0).unwrap().cubemap().unwrap();
    assert_ne!(replaced, cubemap);
    assert!(!renderer.device().is_live(cubemap));
    assert!(renderer.device().is_live(replaced));
    assert!(renderer.device().target_size(replaced).is_some());
}

#[test]
fn nearest_probe_prefers_the_first_on_ties() {
    let probes = [
        Vec3::new(-1.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 5.0, 0.0),
    ];
    assert_eq!(nearest_probe(&probes, Vec3::ZERO), Some(0));
    assert_eq!(nearest_probe(&probes, Vec3::new(0.9, 0.0, 0.0)), Some(1));
    assert_eq!(nearest_probe(&probes, Vec3::new(0.0, 4.0, 0.0)), Some(2));
    assert_eq!(nearest_probe(&[], Vec3::ZERO), None);
}
