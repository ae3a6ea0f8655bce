mod common;

use common::fixture;
use glam::{Mat4, Vec3};
use wgpu_lighting::asset::Handle;
use wgpu_lighting::renderer::{build_render_calls, sort_render_calls, RenderCall, RenderCondition};
use wgpu_lighting::scene::{Aabb, Camera, Entity};

fn call(distance: f32, transparent: bool) -> RenderCall {
    RenderCall {
        mesh: Handle::new(0),
        material: Handle::new(0),
        model: Mat4::IDENTITY,
        bounds: Aabb::new(Vec3::ZERO, Vec3::ONE),
        distance,
        transparent,
        reflection_probe: None,
        entity: 0,
    }
}

#[test]
fn opaque_first_then_back_to_front() {
    let mut calls = vec![
        call(3.0, true),
        call(1.0, false),
        call(9.0, true),
        call(5.0, false),
        call(2.0, true),
        call(7.0, false),
    ];
    sort_render_calls(&mut calls);

    let order: Vec<(bool, f32)> = calls.iter().map(|c| (c.transparent, c.distance)).collect();
    assert_eq!(
        order,
        vec![
            (false, 7.0),
            (false, 5.0),
            (false, 1.0),
            (true, 9.0),
            (true, 3.0),
            (true, 2.0),
        ]
    );
}

#[test]
fn sorting_is_stable_for_equal_distances() {
    let mut calls: Vec<_> = (0..4)
        .map(|i| RenderCall {
            entity: i,
            ..call(2.0, false)
        })
        .collect();
    sort_render_calls(&mut calls);
    let entities: Vec<_> = calls.iter().map(|c| c.entity).collect();
    assert_eq!(entities, vec![0, 1, 2, 3]);
}

#[test]
fn conditions_split_by_transparency() {
    assert!(RenderCondition::All.accepts(true));
    assert!(RenderCondition::All.accepts(false));
    assert!(RenderCondition::NoAlpha.accepts(false));
    assert!(!RenderCondition::NoAlpha.accepts(true));
    assert!(RenderCondition::OnlyAlpha.accepts(true));
    assert!(!RenderCondition::OnlyAlpha.accepts(false));
}

#[test]
fn frustum_culls_objects_behind_the_camera() {
    let mut f = fixture(64, 64);
    let Some(cube) = f.assets.prefabs.iter().map(|(handle, _)| handle).next() else {
        panic!("fixture has prefabs");
    };
    f.scene
        .add(Entity::prefab("behind", cube).at(Vec3::new(0.0, 3.0, 40.0)));

    let (calls, stats) = build_render_calls(&f.scene, &f.assets, Some(&f.camera));
    assert_eq!(stats.emitted, 2);
    assert_eq!(stats.culled, 1);
    assert!(calls.iter().all(|c| c.distance > 0.0));

    // Probe captures see everything
    let (all, stats) = build_render_calls(&f.scene, &f.assets, None);
    assert_eq!(all.len(), 3);
    assert_eq!(stats.culled, 0);
}

#[test]
fn hidden_entities_emit_nothing() {
    let mut f = fixture(64, 64);
    for entity in &mut f.scene.entities {
        entity.visible = false;
    }
    let camera = Camera::default();
    let (calls, stats) = build_render_calls(&f.scene, &f.assets, Some(&camera));
    assert!(calls.is_empty());
    assert_eq!(stats.emitted + stats.culled, 0);
}
