#![allow(dead_code)]

use glam::{Mat4, Vec3, Vec4};
use wgpu_lighting::asset::{AlphaMode, Assets, Material, Mesh, Prefab};
use wgpu_lighting::renderer::device::{Extent, GraphicsDevice, RecordedDraw};
use wgpu_lighting::renderer::{cube_mesh, HeadlessDevice};
use wgpu_lighting::scene::{Camera, Entity, Light, Scene};

pub const CUBE_AT: Vec3 = Vec3::new(0.0, 0.5, 0.0);
pub const PLANE_AT: Vec3 = Vec3::new(0.0, 0.0, 0.0);

/// A lit scene with an opaque cube resting on a translucent plane, under a
/// shadow-casting sun.
pub struct Fixture {
    pub device: HeadlessDevice,
    pub assets: Assets,
    pub scene: Scene,
    pub camera: Camera,
    /// Entity index of the sun.
    pub sun: usize,
}

pub fn fixture(width: u32, height: u32) -> Fixture {
    let mut device = HeadlessDevice::new(Extent::new(width, height));
    let mut assets = Assets::new();

    let (vertices, indices) = cube_mesh();
    let mesh = Mesh::upload(&mut device as &mut dyn GraphicsDevice, &vertices, &indices)
        .expect("cube upload");
    let mesh = assets.meshes.insert(mesh);

    let solid = assets
        .materials
        .insert(Material::new("solid", Vec4::new(0.8, 0.2, 0.2, 1.0)));
    let glass = assets.materials.insert(
        Material::new("glass", Vec4::new(0.2, 0.4, 0.9, 0.5)).with_alpha_mode(AlphaMode::Blend),
    );
    let cube = assets.prefabs.insert(Prefab::single("cube", mesh, solid));
    let plane = assets.prefabs.insert(Prefab::single("plane", mesh, glass));

    let mut scene = Scene::new();
    scene.background_color = Vec3::new(0.1, 0.2, 0.3);
    scene.ambient_light = Vec3::splat(0.25);
    scene.add(Entity::prefab("cube", cube).with_model(Mat4::from_translation(CUBE_AT)));
    scene.add(Entity::prefab("plane", plane).with_model(
        Mat4::from_translation(PLANE_AT) * Mat4::from_scale(Vec3::new(8.0, 0.02, 8.0)),
    ));
    let sun = scene.add(
        Entity::light("sun", Light::directional(Vec3::ONE, 2.0).with_shadows(0.005))
            .at(Vec3::new(4.0, 10.0, 4.0))
            .looking_at(Vec3::ZERO),
    );

    let camera = Camera::perspective(
        Vec3::new(0.0, 3.0, 8.0),
        Vec3::ZERO,
        60f32.to_radians(),
        0.1,
        100.0,
    );
    Fixture {
        device,
        assets,
        scene,
        camera,
        sun,
    }
}

pub fn translation(draw: &RecordedDraw) -> Vec3 {
    Mat4::from_cols_array_2d(&draw.params.model)
        .w_axis
        .truncate()
}
