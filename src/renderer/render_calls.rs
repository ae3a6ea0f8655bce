//! Flattening the scene into draw items, culling, and ordering them.

use glam::{Mat4, Vec3};

use crate::asset::{Assets, Handle, Material, Mesh};
use crate::scene::{Aabb, Camera, EntityKind, Frustum, Scene};

/// One mesh instance to draw this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderCall {
    pub mesh: Handle<Mesh>,
    pub material: Handle<Material>,
    pub model: Mat4,
    /// World-space bounds, used for light influence tests.
    pub bounds: Aabb,
    /// Distance from the bounds centre to the camera eye; 0 without a camera.
    pub distance: f32,
    pub transparent: bool,
    pub reflection_probe: Option<usize>,
    /// Index of the entity this call came from.
    pub entity: usize,
}

/// Which calls a pass accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderCondition {
    #[default]
    All,
    /// Opaque and alpha-masked calls only.
    NoAlpha,
    /// Alpha-blended calls only.
    OnlyAlpha,
}

impl RenderCondition {
    pub fn accepts(self, transparent: bool) -> bool {
        match self {
            RenderCondition::All => true,
            RenderCondition::NoAlpha => !transparent,
            RenderCondition::OnlyAlpha => transparent,
        }
    }
}

/// Counts from one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub emitted: u32,
    pub culled: u32,
}

/// Walk every visible prefab entity and emit a call per mesh node.
///
/// With a camera, nodes whose world bounds lie entirely outside its frustum
/// are dropped and `distance` is filled in. Without one (probe captures),
/// everything visible is emitted.
pub fn build_render_calls(
    scene: &Scene,
    assets: &Assets,
    camera: Option<&Camera>,
) -> (Vec<RenderCall>, BuildStats) {
    let frustum = camera.map(Camera::frustum);
    let eye = camera.map(Camera::position);
    build_with_frustum(scene, assets, frustum.as_ref(), eye)
}

pub(crate) fn build_with_frustum(
    scene: &Scene,
    assets: &Assets,
    frustum: Option<&Frustum>,
    eye: Option<Vec3>,
) -> (Vec<RenderCall>, BuildStats) {
    let mut calls = Vec::new();
    let mut stats = BuildStats::default();

    for (entity_index, entity) in scene.entities.iter().enumerate() {
        if !entity.visible {
            continue;
        }
        let EntityKind::Prefab(instance) = &entity.kind else {
            continue;
        };
        let Some(prefab) = assets.prefabs.get(instance.prefab) else {
            log::warn!("Entity '{}' references a missing prefab", entity.name);
            continue;
        };

        prefab.visit_visible(entity.model, |node, global| {
            let (Some(mesh_handle), Some(material_handle)) = (node.mesh, node.material) else {
                return;
            };
            let (Some(mesh), Some(material)) = (
                assets.meshes.get(mesh_handle),
                assets.materials.get(material_handle),
            ) else {
                log::debug!("Node '{}' has an unresolved mesh or material", node.name);
                return;
            };

            let bounds = mesh.bounds().transformed(global);
            if let Some(frustum) = frustum {
                if !frustum.intersects_aabb(&bounds) {
                    stats.culled += 1;
                    return;
                }
            }

            calls.push(RenderCall {
                mesh: mesh_handle,
                material: material_handle,
                model: global,
                bounds,
                distance: eye.map_or(0.0, |eye| bounds.center().distance(eye)),
                transparent: material.is_transparent(),
                reflection_probe: instance.nearest_reflection_probe,
                entity: entity_index,
            });
            stats.emitted += 1;
        });
    }

    (calls, stats)
}

/// Farthest first, then opaque before transparent. Both sorts are stable, so
/// each group keeps its back-to-front order.
pub fn sort_render_calls(calls: &mut [RenderCall]) {
    calls.sort_by(|a, b| b.distance.total_cmp(&a.distance));
    calls.sort_by_key(|call| call.transparent);
}
