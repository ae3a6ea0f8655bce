use glam::Vec3;

use super::entity::{Decal, Entity, EntityKind};
use super::light::Light;
use super::probes::{nearest_probe, IrradianceGrid, ReflectionProbe};
use crate::renderer::device::TextureId;

/// Everything the renderer draws in a frame.
#[derive(Debug, Clone)]
pub struct Scene {
    pub background_color: Vec3,
    pub ambient_light: Vec3,
    /// Environment cube texture drawn behind the scene and used as the
    /// fallback reflection source.
    pub environment: Option<TextureId>,
    pub entities: Vec<Entity>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            background_color: Vec3::ZERO,
            ambient_light: Vec3::splat(0.1),
            environment: None,
            entities: Vec::new(),
        }
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entity: Entity) -> usize {
        self.entities.push(entity);
        self.entities.len() - 1
    }

    /// Visible lights as (entity index, entity, light).
    pub fn lights(&self) -> impl Iterator<Item = (usize, &Entity, &Light)> {
        self.entities
            .iter()
            .enumerate()
            .filter(|(_, e)| e.visible)
            .filter_map(|(i, e)| match &e.kind {
                EntityKind::Light(light) => Some((i, e, light)),
                _ => None,
            })
    }

    pub fn decals(&self) -> impl Iterator<Item = (&Entity, &Decal)> {
        self.entities
            .iter()
            .filter(|e| e.visible)
            .filter_map(|e| match &e.kind {
                EntityKind::Decal(decal) => Some((e, decal)),
                _ => None,
            })
    }

    /// The reflection probe table: probes in entity order. Indices stored in
    /// `PrefabInstance::nearest_reflection_probe` refer to this order.
    pub fn reflection_probes(&self) -> impl Iterator<Item = (&Entity, &ReflectionProbe)> {
        self.entities.iter().filter_map(|e| match &e.kind {
            EntityKind::ReflectionProbe(probe) => Some((e, probe)),
            _ => None,
        })
    }

    pub fn reflection_probes_mut(&mut self) -> impl Iterator<Item = (Vec3, &mut ReflectionProbe)> {
        self.entities.iter_mut().filter_map(|e| {
            let position = e.position();
            match &mut e.kind {
                EntityKind::ReflectionProbe(probe) => Some((position, probe)),
                _ => None,
            }
        })
    }

    pub fn reflection_probe(&self, index: usize) -> Option<&ReflectionProbe> {
        self.reflection_probes().nth(index).map(|(_, probe)| probe)
    }

    /// The first irradiance grid entity, if any.
    pub fn irradiance_grid(&self) -> Option<&IrradianceGrid> {
        self.entities.iter().find_map(|e| match &e.kind {
            EntityKind::IrradianceGrid(grid) => Some(grid),
            _ => None,
        })
    }

    pub fn irradiance_grid_mut(&mut self) -> Option<&mut IrradianceGrid> {
        self.entities.iter_mut().find_map(|e| match &mut e.kind {
            EntityKind::IrradianceGrid(grid) => Some(grid),
            _ => None,
        })
    }

    /// Assign every prefab entity the reflection probe nearest to its origin.
    /// Results stay cached until this is called again.
    pub fn update_nearest_reflection_probes(&mut self) {
        let probes: Vec<Vec3> = self
            .reflection_probes()
            .map(|(entity, _)| entity.position())
            .collect();

        let mut assigned = 0;
        for entity in &mut self.entities {
            let position = entity.position();
            if let EntityKind::Prefab(instance) = &mut entity.kind {
                instance.nearest_reflection_probe = nearest_probe(&probes, position);
                assigned += 1;
            }
        }
        log::info!(
            "Assigned nearest reflection probe for {} entities ({} probes)",
            assigned,
            probes.len()
        );
    }
}
