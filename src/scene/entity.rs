use glam::{Mat4, Quat, Vec3};
use serde_json::Value;

use super::json;
use super::light::Light;
use super::probes::{IrradianceGrid, ReflectionProbe};
use crate::asset::{Handle, Prefab};
use crate::renderer::device::TextureId;

/// A placed prefab plus the cached nearest reflection probe.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefabInstance {
    pub prefab: Handle<Prefab>,
    /// Index into the scene's reflection probe table, refreshed by
    /// `Scene::update_nearest_reflection_probes`.
    pub nearest_reflection_probe: Option<usize>,
}

impl PrefabInstance {
    pub fn new(prefab: Handle<Prefab>) -> Self {
        Self {
            prefab,
            nearest_reflection_probe: None,
        }
    }
}

/// Projected texture volume; the entity's model matrix maps the unit cube onto
/// the affected region.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Decal {
    pub albedo: Option<TextureId>,
    /// Texture name from configuration, resolved into `albedo` by the host.
    pub albedo_name: Option<String>,
}

impl Decal {
    pub fn new(albedo: TextureId) -> Self {
        Self {
            albedo: Some(albedo),
            albedo_name: None,
        }
    }

    pub fn configure(&mut self, block: &Value) {
        if let Some(name) = json::string(block, "albedo") {
            self.albedo_name = Some(name.to_owned());
        }
    }

    pub fn describe(&self) -> String {
        match (&self.albedo_name, self.albedo) {
            (Some(name), Some(_)) => format!("Decal '{name}'"),
            (Some(name), None) => format!("Decal '{name}' (unresolved)"),
            (None, Some(texture)) => format!("Decal {texture:?}"),
            (None, None) => "Decal without texture".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Prefab(PrefabInstance),
    Light(Light),
    Decal(Decal),
    IrradianceGrid(IrradianceGrid),
    ReflectionProbe(ReflectionProbe),
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Prefab(_) => "prefab",
            EntityKind::Light(_) => "light",
            EntityKind::Decal(_) => "decal",
            EntityKind::IrradianceGrid(_) => "irradiance",
            EntityKind::ReflectionProbe(_) => "reflection_probe",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: String,
    pub model: Mat4,
    pub visible: bool,
    pub kind: EntityKind,
}

impl Entity {
    pub fn new(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            model: Mat4::IDENTITY,
            visible: true,
            kind,
        }
    }

    pub fn prefab(name: impl Into<String>, prefab: Handle<Prefab>) -> Self {
        Self::new(name, EntityKind::Prefab(PrefabInstance::new(prefab)))
    }

    pub fn light(name: impl Into<String>, light: Light) -> Self {
        Self::new(name, EntityKind::Light(light))
    }

    pub fn with_model(mut self, model: Mat4) -> Self {
        self.model = model;
        self
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.model.w_axis = position.extend(1.0);
        self
    }

    /// Orient so local -Z points from the entity towards `target`.
    pub fn looking_at(mut self, target: Vec3) -> Self {
        self.look_at(target);
        self
    }

    pub fn position(&self) -> Vec3 {
        self.model.w_axis.truncate()
    }

    fn look_at(&mut self, target: Vec3) {
        let eye = self.position();
        let forward = target - eye;
        if forward.length_squared() <= f32::EPSILON {
            return;
        }
        let up = super::camera::stable_up(forward);
        let (scale, _, _) = self.model.to_scale_rotation_translation();
        let view = Mat4::look_at_rh(eye, target, up);
        self.model = view.inverse() * Mat4::from_scale(scale);
    }

    /// Apply a JSON configuration block: shared transform keys first, then the
    /// variant's own keys.
    pub fn configure(&mut self, block: &Value) {
        let (mut scale, mut rotation, mut translation) = self.model.to_scale_rotation_translation();
        if let Some(position) = json::vec3(block, "position") {
            translation = position;
        }
        if let Some(angle) = json::f32(block, "angle") {
            rotation = Quat::from_rotation_y(angle.to_radians());
        }
        if let Some(s) = json::vec3(block, "scale") {
            scale = s;
        }
        self.model = Mat4::from_scale_rotation_translation(scale, rotation, translation);
        if let Some(target) = json::vec3(block, "target") {
            self.look_at(target);
        }
        if let Some(visible) = json::bool(block, "visible") {
            self.visible = visible;
        }

        match &mut self.kind {
            EntityKind::Prefab(_) => {}
            EntityKind::Light(light) => light.configure(block),
            EntityKind::Decal(decal) => decal.configure(block),
            EntityKind::IrradianceGrid(grid) => grid.configure(block),
            EntityKind::ReflectionProbe(probe) => probe.configure(block),
        }
    }

    pub fn describe(&self) -> String {
        let detail = match &self.kind {
            EntityKind::Prefab(instance) => match instance.nearest_reflection_probe {
                Some(probe) => format!("Prefab {:?}, reflection probe {}", instance.prefab, probe),
                None => format!("Prefab {:?}", instance.prefab),
            },
            EntityKind::Light(light) => light.describe(),
            EntityKind::Decal(decal) => decal.describe(),
            EntityKind::IrradianceGrid(grid) => grid.describe(),
            EntityKind::ReflectionProbe(probe) => probe.describe(),
        };
        let p = self.position();
        format!(
            "{} [{}] at ({:.2}, {:.2}, {:.2}){}: {}",
            self.name,
            self.kind.name(),
            p.x,
            p.y,
            p.z,
            if self.visible { "" } else { " (hidden)" },
            detail
        )
    }
}
