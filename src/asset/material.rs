use bitflags::bitflags;
use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::renderer::device::TextureId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask,
    Blend,
}

bitflags! {
    /// Which optional inputs a material provides, as seen by the programs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFlags: u32 {
        const COLOR_TEXTURE = 1 << 0;
        const NORMAL_TEXTURE = 1 << 1;
        const METALLIC_ROUGHNESS_TEXTURE = 1 << 2;
        const EMISSIVE_TEXTURE = 1 << 3;
        const OCCLUSION_TEXTURE = 1 << 4;
        const ALPHA_MASK = 1 << 5;
        const ALPHA_BLEND = 1 << 6;
        const TWO_SIDED = 1 << 7;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub color: Vec4,
    pub emissive_factor: Vec3,
    pub metallic: f32,
    pub roughness: f32,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub two_sided: bool,
    pub color_texture: Option<TextureId>,
    pub normal_texture: Option<TextureId>,
    pub metallic_roughness_texture: Option<TextureId>,
    pub emissive_texture: Option<TextureId>,
    pub occlusion_texture: Option<TextureId>,
}

impl Default for Material {
    fn default() -> Self {
        Self::new("default", Vec4::ONE)
    }
}

impl Material {
    pub fn new(name: impl Into<String>, color: Vec4) -> Self {
        Self {
            name: name.into(),
            color,
            emissive_factor: Vec3::ZERO,
            metallic: 0.0,
            roughness: 1.0,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            two_sided: false,
            color_texture: None,
            normal_texture: None,
            metallic_roughness_texture: None,
            emissive_texture: None,
            occlusion_texture: None,
        }
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic.clamp(0.0, 1.0);
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness.clamp(0.0, 1.0);
        self
    }

    pub fn with_emissive(mut self, emissive: Vec3) -> Self {
        self.emissive_factor = emissive;
        self
    }

    pub fn with_alpha_mode(mut self, mode: AlphaMode) -> Self {
        self.alpha_mode = mode;
        self
    }

    pub fn with_alpha_cutoff(mut self, cutoff: f32) -> Self {
        self.alpha_cutoff = cutoff;
        self
    }

    pub fn with_two_sided(mut self, two_sided: bool) -> Self {
        self.two_sided = two_sided;
        self
    }

    pub fn with_color_texture(mut self, texture: TextureId) -> Self {
        self.color_texture = Some(texture);
        self
    }

    pub fn with_normal_texture(mut self, texture: TextureId) -> Self {
        self.normal_texture = Some(texture);
        self
    }

    pub fn with_metallic_roughness_texture(mut self, texture: TextureId) -> Self {
        self.metallic_roughness_texture = Some(texture);
        self
    }

    pub fn with_emissive_texture(mut self, texture: TextureId) -> Self {
        self.emissive_texture = Some(texture);
        self
    }

    pub fn with_occlusion_texture(mut self, texture: TextureId) -> Self {
        self.occlusion_texture = Some(texture);
        self
    }

    pub fn is_transparent(&self) -> bool {
        self.alpha_mode == AlphaMode::Blend
    }

    /// Alpha cutoff as uploaded: only masked materials discard.
    pub fn effective_alpha_cutoff(&self) -> f32 {
        match self.alpha_mode {
            AlphaMode::Mask => self.alpha_cutoff,
            AlphaMode::Opaque | AlphaMode::Blend => -1.0,
        }
    }

    pub fn flags(&self) -> MaterialFlags {
        let mut flags = MaterialFlags::empty();
        flags.set(MaterialFlags::COLOR_TEXTURE, self.color_texture.is_some());
        flags.set(MaterialFlags::NORMAL_TEXTURE, self.normal_texture.is_some());
        flags.set(
            MaterialFlags::METALLIC_ROUGHNESS_TEXTURE,
            self.metallic_roughness_texture.is_some(),
        );
        flags.set(MaterialFlags::EMISSIVE_TEXTURE, self.emissive_texture.is_some());
        flags.set(
            MaterialFlags::OCCLUSION_TEXTURE,
            self.occlusion_texture.is_some(),
        );
        flags.set(MaterialFlags::ALPHA_MASK, self.alpha_mode == AlphaMode::Mask);
        flags.set(MaterialFlags::ALPHA_BLEND, self.alpha_mode == AlphaMode::Blend);
        flags.set(MaterialFlags::TWO_SIDED, self.two_sided);
        flags
    }
}
