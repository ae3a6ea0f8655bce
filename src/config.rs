use std::path::PathBuf;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::renderer::MAX_SINGLE_PASS_LIGHTS;

/// Immutable per-frame renderer configuration.
///
/// The host owns one of these and passes it by reference into every
/// `Renderer::render_frame` call; nothing inside the renderer mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    #[serde(default)]
    pub pipeline: PipelineMode,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub debug_view: DebugView,
    #[serde(default)]
    pub post_effects: PostEffects,
    #[serde(default)]
    pub lighting: LightingMode,
    #[serde(default)]
    pub ssao: SsaoSettings,
    #[serde(default)]
    pub tonemap: ToneMapping,
    #[serde(default = "RendererConfig::default_blur_radius")]
    pub blur_radius: u32,
    #[serde(default = "RendererConfig::default_pixel_size")]
    pub pixel_size: u32,
    #[serde(default)]
    pub depth_of_field: DepthOfField,
    #[serde(default = "RendererConfig::default_motion_blur_strength")]
    pub motion_blur_strength: f32,
    #[serde(default = "RendererConfig::default_shadow_atlas_max_lights")]
    pub shadow_atlas_max_lights: u32,
    #[serde(default)]
    pub dither_transparency: bool,
    #[serde(default)]
    pub show_probes: bool,
    #[serde(default = "RendererConfig::default_true")]
    pub irradiance: bool,
    #[serde(default = "RendererConfig::default_true")]
    pub reflections: bool,
    #[serde(default = "RendererConfig::default_irradiance_cache_path")]
    pub irradiance_cache_path: PathBuf,
    #[serde(default = "RendererConfig::default_probe_near")]
    pub probe_near: f32,
    #[serde(default = "RendererConfig::default_probe_far")]
    pub probe_far: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineMode::default(),
            quality: Quality::default(),
            debug_view: DebugView::default(),
            post_effects: PostEffects::default(),
            lighting: LightingMode::default(),
            ssao: SsaoSettings::default(),
            tonemap: ToneMapping::default(),
            blur_radius: Self::default_blur_radius(),
            pixel_size: Self::default_pixel_size(),
            depth_of_field: DepthOfField::default(),
            motion_blur_strength: Self::default_motion_blur_strength(),
            shadow_atlas_max_lights: Self::default_shadow_atlas_max_lights(),
            dither_transparency: false,
            show_probes: false,
            irradiance: true,
            reflections: true,
            irradiance_cache_path: Self::default_irradiance_cache_path(),
            probe_near: Self::default_probe_near(),
            probe_far: Self::default_probe_far(),
        }
    }
}

impl RendererConfig {
    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RendererConfig>(&contents) {
                Ok(config) => {
                    info!("Loaded renderer config from {:?}", path);
                    config.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default renderer config.",
                        path, err
                    );
                    RendererConfig::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Renderer config file {:?} not found. Using default config.",
                    path
                );
                RendererConfig::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default renderer config.",
                    path, err
                );
                RendererConfig::default()
            }
        }
    }

    pub fn validate(mut self) -> Self {
        if self.blur_radius == 0 {
            warn!("Blur radius must be greater than zero. Using default value.");
            self.blur_radius = Self::default_blur_radius();
        }

        if self.pixel_size == 0 {
            warn!("Pixel size must be greater than zero. Using default value.");
            self.pixel_size = Self::default_pixel_size();
        }

        if self.shadow_atlas_max_lights == 0 {
            warn!("Shadow atlas needs room for at least one light. Using default value.");
            self.shadow_atlas_max_lights = Self::default_shadow_atlas_max_lights();
        }

        if self.shadow_atlas_max_lights > MAX_SINGLE_PASS_LIGHTS as u32 {
            warn!(
                "Shadow atlas light cap {} exceeds single-pass capacity. Clamping to {}.",
                self.shadow_atlas_max_lights, MAX_SINGLE_PASS_LIGHTS
            );
            self.shadow_atlas_max_lights = MAX_SINGLE_PASS_LIGHTS as u32;
        }

        if !(self.probe_near > 0.0 && self.probe_far > self.probe_near) {
            warn!("Probe capture clip range is invalid. Using default range.");
            self.probe_near = Self::default_probe_near();
            self.probe_far = Self::default_probe_far();
        }

        if !(self.tonemap.gamma > 0.0) {
            warn!("Gamma must be positive. Using default value.");
            self.tonemap.gamma = ToneMapping::default().gamma;
        }

        if self.ssao.kernel_size == 0 || self.ssao.kernel_size > SsaoSettings::MAX_KERNEL_SIZE {
            warn!(
                "SSAO kernel size {} out of range. Using default value.",
                self.ssao.kernel_size
            );
            self.ssao.kernel_size = SsaoSettings::default().kernel_size;
        }

        self
    }

    /// Pixelation block size snapped to the next odd value.
    pub fn pixelate_block_size(&self) -> u32 {
        self.pixel_size.max(1) | 1
    }

    const fn default_blur_radius() -> u32 {
        4
    }

    const fn default_pixel_size() -> u32 {
        5
    }

    const fn default_motion_blur_strength() -> f32 {
        1.0
    }

    const fn default_shadow_atlas_max_lights() -> u32 {
        4
    }

    const fn default_true() -> bool {
        true
    }

    fn default_irradiance_cache_path() -> PathBuf {
        PathBuf::from("data/irradiance.bin")
    }

    const fn default_probe_near() -> f32 {
        0.1
    }

    const fn default_probe_far() -> f32 {
        1000.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    #[default]
    Forward,
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
    Ultra,
}

impl Quality {
    pub fn shadow_map_size(self) -> u32 {
        match self {
            Quality::Low => 512,
            Quality::Medium => 1024,
            Quality::High => 2048,
            Quality::Ultra => 4096,
        }
    }

    /// Edge length of one face of the irradiance capture target.
    pub fn irradiance_capture_size(self) -> u32 {
        match self {
            Quality::Low => 16,
            Quality::Medium => 32,
            Quality::High | Quality::Ultra => 64,
        }
    }

    pub fn reflection_capture_size(self) -> u32 {
        match self {
            Quality::Low => 128,
            Quality::Medium => 256,
            Quality::High | Quality::Ultra => 512,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugView {
    #[default]
    None,
    Normals,
    Uvs,
    Metallic,
    Roughness,
    Occlusion,
    ShadowMap,
    GBuffers,
}

impl DebugView {
    /// Channel selector handed to the property debug programs.
    pub(crate) fn property_index(self) -> Option<u32> {
        match self {
            DebugView::Normals => Some(0),
            DebugView::Uvs => Some(1),
            DebugView::Metallic => Some(2),
            DebugView::Roughness => Some(3),
            DebugView::Occlusion => Some(4),
            DebugView::None | DebugView::ShadowMap | DebugView::GBuffers => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightingMode {
    #[default]
    MultiPass,
    SinglePass,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostEffects {
    pub motion_blur: bool,
    pub pixelate: bool,
    pub blur: bool,
    pub depth_of_field: bool,
}

impl PostEffects {
    pub fn any(self) -> bool {
        self.motion_blur || self.pixelate || self.blur || self.depth_of_field
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsaoSettings {
    pub enabled: bool,
    pub radius: f32,
    pub bias: f32,
    pub kernel_size: u32,
}

impl SsaoSettings {
    pub const MAX_KERNEL_SIZE: u32 = 64;
}

impl Default for SsaoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            radius: 0.5,
            bias: 0.025,
            kernel_size: Self::MAX_KERNEL_SIZE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneMapping {
    pub enabled: bool,
    pub gamma: f32,
    pub scale: f32,
    pub white: f32,
    pub average_luminance: f32,
}

impl Default for ToneMapping {
    fn default() -> Self {
        Self {
            enabled: true,
            gamma: 2.2,
            scale: 1.0,
            white: 1.0,
            average_luminance: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthOfField {
    pub focal_distance: f32,
    pub focal_range: f32,
}

impl Default for DepthOfField {
    fn default() -> Self {
        Self {
            focal_distance: 10.0,
            focal_range: 5.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_config() -> RendererConfig {
        RendererConfig {
            blur_radius: 0,
            pixel_size: 0,
            shadow_atlas_max_lights: 0,
            probe_near: 5.0,
            probe_far: 1.0,
            ssao: SsaoSettings {
                kernel_size: 500,
                ..SsaoSettings::default()
            },
            ..RendererConfig::default()
        }
    }

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let validated = invalid_config().validate();
        let defaults = RendererConfig::default();

        assert_eq!(validated.blur_radius, defaults.blur_radius);
        assert_eq!(validated.pixel_size, defaults.pixel_size);
        assert_eq!(
            validated.shadow_atlas_max_lights,
            defaults.shadow_atlas_max_lights
        );
        assert_eq!(validated.probe_near, defaults.probe_near);
        assert_eq!(validated.probe_far, defaults.probe_far);
        assert_eq!(validated.ssao.kernel_size, defaults.ssao.kernel_size);
    }

    #[test]
    fn validate_preserves_valid_values() {
        let valid = RendererConfig {
            pipeline: PipelineMode::Deferred,
            quality: Quality::Ultra,
            blur_radius: 9,
            pixel_size: 8,
            shadow_atlas_max_lights: 6,
            ..RendererConfig::default()
        };

        let validated = valid.clone().validate();

        assert_eq!(validated, valid);
    }

    #[test]
    fn atlas_cap_is_clamped_to_single_pass_capacity() {
        let config = RendererConfig {
            shadow_atlas_max_lights: 64,
            ..RendererConfig::default()
        }
        .validate();

        assert_eq!(config.shadow_atlas_max_lights, MAX_SINGLE_PASS_LIGHTS as u32);
    }

    #[test]
    fn pixelate_block_size_is_always_odd() {
        for size in 1..12 {
            let config = RendererConfig {
                pixel_size: size,
                ..RendererConfig::default()
            };
            let block = config.pixelate_block_size();
            assert_eq!(block % 2, 1, "size {size} produced {block}");
            assert!(block >= size);
        }
    }

    #[test]
    fn quality_maps_to_shadow_resolution() {
        assert_eq!(Quality::Low.shadow_map_size(), 512);
        assert_eq!(Quality::Medium.shadow_map_size(), 1024);
        assert_eq!(Quality::High.shadow_map_size(), 2048);
        assert_eq!(Quality::Ultra.shadow_map_size(), 4096);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: RendererConfig = serde_json::from_str(
            r#"{ "pipeline": "deferred", "debug_view": "g_buffers", "post_effects": { "blur": true } }"#,
        )
        .unwrap();

        assert_eq!(config.pipeline, PipelineMode::Deferred);
        assert_eq!(config.debug_view, DebugView::GBuffers);
        assert!(config.post_effects.blur);
        assert!(!config.post_effects.pixelate);
        assert_eq!(config.quality, Quality::Medium);
        assert_eq!(
            config.irradiance_cache_path,
            PathBuf::from("data/irradiance.bin")
        );
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = RendererConfig::load_from_path("definitely/not/here/renderer.json");
        assert_eq!(config, RendererConfig::default());
    }
}
