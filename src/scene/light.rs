use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::camera::{stable_up, Camera};
use super::json;
use crate::renderer::uniforms::{
    LightParams, LIGHT_TYPE_DIRECTIONAL, LIGHT_TYPE_POINT, LIGHT_TYPE_SPOT,
};

/// Orthographic extent used when a directional light has no area size.
pub const DEFAULT_DIRECTIONAL_AREA: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightType {
    #[default]
    Point,
    Spot,
    Directional,
}

impl LightType {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "point" => Some(LightType::Point),
            "spot" => Some(LightType::Spot),
            "directional" => Some(LightType::Directional),
            _ => None,
        }
    }

    fn code(self) -> f32 {
        match self {
            LightType::Point => LIGHT_TYPE_POINT,
            LightType::Spot => LIGHT_TYPE_SPOT,
            LightType::Directional => LIGHT_TYPE_DIRECTIONAL,
        }
    }
}

/// Light source configuration. Position and orientation come from the owning
/// entity's model matrix; the light looks down its local -Z.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub light_type: LightType,
    pub color: Vec3,
    pub intensity: f32,
    pub max_distance: f32,
    /// Half-angle of the spot cone, degrees.
    pub cone_angle: f32,
    pub cone_exponent: f32,
    /// Side length of the directional shadow volume.
    pub area_size: f32,
    pub cast_shadows: bool,
    pub shadow_bias: f32,
    pub volumetric: bool,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            light_type: LightType::Point,
            color: Vec3::ONE,
            intensity: 1.0,
            max_distance: 100.0,
            cone_angle: 45.0,
            cone_exponent: 1.0,
            area_size: 0.0,
            cast_shadows: false,
            shadow_bias: 0.002,
            volumetric: false,
        }
    }
}

impl Light {
    pub fn directional(color: Vec3, intensity: f32) -> Self {
        Self {
            light_type: LightType::Directional,
            color,
            intensity,
            ..Self::default()
        }
    }

    pub fn spot(color: Vec3, intensity: f32, cone_angle: f32, max_distance: f32) -> Self {
        Self {
            light_type: LightType::Spot,
            color,
            intensity,
            cone_angle,
            max_distance,
            ..Self::default()
        }
    }

    pub fn point(color: Vec3, intensity: f32, max_distance: f32) -> Self {
        Self {
            light_type: LightType::Point,
            color,
            intensity,
            max_distance,
            ..Self::default()
        }
    }

    pub fn with_shadows(mut self, bias: f32) -> Self {
        self.cast_shadows = true;
        self.shadow_bias = bias;
        self
    }

    pub fn with_area_size(mut self, area: f32) -> Self {
        self.area_size = area;
        self
    }

    pub fn position(model: &Mat4) -> Vec3 {
        model.w_axis.truncate()
    }

    pub fn forward(model: &Mat4) -> Vec3 {
        let forward = model.transform_vector3(Vec3::NEG_Z);
        if forward.length_squared() > 0.0 {
            forward.normalize()
        } else {
            Vec3::NEG_Z
        }
    }

    fn directional_area(&self) -> f32 {
        if self.area_size > 0.0 {
            self.area_size
        } else {
            DEFAULT_DIRECTIONAL_AREA
        }
    }

    /// Sphere bounding everything this light can affect; `None` for
    /// directional lights, which affect everything.
    pub fn influence_sphere(&self, model: &Mat4) -> Option<(Vec3, f32)> {
        match self.light_type {
            LightType::Directional => None,
            LightType::Point | LightType::Spot => {
                Some((Self::position(model), self.max_distance.max(0.0)))
            }
        }
    }

    /// Camera used to capture this light's shadow map.
    pub fn shadow_camera(&self, model: &Mat4) -> Camera {
        let position = Self::position(model);
        let forward = Self::forward(model);
        let up = stable_up(forward);
        let far = self.max_distance.max(0.02);
        let near = 1.0f32.min(far * 0.5);

        match self.light_type {
            LightType::Spot => {
                let fov = (self.cone_angle * 2.0).clamp(1.0, 179.0).to_radians();
                Camera::perspective(position, position + forward, fov, near, far).with_up(up)
            }
            LightType::Point => {
                Camera::perspective(position, position + forward, 90f32.to_radians(), near, far)
                    .with_up(up)
            }
            LightType::Directional => {
                let half = self.directional_area() * 0.5;
                let far = far.max(self.directional_area());
                Camera::orthographic(position, position + forward, half, half, near, far)
                    .with_up(up)
            }
        }
    }

    /// Uniform representation without shadow information.
    pub fn params(&self, model: &Mat4) -> LightParams {
        let position = Self::position(model);
        let forward = Self::forward(model);
        let mut params = LightParams::none();
        params.position_type = position.extend(self.light_type.code()).to_array();
        params.direction_range = forward.extend(self.max_distance).to_array();
        params.color_intensity = self.color.extend(self.intensity).to_array();
        params.spot_area = [
            self.cone_angle.to_radians().cos(),
            self.cone_exponent,
            self.directional_area(),
            if self.volumetric { 1.0 } else { 0.0 },
        ];
        params.shadow = [0.0, self.shadow_bias, 0.0, 1.0];
        params
    }

    pub fn configure(&mut self, block: &Value) {
        if let Some(kind) = json::string(block, "light_type") {
            match LightType::parse(kind) {
                Some(light_type) => self.light_type = light_type,
                None => log::warn!("Unknown light type '{}', keeping {:?}", kind, self.light_type),
            }
        }
        if let Some(color) = json::vec3(block, "color") {
            self.color = color;
        }
        if let Some(intensity) = json::f32(block, "intensity") {
            self.intensity = intensity;
        }
        if let Some(max_distance) = json::f32(block, "max_dist") {
            self.max_distance = max_distance;
        }
        if let Some(cone_angle) = json::f32(block, "cone_angle") {
            self.cone_angle = cone_angle;
        }
        if let Some(cone_exponent) = json::f32(block, "cone_exp") {
            self.cone_exponent = cone_exponent;
        }
        if let Some(area_size) = json::f32(block, "area_size") {
            self.area_size = area_size;
        }
        if let Some(cast_shadows) = json::bool(block, "cast_shadows") {
            self.cast_shadows = cast_shadows;
        }
        if let Some(shadow_bias) = json::f32(block, "shadow_bias") {
            self.shadow_bias = shadow_bias;
        }
        if let Some(volumetric) = json::bool(block, "volumetric") {
            self.volumetric = volumetric;
        }
    }

    pub fn describe(&self) -> String {
        let mut text = format!(
            "{:?} light, color ({:.2}, {:.2}, {:.2}) x {:.2}",
            self.light_type, self.color.x, self.color.y, self.color.z, self.intensity
        );
        match self.light_type {
            LightType::Spot => text.push_str(&format!(
                ", range {:.1}, cone {:.1} deg ^{:.1}",
                self.max_distance, self.cone_angle, self.cone_exponent
            )),
            LightType::Point => text.push_str(&format!(", range {:.1}", self.max_distance)),
            LightType::Directional => {
                text.push_str(&format!(", area {:.1}", self.directional_area()))
            }
        }
        if self.cast_shadows {
            text.push_str(&format!(", shadows (bias {:.4})", self.shadow_bias));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn configure_reads_scene_file_keys() {
        let mut light = Light::default();
        light.configure(&json!({
            "light_type": "spot",
            "color": [1.0, 0.5, 0.25],
            "intensity": 3.0,
            "max_dist": 40.0,
            "cone_angle": 30.0,
            "cone_exp": 8.0,
            "cast_shadows": true,
            "shadow_bias": 0.01
        }));

        assert_eq!(light.light_type, LightType::Spot);
        assert_eq!(light.color, Vec3::new(1.0, 0.5, 0.25));
        assert_eq!(light.intensity, 3.0);
        assert_eq!(light.max_distance, 40.0);
        assert_eq!(light.cone_angle, 30.0);
        assert_eq!(light.cone_exponent, 8.0);
        assert!(light.cast_shadows);
        assert_eq!(light.shadow_bias, 0.01);
    }

    #[test]
    fn unknown_type_keeps_previous() {
        let mut light = Light::directional(Vec3::ONE, 1.0);
        light.configure(&json!({ "light_type": "laser" }));
        assert_eq!(light.light_type, LightType::Directional);
    }

    #[test]
    fn spot_shadow_camera_covers_cone() {
        let light = Light::spot(Vec3::ONE, 1.0, 30.0, 20.0);
        let model = Mat4::from_translation(Vec3::new(0.0, 10.0, 0.0))
            * Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2);
        let camera = light.shadow_camera(&model);

        // Straight below the light, inside range
        assert!(camera.frustum().contains_point(Vec3::new(0.0, 2.0, 0.0)));
        // 29 degrees off axis is inside a 30 degree half-angle cone
        let off_axis = Vec3::new(29f32.to_radians().tan() * 5.0, 5.0, 0.0);
        assert!(camera.frustum().contains_point(off_axis));
        // Beyond max range
        assert!(!camera.frustum().contains_point(Vec3::new(0.0, -15.0, 0.0)));
    }

    #[test]
    fn params_pack_spot_cosine() {
        let light = Light::spot(Vec3::ONE, 2.0, 60.0, 10.0);
        let params = light.params(&Mat4::IDENTITY);
        assert!((params.spot_area[0] - 0.5).abs() < 1e-5);
        assert_eq!(params.light_type(), LIGHT_TYPE_SPOT);
        assert_eq!(params.direction_range[3], 10.0);
        assert!(!params.casts_shadow());
    }

    #[test]
    fn directional_has_no_influence_bound() {
        let light = Light::directional(Vec3::ONE, 1.0);
        assert!(light.influence_sphere(&Mat4::IDENTITY).is_none());
        let point = Light::point(Vec3::ONE, 1.0, 7.0);
        assert_eq!(
            point.influence_sphere(&Mat4::from_translation(Vec3::X)),
            Some((Vec3::X, 7.0))
        );
    }
}
