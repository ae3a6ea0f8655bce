// renderer/uniforms.rs
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Capacity of the light array uploaded for single-pass shading.
pub const MAX_SINGLE_PASS_LIGHTS: usize = 8;

pub const LIGHT_TYPE_NONE: f32 = 0.0;
pub const LIGHT_TYPE_POINT: f32 = 1.0;
pub const LIGHT_TYPE_SPOT: f32 = 2.0;
pub const LIGHT_TYPE_DIRECTIONAL: f32 = 3.0;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct LightParams {
    /// xyz world position, w light type code.
    pub position_type: [f32; 4],
    /// xyz forward direction, w max range.
    pub direction_range: [f32; 4],
    /// rgb colour, w intensity.
    pub color_intensity: [f32; 4],
    /// cos(cone angle), cone exponent, area size, volumetric.
    pub spot_area: [f32; 4],
    /// casts shadow, bias, atlas u offset, atlas u scale.
    pub shadow: [f32; 4],
    pub shadow_view_proj: [[f32; 4]; 4],
}

impl LightParams {
    pub fn none() -> Self {
        Self::zeroed()
    }

    pub fn light_type(&self) -> f32 {
        self.position_type[3]
    }

    pub fn casts_shadow(&self) -> bool {
        self.shadow[0] > 0.5
    }
}

/// The single uniform block every program receives.
///
/// Field meaning is shared across programs; each program reads what it needs.
/// All members are 16-byte aligned so the block maps onto a WGSL struct of
/// `mat4x4<f32>` / `vec4<f32>` / `vec4<u32>` fields in declaration order.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct ShaderParams {
    pub view_proj: [[f32; 4]; 4],
    pub inverse_view_proj: [[f32; 4]; 4],
    pub previous_view_proj: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    /// xyz eye, w unused.
    pub camera_position: [f32; 4],
    /// target width, height, near, far.
    pub viewport: [f32; 4],
    pub color: [f32; 4],
    /// rgb emissive factor, w 1 when this pass adds emissive.
    pub emissive: [f32; 4],
    /// metallic, roughness, alpha cutoff (negative disables), two-sided.
    pub material: [f32; 4],
    /// material flags, debug property, light count, ambient occlusion bound.
    pub flags: [u32; 4],
    /// rgb ambient, w 1 when this pass adds ambient.
    pub ambient: [f32; 4],
    /// xyz grid start, w 1 when the irradiance lookup is bound.
    pub irradiance_start: [f32; 4],
    /// xyz grid delta, w probe count.
    pub irradiance_delta: [f32; 4],
    /// xyz grid dimensions.
    pub irradiance_dims: [f32; 4],
    /// Per-program effect parameters (tone map, blur, ssao, dof, ...).
    pub effect: [f32; 4],
    pub effect_extra: [f32; 4],
    pub light: LightParams,
    pub lights: [LightParams; MAX_SINGLE_PASS_LIGHTS],
}

impl Default for ShaderParams {
    fn default() -> Self {
        let mut params = Self::zeroed();
        params.view_proj = Mat4::IDENTITY.to_cols_array_2d();
        params.inverse_view_proj = Mat4::IDENTITY.to_cols_array_2d();
        params.previous_view_proj = Mat4::IDENTITY.to_cols_array_2d();
        params.model = Mat4::IDENTITY.to_cols_array_2d();
        params.color = [1.0; 4];
        params.material[2] = -1.0;
        params
    }
}

impl ShaderParams {
    pub fn with_model(mut self, model: Mat4) -> Self {
        self.model = model.to_cols_array_2d();
        self
    }

    pub fn with_color(mut self, color: Vec4) -> Self {
        self.color = color.to_array();
        self
    }

    pub fn with_ambient(mut self, ambient: Vec3, enabled: bool) -> Self {
        self.ambient = ambient.extend(if enabled { 1.0 } else { 0.0 }).to_array();
        self
    }

    pub fn with_effect(mut self, effect: [f32; 4]) -> Self {
        self.effect = effect;
        self
    }

    pub fn with_effect_extra(mut self, extra: [f32; 4]) -> Self {
        self.effect_extra = extra;
        self
    }

    pub fn with_light(mut self, light: LightParams) -> Self {
        self.light = light;
        self
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }

    pub fn ambient_enabled(&self) -> bool {
        self.ambient[3] > 0.5
    }

    pub fn emissive_enabled(&self) -> bool {
        self.emissive[3] > 0.5
    }

    pub fn ambient_occlusion_bound(&self) -> bool {
        self.flags[3] != 0
    }
}
