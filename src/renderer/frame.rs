// renderer/frame.rs
use glam::{Mat4, Vec3};

use crate::asset::{Assets, Material, Mesh};
use crate::config::RendererConfig;
use crate::renderer::cubemap::CubeFace;
use crate::renderer::device::{
    slots, Cull, Draw, Extent, Geometry, GraphicsDevice, RasterState, TextureId, TextureRef,
};
use crate::renderer::render_calls::RenderCall;
use crate::renderer::renderer::RendererStats;
use crate::renderer::resources::ResourceManager;
use crate::renderer::uniforms::{LightParams, ShaderParams};
use crate::scene::{Camera, Light, Scene};

/// The camera-side state of one pass: matrices plus the target size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderView {
    pub view_proj: Mat4,
    pub previous_view_proj: Mat4,
    pub eye: Vec3,
    pub near: f32,
    pub far: f32,
    pub size: Extent,
    /// Set for cube-face captures, whose projection flips x.
    pub mirrored: bool,
}

impl RenderView {
    pub fn from_camera(camera: &Camera, size: Extent) -> Self {
        let view_proj = camera.view_proj();
        Self {
            view_proj,
            previous_view_proj: view_proj,
            eye: camera.position(),
            near: camera.near,
            far: camera.far,
            size,
            mirrored: false,
        }
    }

    pub fn cube_face(face: CubeFace, eye: Vec3, near: f32, far: f32, size: Extent) -> Self {
        let view_proj = face.view_proj(eye, near, far);
        Self {
            view_proj,
            previous_view_proj: view_proj,
            eye,
            near,
            far,
            size,
            mirrored: true,
        }
    }

    /// Face culling as it must be requested for this view.
    pub fn cull(&self, cull: Cull) -> Cull {
        if self.mirrored {
            cull.mirrored()
        } else {
            cull
        }
    }

    /// Parameter block with the view fields filled in.
    pub fn params(&self) -> ShaderParams {
        ShaderParams {
            view_proj: self.view_proj.to_cols_array_2d(),
            inverse_view_proj: self.view_proj.inverse().to_cols_array_2d(),
            previous_view_proj: self.previous_view_proj.to_cols_array_2d(),
            camera_position: self.eye.extend(1.0).to_array(),
            viewport: [
                self.size.width as f32,
                self.size.height as f32,
                self.near,
                self.far,
            ],
            ..ShaderParams::default()
        }
    }
}

/// A visible light prepared for this frame.
#[derive(Debug, Clone)]
pub struct FrameLight {
    pub entity: usize,
    pub light: Light,
    pub model: Mat4,
    /// Uniform form, including shadow binding once the shadow pass ran.
    pub params: LightParams,
    pub shadow: Option<TextureRef>,
}

impl FrameLight {
    pub fn new(entity: usize, light: &Light, model: Mat4) -> Self {
        Self {
            entity,
            light: light.clone(),
            model,
            params: light.params(&model),
            shadow: None,
        }
    }

    pub fn position(&self) -> Vec3 {
        Light::position(&self.model)
    }

    /// Whether this light can reach anything inside `bounds`.
    pub fn affects(&self, call: &RenderCall) -> bool {
        match self.light.influence_sphere(&self.model) {
            None => true,
            Some((center, radius)) => {
                let closest = center.clamp(call.bounds.min, call.bounds.max);
                closest.distance_squared(center) <= radius * radius
            }
        }
    }
}

/// Visible lights of `scene`, in entity order.
pub fn collect_lights(scene: &Scene) -> Vec<FrameLight> {
    scene
        .lights()
        .map(|(index, entity, light)| FrameLight::new(index, light, entity.model))
        .collect()
}

/// Borrowed state every stage of a frame draws through.
pub(crate) struct FrameContext<'a> {
    pub device: &'a mut dyn GraphicsDevice,
    pub assets: &'a Assets,
    pub scene: &'a Scene,
    pub config: &'a RendererConfig,
    pub resources: &'a ResourceManager,
    pub stats: &'a mut RendererStats,
}

impl<'a> FrameContext<'a> {
    /// Issue one draw. Unknown programs skip the draw; returns whether it was
    /// submitted.
    pub fn draw(
        &mut self,
        program: &str,
        geometry: Geometry,
        state: RasterState,
        params: &ShaderParams,
        textures: &[(u32, TextureRef)],
    ) -> bool {
        let Some(program_id) = self.device.program(program) else {
            log::debug!("Program '{}' unavailable, draw skipped", program);
            self.stats.skipped_draws += 1;
            return false;
        };
        self.device.draw(&Draw {
            program: program_id,
            geometry,
            state,
            params,
            textures,
        });
        self.stats.draw_calls += 1;
        true
    }

    /// Mesh and material of a call, or `None` when either is unusable.
    pub fn resolve(&mut self, call: &RenderCall) -> Option<(&'a Mesh, &'a Material)> {
        let assets: &'a Assets = self.assets;
        let mesh = assets.meshes.get(call.mesh);
        let material = assets.materials.get(call.material);
        match (mesh, material) {
            (Some(mesh), Some(material)) if !mesh.is_empty() => Some((mesh, material)),
            _ => {
                self.stats.skipped_draws += 1;
                None
            }
        }
    }

    pub fn white(&self) -> TextureId {
        self.resources.white()
    }
}

/// Copy a material's scalar inputs into `params`.
pub(crate) fn apply_material(params: &mut ShaderParams, material: &Material) {
    params.color = material.color.to_array();
    params.emissive[0] = material.emissive_factor.x;
    params.emissive[1] = material.emissive_factor.y;
    params.emissive[2] = material.emissive_factor.z;
    params.material = [
        material.metallic,
        material.roughness,
        material.effective_alpha_cutoff(),
        if material.two_sided { 1.0 } else { 0.0 },
    ];
    params.flags[0] = material.flags().bits();
}

/// Material texture slots; missing textures fall back to `white`.
pub(crate) fn material_textures(material: &Material, white: TextureId) -> [(u32, TextureRef); 5] {
    let bind = |texture: Option<TextureId>| TextureRef::Texture(texture.unwrap_or(white));
    [
        (slots::ALBEDO, bind(material.color_texture)),
        (slots::NORMAL, bind(material.normal_texture)),
        (
            slots::METALLIC_ROUGHNESS,
            bind(material.metallic_roughness_texture),
        ),
        (slots::EMISSIVE, bind(material.emissive_texture)),
        (slots::OCCLUSION, bind(material.occlusion_texture)),
    ]
}

pub(crate) fn material_cull(material: &Material) -> Cull {
    if material.two_sided {
        Cull::None
    } else {
        Cull::Back
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Handle;
    use crate::scene::Aabb;
    use glam::Vec4;

    fn call_at(center: Vec3) -> RenderCall {
        RenderCall {
            mesh: Handle::new(0),
            material: Handle::new(0),
            model: Mat4::from_translation(center),
            bounds: Aabb::from_center_half_extents(center, Vec3::splat(0.5)),
            distance: 0.0,
            transparent: false,
            reflection_probe: None,
            entity: 0,
        }
    }

    #[test]
    fn point_light_reaches_only_nearby_calls() {
        let light = Light::point(Vec3::ONE, 1.0, 2.0);
        let frame_light = FrameLight::new(0, &light, Mat4::IDENTITY);
        assert!(frame_light.affects(&call_at(Vec3::new(2.0, 0.0, 0.0))));
        assert!(!frame_light.affects(&call_at(Vec3::new(3.0, 0.0, 0.0))));

        let sun = FrameLight::new(0, &Light::directional(Vec3::ONE, 1.0), Mat4::IDENTITY);
        assert!(sun.affects(&call_at(Vec3::splat(1000.0))));
    }

    #[test]
    fn missing_material_textures_use_white() {
        let white = Handle::new(3);
        let albedo = Handle::new(9);
        let material = Material::new("m", Vec4::ONE).with_color_texture(albedo);
        let textures = material_textures(&material, white);
        assert_eq!(textures[0], (slots::ALBEDO, TextureRef::Texture(albedo)));
        assert!(textures[1..]
            .iter()
            .all(|(_, texture)| *texture == TextureRef::Texture(white)));
    }

    #[test]
    fn cube_views_swap_culling() {
        let view = RenderView::cube_face(CubeFace::PositiveX, Vec3::ZERO, 0.1, 10.0, Extent::new(8, 8));
        assert_eq!(view.cull(Cull::Back), Cull::Front);
        let camera = Camera::default();
        let view = RenderView::from_camera(&camera, Extent::new(8, 8));
        assert_eq!(view.cull(Cull::Back), Cull::Back);
        assert_eq!(view.params().viewport, [8.0, 8.0, 0.1, 100.0]);
    }
}
