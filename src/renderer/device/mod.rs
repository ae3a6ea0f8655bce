//! Backend-neutral graphics device interface.
//!
//! Every GPU command the renderer issues goes through [`GraphicsDevice`]. Shader
//! programs are looked up by name and fed one [`ShaderParams`] block plus a set of
//! texture slots; the slot layout is fixed (see [`slots`]) so that programs and
//! the renderer agree on bindings without reflection.

mod headless;

pub use headless::{DeviceEvent, HeadlessDevice, RecordedDraw};

use crate::asset::Handle;
use crate::error::RenderResult;
use crate::renderer::uniforms::ShaderParams;
use crate::renderer::vertex::Vertex;

/// Marker for render targets owned by a device.
pub enum GpuTarget {}
/// Marker for sampled textures owned by a device.
pub enum GpuTexture {}
/// Marker for uploaded vertex/index buffers.
pub enum GpuMesh {}
/// Marker for resolved shader programs.
pub enum GpuProgram {}

pub type TargetId = Handle<GpuTarget>;
pub type TextureId = Handle<GpuTexture>;
pub type MeshId = Handle<GpuMesh>;
pub type ProgramId = Handle<GpuProgram>;

/// Fixed texture binding slots shared by every program.
pub mod slots {
    pub const ALBEDO: u32 = 0;
    pub const NORMAL: u32 = 1;
    pub const METALLIC_ROUGHNESS: u32 = 2;
    pub const EMISSIVE: u32 = 3;
    pub const OCCLUSION: u32 = 4;
    /// Second source image for post stages and the SSAO result in lighting passes.
    pub const AUX0: u32 = 5;
    pub const AUX1: u32 = 6;
    pub const AUX2: u32 = 7;
    pub const SCENE_DEPTH: u32 = 8;
    pub const SHADOW_MAP: u32 = 9;
    pub const ENVIRONMENT: u32 = 10;
    /// Unfiltered float data: SSAO kernel, irradiance lookup.
    pub const DATA: u32 = 11;

    pub const COUNT: usize = 12;

    /// Slots declared as filterable 2D float textures.
    pub const FILTERABLE_2D: [u32; 8] = [
        ALBEDO,
        NORMAL,
        METALLIC_ROUGHNESS,
        EMISSIVE,
        OCCLUSION,
        AUX0,
        AUX1,
        AUX2,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    pub fn half(&self) -> Self {
        Self::new((self.width / 2).max(1), (self.height / 2).max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn full(extent: Extent) -> Self {
        Self::new(0, 0, extent.width, extent.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba16Float,
    Rgba32Float,
    R8Unorm,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
            TextureFormat::R8Unorm => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Flat,
    Cube,
}

/// Description of an offscreen render target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDesc {
    pub label: &'static str,
    pub size: Extent,
    pub color: Vec<TextureFormat>,
    pub depth: bool,
    pub kind: TargetKind,
    pub mip_levels: u32,
}

impl TargetDesc {
    pub fn color(label: &'static str, size: Extent, format: TextureFormat) -> Self {
        Self {
            label,
            size,
            color: vec![format],
            depth: false,
            kind: TargetKind::Flat,
            mip_levels: 1,
        }
    }

    pub fn depth_only(label: &'static str, size: Extent) -> Self {
        Self {
            label,
            size,
            color: Vec::new(),
            depth: true,
            kind: TargetKind::Flat,
            mip_levels: 1,
        }
    }

    pub fn with_depth(mut self) -> Self {
        self.depth = true;
        self
    }

    pub fn with_attachment(mut self, format: TextureFormat) -> Self {
        self.color.push(format);
        self
    }

    pub fn cube(mut self, mip_levels: u32) -> Self {
        self.kind = TargetKind::Cube;
        self.mip_levels = mip_levels.max(1);
        self
    }

    pub fn layer_count(&self) -> u32 {
        match self.kind {
            TargetKind::Flat => 1,
            TargetKind::Cube => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: &'static str,
    pub size: Extent,
    pub format: TextureFormat,
    pub cube: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp<T> {
    Clear(T),
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTarget {
    /// The presented surface (or offscreen output when headless).
    Output,
    Offscreen { target: TargetId, face: u32 },
}

impl PassTarget {
    pub fn offscreen(target: TargetId) -> Self {
        PassTarget::Offscreen { target, face: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassDesc {
    pub label: &'static str,
    pub target: PassTarget,
    pub color: LoadOp<[f32; 4]>,
    pub depth: LoadOp<f32>,
}

impl PassDesc {
    pub fn clear(label: &'static str, target: PassTarget, color: [f32; 4]) -> Self {
        Self {
            label,
            target,
            color: LoadOp::Clear(color),
            depth: LoadOp::Clear(1.0),
        }
    }

    pub fn load(label: &'static str, target: PassTarget) -> Self {
        Self {
            label,
            target,
            color: LoadOp::Load,
            depth: LoadOp::Load,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Blend {
    #[default]
    Opaque,
    /// `src * a + dst * (1 - a)`
    Alpha,
    /// `src * a + dst`
    Additive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthTest {
    #[default]
    Less,
    LessEqual,
    Equal,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cull {
    None,
    #[default]
    Back,
    Front,
}

impl Cull {
    /// Swap the culled face, for passes drawn through a mirrored projection.
    pub fn mirrored(self) -> Self {
        match self {
            Cull::Back => Cull::Front,
            Cull::Front => Cull::Back,
            Cull::None => Cull::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub blend: Blend,
    pub depth_test: DepthTest,
    pub depth_write: bool,
    pub cull: Cull,
    pub color_write: bool,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            blend: Blend::Opaque,
            depth_test: DepthTest::Less,
            depth_write: true,
            cull: Cull::Back,
            color_write: true,
        }
    }
}

impl RasterState {
    /// State for full-screen resolves: no depth, no culling.
    pub fn fullscreen() -> Self {
        Self {
            depth_test: DepthTest::Always,
            depth_write: false,
            cull: Cull::None,
            ..Self::default()
        }
    }

    pub fn with_blend(mut self, blend: Blend) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_cull(mut self, cull: Cull) -> Self {
        self.cull = cull;
        self
    }

    pub fn with_depth(mut self, test: DepthTest, write: bool) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self
    }

    pub fn without_color(mut self) -> Self {
        self.color_write = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Geometry {
    Mesh(MeshId),
    /// A single oversized triangle covering the viewport; no vertex buffer.
    Fullscreen,
}

/// A sampled image bound to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureRef {
    Texture(TextureId),
    Color { target: TargetId, attachment: u8 },
    Depth(TargetId),
}

impl TextureRef {
    pub fn color(target: TargetId) -> Self {
        TextureRef::Color {
            target,
            attachment: 0,
        }
    }
}

/// One draw submission.
#[derive(Debug, Clone, Copy)]
pub struct Draw<'a> {
    pub program: ProgramId,
    pub geometry: Geometry,
    pub state: RasterState,
    pub params: &'a ShaderParams,
    pub textures: &'a [(u32, TextureRef)],
}

/// Abstract GPU command interface.
///
/// Commands recorded between `begin_pass` and `end_pass` belong to that pass;
/// the device executes passes in recording order. `read_target` flushes any
/// pending work before reading.
pub trait GraphicsDevice {
    fn backend_name(&self) -> &'static str;

    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> RenderResult<MeshId>;
    fn create_texture(&mut self, desc: &TextureDesc, data: &[u8]) -> RenderResult<TextureId>;
    fn destroy_texture(&mut self, texture: TextureId);
    fn create_target(&mut self, desc: &TargetDesc) -> RenderResult<TargetId>;
    fn destroy_target(&mut self, target: TargetId);
    fn target_size(&self, target: TargetId) -> Option<Extent>;

    fn output_size(&self) -> Extent;
    fn resize_output(&mut self, size: Extent) -> RenderResult<()>;
    /// Largest width or height a target or texture may have.
    fn max_target_dimension(&self) -> u32;

    /// Resolve a shader program by name. `None` makes draws with it no-ops.
    fn program(&self, name: &str) -> Option<ProgramId>;

    fn begin_frame(&mut self) -> RenderResult<()>;
    fn begin_pass(&mut self, pass: &PassDesc);
    fn set_viewport(&mut self, rect: Rect);
    fn set_scissor(&mut self, rect: Option<Rect>);
    fn draw(&mut self, draw: &Draw<'_>);
    fn end_pass(&mut self);

    /// Copy every attachment of `src` into the matching attachment of `dst`.
    fn copy_target(&mut self, src: TargetId, dst: TargetId);
    /// Copy only the depth attachment.
    fn copy_depth(&mut self, src: TargetId, dst: TargetId);
    fn generate_mipmaps(&mut self, target: TargetId);

    /// Read the first colour attachment of `face` back as RGBA f32, row-major,
    /// top row first.
    fn read_target(&mut self, target: TargetId, face: u32) -> RenderResult<Vec<[f32; 4]>>;

    /// Submit recorded work without presenting.
    fn flush(&mut self);
    fn end_frame(&mut self) -> RenderResult<()>;
}

/// Full mip chain length for a square or rectangular image.
pub fn mip_level_count(size: Extent) -> u32 {
    let max_dim = size.width.max(size.height).max(1);
    32 - max_dim.leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_level_calculation() {
        assert_eq!(mip_level_count(Extent::new(1, 1)), 1);
        assert_eq!(mip_level_count(Extent::new(2, 2)), 2);
        assert_eq!(mip_level_count(Extent::new(4, 4)), 3);
        assert_eq!(mip_level_count(Extent::new(256, 256)), 9);
        assert_eq!(mip_level_count(Extent::new(512, 512)), 10);
        // Non-square uses the larger dimension
        assert_eq!(mip_level_count(Extent::new(256, 128)), 9);
    }

    #[test]
    fn mirrored_cull_swaps_faces() {
        assert_eq!(Cull::Back.mirrored(), Cull::Front);
        assert_eq!(Cull::Front.mirrored(), Cull::Back);
        assert_eq!(Cull::None.mirrored(), Cull::None);
    }

    #[test]
    fn half_extent_never_reaches_zero() {
        assert_eq!(Extent::new(1, 1).half(), Extent::new(1, 1));
        assert_eq!(Extent::new(800, 600).half(), Extent::new(400, 300));
    }
}
