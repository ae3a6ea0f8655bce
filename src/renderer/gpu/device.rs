use std::collections::HashMap;
use std::sync::{mpsc, Arc};

use wgpu::util::DeviceExt;
use winit::window::Window;

use super::buffers::{UniformRing, UniformSlot};
use super::context::{GpuContext, OutputSurface};
use super::mipmaps::MipmapGenerator;
use super::pipeline_builder::DEPTH_FORMAT;
use super::readback;
use super::shaders::builtin_source;
use super::PipelineBuilder;
use crate::asset::Handle;
use crate::error::{RenderError, RenderResult};
use crate::renderer::device::{
    slots, Draw, Extent, Geometry, GraphicsDevice, LoadOp, MeshId,
    PassDesc, PassTarget, ProgramId, RasterState, Rect, TargetDesc, TargetId, TargetKind,
    TextureDesc, TextureFormat, TextureId, TextureRef,
};
use crate::renderer::programs;
use crate::renderer::vertex::Vertex;

const INITIAL_PARAMS_CAPACITY: u32 = 256;

const LINEAR_SAMPLER_BINDING: u32 = slots::COUNT as u32;
const SHADOW_SAMPLER_BINDING: u32 = LINEAR_SAMPLER_BINDING + 1;
const NEAREST_SAMPLER_BINDING: u32 = LINEAR_SAMPLER_BINDING + 2;

fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
    }
}

/// Everything a pipeline depends on besides the shared layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    colors: Vec<wgpu::TextureFormat>,
    depth: bool,
    state: RasterState,
    mesh: bool,
}

struct ProgramEntry {
    name: String,
    module: wgpu::ShaderModule,
}

struct MeshEntry {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

struct TextureEntry {
    view: wgpu::TextureView,
    format: TextureFormat,
    cube: bool,
}

struct TargetEntry {
    desc: TargetDesc,
    colors: Vec<wgpu::Texture>,
    color_views: Vec<wgpu::TextureView>,
    depth: Option<wgpu::Texture>,
    depth_view: Option<wgpu::TextureView>,
}

struct DefaultTextures {
    white: wgpu::TextureView,
    depth: wgpu::TextureView,
    cube: wgpu::TextureView,
    data: wgpu::TextureView,
}

enum PassCommand {
    Viewport(Rect),
    Scissor(Rect),
    Draw {
        key: PipelineKey,
        params: UniformSlot,
        textures: wgpu::BindGroup,
        geometry: Geometry,
    },
}

struct PendingPass {
    desc: PassDesc,
    extent: Extent,
    colors: Vec<wgpu::TextureFormat>,
    depth: bool,
    commands: Vec<PassCommand>,
}

/// [`GraphicsDevice`] on top of wgpu, presenting to a window or to an
/// offscreen texture.
///
/// Programs are WGSL modules with `vs_main`/`fs_main` entry points, reading
/// `ShaderParams` at group 0 binding 0 and the texture slots at group 1.
pub struct WgpuDevice {
    ctx: GpuContext,
    params: UniformRing,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    samplers: [wgpu::Sampler; 3],
    defaults: DefaultTextures,
    mipmaps: MipmapGenerator,

    programs: Vec<ProgramEntry>,
    program_names: HashMap<String, ProgramId>,
    pipelines: HashMap<PipelineKey, Option<wgpu::RenderPipeline>>,
    texture_groups: HashMap<[Option<TextureRef>; slots::COUNT], wgpu::BindGroup>,

    meshes: Vec<MeshEntry>,
    textures: Vec<Option<TextureEntry>>,
    targets: Vec<Option<TargetEntry>>,

    output_depth: wgpu::TextureView,
    frame: Option<wgpu::SurfaceTexture>,
    encoder: Option<wgpu::CommandEncoder>,
    pass: Option<PendingPass>,
}

impl WgpuDevice {
    /// Device presenting to `window`, with the builtin programs compiled.
    pub fn new(window: Arc<Window>) -> RenderResult<Self> {
        let ctx = pollster::block_on(GpuContext::for_window(window))?;
        let mut device = Self::with_context(ctx);
        device.register_builtin_programs()?;
        Ok(device)
    }

    /// Device without a surface; the output is an `Rgba8Unorm` texture.
    pub fn offscreen(size: Extent) -> RenderResult<Self> {
        if size.is_empty() {
            return Err(RenderError::InvalidTargetSize {
                width: size.width,
                height: size.height,
            });
        }
        let ctx = pollster::block_on(GpuContext::offscreen(size))?;
        let mut device = Self::with_context(ctx);
        device.register_builtin_programs()?;
        Ok(device)
    }

    fn with_context(ctx: GpuContext) -> Self {
        let device = &ctx.device;
        let params = UniformRing::new(device, INITIAL_PARAMS_CAPACITY);
        let texture_layout = texture_bind_layout(device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Program Pipeline Layout"),
            bind_group_layouts: &[&params.bind_layout, &texture_layout],
            push_constant_ranges: &[],
        });
        let samplers = create_samplers(device);
        let defaults = create_defaults(device, &ctx.queue);
        let mipmaps = MipmapGenerator::new(device);
        let output_depth = depth_attachment(device, ctx.size);

        log::info!(
            "wgpu device ready: {}x{} output, {:?}",
            ctx.size.width,
            ctx.size.height,
            ctx.output_format
        );

        Self {
            ctx,
            params,
            texture_layout,
            pipeline_layout,
            samplers,
            defaults,
            mipmaps,
            programs: Vec::new(),
            program_names: HashMap::new(),
            pipelines: HashMap::new(),
            texture_groups: HashMap::new(),
            meshes: Vec::new(),
            textures: Vec::new(),
            targets: Vec::new(),
            output_depth,
            frame: None,
            encoder: None,
            pass: None,
        }
    }

    /// Compile `wgsl` and make it resolvable as `name`. Re-registering a name
    /// replaces its module.
    pub fn register_program(&mut self, name: &str, wgsl: &str) -> RenderResult<ProgramId> {
        self.ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(name),
                source: wgpu::ShaderSource::Wgsl(wgsl.into()),
            });
        if let Some(err) = pollster::block_on(self.ctx.device.pop_error_scope()) {
            return Err(RenderError::Device(format!(
                "program '{name}' failed to compile: {err}"
            )));
        }

        let entry = ProgramEntry {
            name: name.to_string(),
            module,
        };
        if let Some(id) = self.program_names.get(name).copied() {
            self.programs[id.index()] = entry;
            self.pipelines.retain(|key, _| key.program != id);
            return Ok(id);
        }
        let id = Handle::new(self.programs.len());
        self.programs.push(entry);
        self.program_names.insert(name.to_string(), id);
        log::debug!("Registered program '{name}'");
        Ok(id)
    }

    /// Compile every program the renderer draws with. Returns how many were
    /// registered.
    pub fn register_builtin_programs(&mut self) -> RenderResult<usize> {
        for name in programs::ALL {
            let source = builtin_source(name).ok_or_else(|| {
                RenderError::Device(format!("no builtin source for program '{name}'"))
            })?;
            self.register_program(name, &source)?;
        }
        log::info!("Registered {} builtin programs", programs::ALL.len());
        Ok(programs::ALL.len())
    }

    pub fn output_format(&self) -> wgpu::TextureFormat {
        self.ctx.output_format
    }

    fn check_size(&self, size: Extent) -> RenderResult<()> {
        let max = self.max_target_dimension();
        if size.is_empty() || size.width > max || size.height > max {
            return Err(RenderError::InvalidTargetSize {
                width: size.width,
                height: size.height,
            });
        }
        Ok(())
    }

    fn target(&self, target: TargetId) -> Option<&TargetEntry> {
        self.targets.get(target.index())?.as_ref()
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.ctx.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            })
        })
    }

    fn close_open_pass(&mut self, operation: &str) {
        if let Some(pass) = &self.pass {
            log::warn!("{operation} issued inside pass '{}'", pass.desc.label);
            self.end_pass();
        }
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey) -> bool {
        if let Some(pipeline) = self.pipelines.get(key) {
            return pipeline.is_some();
        }
        let Some(program) = self.programs.get(key.program.index()) else {
            return false;
        };
        let device = &self.ctx.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut builder = PipelineBuilder::new(device, &self.pipeline_layout, &program.module)
            .with_label(&program.name)
            .with_state(key.state)
            .with_color_targets(&key.colors);
        if key.mesh {
            builder = builder.with_mesh_input();
        }
        if key.depth {
            builder = builder.with_depth();
        }
        let pipeline = builder.build();

        let pipeline = match pollster::block_on(device.pop_error_scope()) {
            None => Some(pipeline),
            Some(err) => {
                log::error!("Pipeline for program '{}' failed: {err}", program.name);
                None
            }
        };
        let built = pipeline.is_some();
        self.pipelines.insert(key.clone(), pipeline);
        built
    }

    fn resolve_view(&self, slot: u32, texture: Option<TextureRef>) -> &wgpu::TextureView {
        let fallback = match slot {
            slots::SCENE_DEPTH | slots::SHADOW_MAP => &self.defaults.depth,
            slots::ENVIRONMENT => &self.defaults.cube,
            slots::DATA => &self.defaults.data,
            _ => &self.defaults.white,
        };
        let Some(texture) = texture else {
            return fallback;
        };
        let depth_slot = matches!(slot, slots::SCENE_DEPTH | slots::SHADOW_MAP);
        let found = match texture {
            TextureRef::Texture(id) => self
                .textures
                .get(id.index())
                .and_then(Option::as_ref)
                .filter(|entry| !depth_slot && entry.cube == (slot == slots::ENVIRONMENT))
                .filter(|entry| self.sampleable(slot, entry.format))
                .map(|entry| &entry.view),
            TextureRef::Color { target, attachment } => self
                .target(target)
                .filter(|entry| {
                    !depth_slot && (entry.desc.kind == TargetKind::Cube) == (slot == slots::ENVIRONMENT)
                })
                .and_then(|entry| {
                    let format = *entry.desc.color.get(attachment as usize)?;
                    self.sampleable(slot, format)
                        .then(|| entry.color_views.get(attachment as usize))
                        .flatten()
                }),
            TextureRef::Depth(target) => self
                .target(target)
                .filter(|_| depth_slot)
                .and_then(|entry| entry.depth_view.as_ref()),
        };
        found.unwrap_or_else(|| {
            log::debug!("Slot {slot} falls back to its default texture");
            fallback
        })
    }

    fn sampleable(&self, slot: u32, format: TextureFormat) -> bool {
        slot == slots::DATA || format != TextureFormat::Rgba32Float || self.ctx.float32_filterable
    }

    fn texture_group(&mut self, textures: &[(u32, TextureRef)]) -> wgpu::BindGroup {
        let mut bound = [None; slots::COUNT];
        for (slot, texture) in textures {
            if let Some(entry) = bound.get_mut(*slot as usize) {
                *entry = Some(*texture);
            }
        }
        if let Some(group) = self.texture_groups.get(&bound) {
            return group.clone();
        }

        let group = {
            let mut entries: Vec<wgpu::BindGroupEntry> = bound
                .iter()
                .enumerate()
                .map(|(slot, texture)| wgpu::BindGroupEntry {
                    binding: slot as u32,
                    resource: wgpu::BindingResource::TextureView(
                        self.resolve_view(slot as u32, *texture),
                    ),
                })
                .collect();
            for (binding, sampler) in [
                LINEAR_SAMPLER_BINDING,
                SHADOW_SAMPLER_BINDING,
                NEAREST_SAMPLER_BINDING,
            ]
            .into_iter()
            .zip(&self.samplers)
            {
                entries.push(wgpu::BindGroupEntry {
                    binding,
                    resource: wgpu::BindingResource::Sampler(sampler),
                });
            }
            self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Texture Slots"),
                layout: &self.texture_layout,
                entries: &entries,
            })
        };
        self.texture_groups.insert(bound, group.clone());
        group
    }

    /// Attachment views for `target`; `None` when it cannot be rendered to.
    fn pass_views(
        &self,
        target: PassTarget,
    ) -> Option<(Vec<wgpu::TextureView>, Option<wgpu::TextureView>)> {
        match target {
            PassTarget::Output => {
                let color = match &self.ctx.output {
                    OutputSurface::Window { .. } => self
                        .frame
                        .as_ref()?
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default()),
                    OutputSurface::Offscreen { texture } => {
                        texture.create_view(&wgpu::TextureViewDescriptor::default())
                    }
                };
                Some((vec![color], Some(self.output_depth.clone())))
            }
            PassTarget::Offscreen { target, face } => {
                let entry = self.target(target)?;
                if face >= entry.desc.layer_count() {
                    return None;
                }
                let colors = entry
                    .colors
                    .iter()
                    .map(|texture| face_view(texture, face, wgpu::TextureAspect::All))
                    .collect();
                let depth = entry
                    .depth
                    .as_ref()
                    .map(|texture| face_view(texture, face, wgpu::TextureAspect::DepthOnly));
                Some((colors, depth))
            }
        }
    }

    fn submit(&mut self) {
        self.params.flush(&self.ctx.queue);
        if let Some(encoder) = self.encoder.take() {
            self.ctx.queue.submit(Some(encoder.finish()));
        }
    }

    fn copy_textures(&mut self, pairs: Vec<(wgpu::Texture, wgpu::Texture)>) {
        let encoder = self.encoder();
        for (src, dst) in pairs {
            if src.size() != dst.size() || src.format() != dst.format() {
                log::warn!("Copy between mismatched textures skipped");
                continue;
            }
            encoder.copy_texture_to_texture(
                src.as_image_copy(),
                dst.as_image_copy(),
                src.size(),
            );
        }
    }
}

impl GraphicsDevice for WgpuDevice {
    fn backend_name(&self) -> &'static str {
        "wgpu"
    }

    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> RenderResult<MeshId> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(RenderError::Device("mesh has no geometry".into()));
        }
        let device = &self.ctx.device;
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Vertices"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Indices"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let id = Handle::new(self.meshes.len());
        self.meshes.push(MeshEntry {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        });
        Ok(id)
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: &[u8]) -> RenderResult<TextureId> {
        self.check_size(desc.size)?;
        let layers = if desc.cube { 6 } else { 1 };
        let row_bytes = desc.size.width * desc.format.bytes_per_pixel();
        let expected = (row_bytes * desc.size.height * layers) as usize;
        if data.len() != expected {
            return Err(RenderError::Device(format!(
                "texture '{}' expects {} bytes, got {}",
                desc.label,
                expected,
                data.len()
            )));
        }

        let size = wgpu::Extent3d {
            width: desc.size.width,
            height: desc.size.height,
            depth_or_array_layers: layers,
        };
        let texture = self.ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(desc.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.ctx.queue.write_texture(
            texture.as_image_copy(),
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(row_bytes),
                rows_per_image: Some(desc.size.height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(if desc.cube {
                wgpu::TextureViewDimension::Cube
            } else {
                wgpu::TextureViewDimension::D2
            }),
            ..Default::default()
        });

        let id = Handle::new(self.textures.len());
        self.textures.push(Some(TextureEntry {
            view,
            format: desc.format,
            cube: desc.cube,
        }));
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(slot) = self.textures.get_mut(texture.index()) {
            if slot.take().is_some() {
                self.texture_groups.clear();
            }
        }
    }

    fn create_target(&mut self, desc: &TargetDesc) -> RenderResult<TargetId> {
        self.check_size(desc.size)?;
        let device = &self.ctx.device;
        let size = wgpu::Extent3d {
            width: desc.size.width,
            height: desc.size.height,
            depth_or_array_layers: desc.layer_count(),
        };
        let sample_dimension = match desc.kind {
            TargetKind::Flat => wgpu::TextureViewDimension::D2,
            TargetKind::Cube => wgpu::TextureViewDimension::Cube,
        };

        let colors: Vec<wgpu::Texture> = desc
            .color
            .iter()
            .map(|format| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(desc.label),
                    size,
                    mip_level_count: desc.mip_levels,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu_format(*format),
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::TEXTURE_BINDING
                        | wgpu::TextureUsages::COPY_SRC
                        | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                })
            })
            .collect();
        let color_views = colors
            .iter()
            .map(|texture| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    dimension: Some(sample_dimension),
                    ..Default::default()
                })
            })
            .collect();

        let depth = desc.depth.then(|| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(desc.label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        });
        let depth_view = depth
            .as_ref()
            .map(|texture| face_view(texture, 0, wgpu::TextureAspect::DepthOnly));

        let id = Handle::new(self.targets.len());
        self.targets.push(Some(TargetEntry {
            desc: desc.clone(),
            colors,
            color_views,
            depth,
            depth_view,
        }));
        log::debug!(
            "Created target '{}' {}x{}",
            desc.label,
            desc.size.width,
            desc.size.height
        );
        Ok(id)
    }

    fn destroy_target(&mut self, target: TargetId) {
        if let Some(slot) = self.targets.get_mut(target.index()) {
            if let Some(entry) = slot.take() {
                entry.colors.iter().for_each(wgpu::Texture::destroy);
                if let Some(depth) = &entry.depth {
                    depth.destroy();
                }
                self.texture_groups.clear();
            }
        }
    }

    fn target_size(&self, target: TargetId) -> Option<Extent> {
        self.target(target).map(|entry| entry.desc.size)
    }

    fn output_size(&self) -> Extent {
        self.ctx.size
    }

    fn resize_output(&mut self, size: Extent) -> RenderResult<()> {
        self.check_size(size)?;
        self.close_open_pass("Resize");
        self.submit();
        self.frame = None;
        self.ctx.resize(size);
        self.output_depth = depth_attachment(&self.ctx.device, size);
        Ok(())
    }

    fn max_target_dimension(&self) -> u32 {
        self.ctx.device.limits().max_texture_dimension_2d
    }

    fn program(&self, name: &str) -> Option<ProgramId> {
        self.program_names.get(name).copied()
    }

    fn begin_frame(&mut self) -> RenderResult<()> {
        let OutputSurface::Window { surface, config } = &self.ctx.output else {
            return Ok(());
        };
        match surface.get_current_texture() {
            Ok(frame) => {
                self.frame = Some(frame);
                Ok(())
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                surface.configure(&self.ctx.device, config);
                Err(RenderError::Surface("surface lost, reconfigured".into()))
            }
            Err(err) => Err(RenderError::Surface(err.to_string())),
        }
    }

    fn begin_pass(&mut self, pass: &PassDesc) {
        if let Some(open) = &self.pass {
            log::warn!("Pass '{}' begun inside '{}'", pass.label, open.desc.label);
            self.end_pass();
        }
        let (extent, colors, depth) = match pass.target {
            PassTarget::Output => (self.ctx.size, vec![self.ctx.output_format], true),
            PassTarget::Offscreen { target, .. } => match self.target(target) {
                Some(entry) => (
                    entry.desc.size,
                    entry.desc.color.iter().copied().map(wgpu_format).collect(),
                    entry.desc.depth,
                ),
                None => {
                    log::warn!("Pass '{}' targets a destroyed target", pass.label);
                    return;
                }
            },
        };
        self.pass = Some(PendingPass {
            desc: *pass,
            extent,
            colors,
            depth,
            commands: Vec::new(),
        });
    }

    fn set_viewport(&mut self, rect: Rect) {
        if let Some(pass) = &mut self.pass {
            pass.commands.push(PassCommand::Viewport(rect));
        }
    }

    fn set_scissor(&mut self, rect: Option<Rect>) {
        if let Some(pass) = &mut self.pass {
            let full = Rect::full(pass.extent);
            let rect = rect.map_or(full, |rect| clamp_rect(rect, pass.extent));
            pass.commands.push(PassCommand::Scissor(rect));
        }
    }

    fn draw(&mut self, draw: &Draw<'_>) {
        let Some(pass) = &self.pass else {
            log::warn!("Draw issued outside a pass, ignored");
            return;
        };
        let key = PipelineKey {
            program: draw.program,
            colors: pass.colors.clone(),
            depth: pass.depth,
            state: draw.state,
            mesh: matches!(draw.geometry, Geometry::Mesh(_)),
        };
        if let Geometry::Mesh(mesh) = draw.geometry {
            if self.meshes.get(mesh.index()).is_none() {
                log::warn!("Draw references unknown mesh {mesh:?}");
                return;
            }
        }
        if !self.ensure_pipeline(&key) {
            return;
        }
        let params = self.params.push(&self.ctx.device, draw.params);
        let textures = self.texture_group(draw.textures);
        if let Some(pass) = &mut self.pass {
            pass.commands.push(PassCommand::Draw {
                key,
                params,
                textures,
                geometry: draw.geometry,
            });
        }
    }

    fn end_pass(&mut self) {
        let Some(pending) = self.pass.take() else {
            return;
        };
        let Some((color_views, depth_view)) = self.pass_views(pending.desc.target) else {
            log::warn!("Pass '{}' has no attachments, dropped", pending.desc.label);
            return;
        };

        let color_load = match pending.desc.color {
            LoadOp::Clear([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            LoadOp::Load => wgpu::LoadOp::Load,
        };
        let depth_load = match pending.desc.depth {
            LoadOp::Clear(depth) => wgpu::LoadOp::Clear(depth),
            LoadOp::Load => wgpu::LoadOp::Load,
        };
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color_views
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        let device = &self.ctx.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            })
        });
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(pending.desc.label),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth_view.as_ref().map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for command in &pending.commands {
            match command {
                PassCommand::Viewport(rect) => {
                    let rect = clamp_rect(*rect, pending.extent);
                    render_pass.set_viewport(
                        rect.x as f32,
                        rect.y as f32,
                        rect.width as f32,
                        rect.height as f32,
                        0.0,
                        1.0,
                    );
                }
                PassCommand::Scissor(rect) => {
                    render_pass.set_scissor_rect(rect.x, rect.y, rect.width, rect.height);
                }
                PassCommand::Draw {
                    key,
                    params,
                    textures,
                    geometry,
                } => {
                    let Some(Some(pipeline)) = self.pipelines.get(key) else {
                        continue;
                    };
                    render_pass.set_pipeline(pipeline);
                    render_pass.set_bind_group(0, self.params.bind_group(params.chunk), &[params.offset]);
                    render_pass.set_bind_group(1, textures, &[]);
                    match geometry {
                        Geometry::Fullscreen => render_pass.draw(0..3, 0..1),
                        Geometry::Mesh(mesh) => {
                            let Some(mesh) = self.meshes.get(mesh.index()) else {
                                continue;
                            };
                            render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                            render_pass
                                .set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                            render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                        }
                    }
                }
            }
        }
    }

    fn copy_target(&mut self, src: TargetId, dst: TargetId) {
        self.close_open_pass("Copy");
        let (Some(from), Some(to)) = (self.target(src), self.target(dst)) else {
            log::warn!("Copy between unknown targets skipped");
            return;
        };
        let mut pairs: Vec<_> = from
            .colors
            .iter()
            .cloned()
            .zip(to.colors.iter().cloned())
            .collect();
        if let (Some(a), Some(b)) = (&from.depth, &to.depth) {
            pairs.push((a.clone(), b.clone()));
        }
        self.copy_textures(pairs);
    }

    fn copy_depth(&mut self, src: TargetId, dst: TargetId) {
        self.close_open_pass("Depth copy");
        let depth = |target| self.target(target).and_then(|entry| entry.depth.clone());
        match (depth(src), depth(dst)) {
            (Some(a), Some(b)) => self.copy_textures(vec![(a, b)]),
            _ => log::warn!("Depth copy needs depth on both targets"),
        }
    }

    fn generate_mipmaps(&mut self, target: TargetId) {
        self.close_open_pass("Mipmap generation");
        let Some(entry) = self.target(target) else {
            return;
        };
        if entry.desc.mip_levels <= 1 {
            return;
        }
        let jobs: Vec<(wgpu::Texture, TextureFormat)> = entry
            .colors
            .iter()
            .cloned()
            .zip(entry.desc.color.iter().copied())
            .filter(|(_, format)| self.sampleable(slots::ALBEDO, *format))
            .collect();

        let device = &self.ctx.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            })
        });
        for (texture, format) in jobs {
            self.mipmaps
                .generate(device, encoder, &texture, wgpu_format(format));
        }
    }

    fn read_target(&mut self, target: TargetId, face: u32) -> RenderResult<Vec<[f32; 4]>> {
        self.close_open_pass("Read-back");
        let entry = self.target(target).ok_or(RenderError::UnknownTarget)?;
        if face >= entry.desc.layer_count() {
            return Err(RenderError::UnknownTarget);
        }
        let (Some(texture), Some(format)) = (entry.colors.first().cloned(), entry.desc.color.first().copied())
        else {
            return Err(RenderError::Device(format!(
                "target '{}' has no colour attachment to read",
                entry.desc.label
            )));
        };
        let size = entry.desc.size;
        let bytes_per_row = readback::padded_bytes_per_row(size.width, format);

        let staging = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Read-back Staging"),
            size: (bytes_per_row * size.height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        self.encoder().copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: face },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(size.height),
                },
            },
            wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
        );
        self.submit();

        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let mapped = loop {
            self.ctx
                .device
                .poll(wgpu::PollType::Poll)
                .map_err(|err| RenderError::Device(err.to_string()))?;
            match receiver.try_recv() {
                Ok(result) => break result,
                Err(mpsc::TryRecvError::Empty) => std::thread::yield_now(),
                Err(mpsc::TryRecvError::Disconnected) => {
                    return Err(RenderError::Device("read-back callback dropped".into()))
                }
            }
        };
        mapped.map_err(|err| RenderError::Device(format!("read-back map failed: {err}")))?;

        let texels = {
            let data = slice.get_mapped_range();
            readback::decode_rows(&data, size.width, size.height, format)
        };
        staging.unmap();
        Ok(texels)
    }

    fn flush(&mut self) {
        self.close_open_pass("Flush");
        self.submit();
    }

    fn end_frame(&mut self) -> RenderResult<()> {
        self.close_open_pass("End of frame");
        self.submit();
        if let Some(frame) = self.frame.take() {
            frame.present();
        }
        Ok(())
    }
}

fn clamp_rect(rect: Rect, extent: Extent) -> Rect {
    let x = rect.x.min(extent.width.saturating_sub(1));
    let y = rect.y.min(extent.height.saturating_sub(1));
    Rect::new(
        x,
        y,
        rect.width.min(extent.width - x).max(1),
        rect.height.min(extent.height - y).max(1),
    )
}

fn face_view(texture: &wgpu::Texture, face: u32, aspect: wgpu::TextureAspect) -> wgpu::TextureView {
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("Face View"),
        dimension: Some(wgpu::TextureViewDimension::D2),
        aspect,
        base_mip_level: 0,
        mip_level_count: Some(1),
        base_array_layer: face,
        array_layer_count: Some(1),
        ..Default::default()
    })
}

fn depth_attachment(device: &wgpu::Device, size: Extent) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("Output Depth"),
            size: wgpu::Extent3d {
                width: size.width.max(1),
                height: size.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

fn texture_bind_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let texture = |binding, sample_type, view_dimension| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension,
            multisampled: false,
        },
        count: None,
    };
    let sampler = |binding, kind| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Sampler(kind),
        count: None,
    };
    let filterable = wgpu::TextureSampleType::Float { filterable: true };

    let mut entries: Vec<wgpu::BindGroupLayoutEntry> = slots::FILTERABLE_2D
        .iter()
        .map(|slot| texture(*slot, filterable, wgpu::TextureViewDimension::D2))
        .collect();
    entries.extend([
        texture(
            slots::SCENE_DEPTH,
            wgpu::TextureSampleType::Depth,
            wgpu::TextureViewDimension::D2,
        ),
        texture(
            slots::SHADOW_MAP,
            wgpu::TextureSampleType::Depth,
            wgpu::TextureViewDimension::D2,
        ),
        texture(slots::ENVIRONMENT, filterable, wgpu::TextureViewDimension::Cube),
        texture(
            slots::DATA,
            wgpu::TextureSampleType::Float { filterable: false },
            wgpu::TextureViewDimension::D2,
        ),
        sampler(LINEAR_SAMPLER_BINDING, wgpu::SamplerBindingType::Filtering),
        sampler(SHADOW_SAMPLER_BINDING, wgpu::SamplerBindingType::Comparison),
        sampler(NEAREST_SAMPLER_BINDING, wgpu::SamplerBindingType::NonFiltering),
    ]);
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Texture Slots Layout"),
        entries: &entries,
    })
}

fn create_samplers(device: &wgpu::Device) -> [wgpu::Sampler; 3] {
    let linear = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Linear Sampler"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    });
    let shadow = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Shadow Sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        compare: Some(wgpu::CompareFunction::LessEqual),
        ..Default::default()
    });
    let nearest = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Nearest Sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });
    [linear, shadow, nearest]
}

fn create_defaults(device: &wgpu::Device, queue: &wgpu::Queue) -> DefaultTextures {
    let upload = |label, format, layers: u32, texel: &[u8], dimension| {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let data: Vec<u8> = texel.repeat(layers as usize);
        queue.write_texture(
            texture.as_image_copy(),
            &data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(texel.len() as u32),
                rows_per_image: Some(1),
            },
            texture.size(),
        );
        texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(dimension),
            ..Default::default()
        })
    };
    let white = upload(
        "Default White",
        wgpu::TextureFormat::Rgba8Unorm,
        1,
        &[255, 255, 255, 255],
        wgpu::TextureViewDimension::D2,
    );
    let cube = upload(
        "Default Cube",
        wgpu::TextureFormat::Rgba8Unorm,
        6,
        &[0, 0, 0, 255],
        wgpu::TextureViewDimension::Cube,
    );
    let data = upload(
        "Default Data",
        wgpu::TextureFormat::Rgba32Float,
        1,
        &[0; 16],
        wgpu::TextureViewDimension::D2,
    );

    // Depth textures cannot be written by the queue; clear one to the far plane.
    let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Default Depth"),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Default Depth Clear"),
    });
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Default Depth Clear"),
        color_attachments: &[],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: &depth,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    queue.submit(Some(encoder.finish()));

    DefaultTextures {
        white,
        depth,
        cube,
        data,
    }
}
