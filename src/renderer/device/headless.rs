//! A device that records commands instead of executing them.
//!
//! Used by tests and tooling to inspect exactly which passes and draws a frame
//! issues. Targets remember the colour they were last cleared to per face, so
//! `read_target` returns a uniform image of that colour.

use std::collections::HashMap;

use super::{
    Draw, Extent, Geometry, GraphicsDevice, LoadOp, MeshId, PassDesc, PassTarget, ProgramId,
    RasterState, Rect, TargetDesc, TargetId, TextureDesc, TextureId, TextureRef,
};
use crate::asset::Handle;
use crate::error::{RenderError, RenderResult};
use crate::renderer::programs;
use crate::renderer::uniforms::ShaderParams;
use crate::renderer::vertex::Vertex;

/// A draw as seen by the device, with the pass it landed in.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub pass: &'static str,
    pub target: PassTarget,
    pub program: String,
    pub geometry: Geometry,
    pub state: RasterState,
    pub params: ShaderParams,
    pub textures: Vec<(u32, TextureRef)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    CreateTarget { target: TargetId, desc: TargetDesc },
    DestroyTarget(TargetId),
    CreateTexture { texture: TextureId, desc: TextureDesc },
    DestroyTexture(TextureId),
    ResizeOutput(Extent),
    BeginFrame,
    BeginPass(PassDesc),
    Viewport(Rect),
    Scissor(Option<Rect>),
    Draw(RecordedDraw),
    EndPass,
    CopyTarget { src: TargetId, dst: TargetId },
    CopyDepth { src: TargetId, dst: TargetId },
    GenerateMipmaps(TargetId),
    ReadTarget { target: TargetId, face: u32 },
    Flush,
    EndFrame,
}

#[derive(Debug)]
struct TargetRecord {
    desc: TargetDesc,
    face_colors: Vec<[f32; 4]>,
}

pub struct HeadlessDevice {
    output: Extent,
    max_target_dimension: u32,
    targets: Vec<Option<TargetRecord>>,
    textures: Vec<Option<TextureDesc>>,
    mesh_count: usize,
    program_names: Vec<String>,
    programs: HashMap<String, ProgramId>,
    current_pass: Option<PassDesc>,
    failing_allocations: bool,
    events: Vec<DeviceEvent>,
}

impl HeadlessDevice {
    /// Creates a device with every builtin program registered.
    pub fn new(output: Extent) -> Self {
        let mut device = Self {
            output,
            max_target_dimension: 16384,
            targets: Vec::new(),
            textures: Vec::new(),
            mesh_count: 0,
            program_names: Vec::new(),
            programs: HashMap::new(),
            current_pass: None,
            failing_allocations: false,
            events: Vec::new(),
        };
        for name in programs::ALL {
            device.register_program(name);
        }
        device
    }

    /// Targets larger than this fail to allocate, like a real device limit.
    pub fn with_max_target_dimension(mut self, max: u32) -> Self {
        self.max_target_dimension = max;
        self
    }

    /// While set, every target and texture allocation fails.
    pub fn set_allocation_failure(&mut self, failing: bool) {
        self.failing_allocations = failing;
    }

    pub fn register_program(&mut self, name: &str) -> ProgramId {
        if let Some(id) = self.programs.get(name) {
            return *id;
        }
        let id = Handle::new(self.program_names.len());
        self.program_names.push(name.to_string());
        self.programs.insert(name.to_string(), id);
        id
    }

    pub fn remove_program(&mut self, name: &str) {
        self.programs.remove(name);
    }

    pub fn events(&self) -> &[DeviceEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn draws(&self) -> impl Iterator<Item = &RecordedDraw> {
        self.events.iter().filter_map(|event| match event {
            DeviceEvent::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    /// Labels of every pass begun, in order.
    pub fn pass_labels(&self) -> Vec<&'static str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                DeviceEvent::BeginPass(pass) => Some(pass.label),
                _ => None,
            })
            .collect()
    }

    pub fn target_desc(&self, target: TargetId) -> Option<&TargetDesc> {
        self.record(target).map(|record| &record.desc)
    }

    pub fn is_live(&self, target: TargetId) -> bool {
        self.record(target).is_some()
    }

    pub fn live_target_count(&self) -> usize {
        self.targets.iter().filter(|t| t.is_some()).count()
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.iter().filter(|t| t.is_some()).count()
    }

    /// Colour `face` of `target` was last cleared to.
    pub fn clear_color(&self, target: TargetId, face: u32) -> Option<[f32; 4]> {
        self.record(target)
            .and_then(|record| record.face_colors.get(face as usize).copied())
    }

    pub fn program_name(&self, program: ProgramId) -> Option<&str> {
        self.program_names
            .get(program.index())
            .map(String::as_str)
    }

    fn record(&self, target: TargetId) -> Option<&TargetRecord> {
        self.targets.get(target.index())?.as_ref()
    }

    fn check_allocation(&self, size: Extent) -> RenderResult<()> {
        if self.failing_allocations {
            return Err(RenderError::Device("out of device memory".to_string()));
        }
        self.check_size(size)
    }

    fn check_size(&self, size: Extent) -> RenderResult<()> {
        if size.is_empty()
            || size.width > self.max_target_dimension
            || size.height > self.max_target_dimension
        {
            return Err(RenderError::InvalidTargetSize {
                width: size.width,
                height: size.height,
            });
        }
        Ok(())
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn backend_name(&self) -> &'static str {
        "headless"
    }

    fn create_mesh(&mut self, _vertices: &[Vertex], _indices: &[u32]) -> RenderResult<MeshId> {
        let id = Handle::new(self.mesh_count);
        self.mesh_count += 1;
        Ok(id)
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: &[u8]) -> RenderResult<TextureId> {
        self.check_allocation(desc.size)?;
        let layers = if desc.cube { 6 } else { 1 };
        let expected =
            (desc.size.width * desc.size.height * desc.format.bytes_per_pixel() * layers) as usize;
        if data.len() != expected {
            return Err(RenderError::Device(format!(
                "texture '{}' expects {} bytes, got {}",
                desc.label,
                expected,
                data.len()
            )));
        }
        let id = Handle::new(self.textures.len());
        self.textures.push(Some(*desc));
        self.events.push(DeviceEvent::CreateTexture {
            texture: id,
            desc: *desc,
        });
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(slot) = self.textures.get_mut(texture.index()) {
            if slot.take().is_some() {
                self.events.push(DeviceEvent::DestroyTexture(texture));
            }
        }
    }

    fn create_target(&mut self, desc: &TargetDesc) -> RenderResult<TargetId> {
        self.check_allocation(desc.size)?;
        let id = Handle::new(self.targets.len());
        self.targets.push(Some(TargetRecord {
            desc: desc.clone(),
            // Fresh allocations hold undefined content; model it as NaN
            face_colors: vec![[f32::NAN; 4]; desc.layer_count() as usize],
        }));
        self.events.push(DeviceEvent::CreateTarget {
            target: id,
            desc: desc.clone(),
        });
        Ok(id)
    }

    fn destroy_target(&mut self, target: TargetId) {
        if let Some(slot) = self.targets.get_mut(target.index()) {
            if slot.take().is_some() {
                self.events.push(DeviceEvent::DestroyTarget(target));
            }
        }
    }

    fn target_size(&self, target: TargetId) -> Option<Extent> {
        self.record(target).map(|record| record.desc.size)
    }

    fn output_size(&self) -> Extent {
        self.output
    }

    fn resize_output(&mut self, size: Extent) -> RenderResult<()> {
        self.check_size(size)?;
        self.output = size;
        self.events.push(DeviceEvent::ResizeOutput(size));
        Ok(())
    }

    fn max_target_dimension(&self) -> u32 {
        self.max_target_dimension
    }

    fn program(&self, name: &str) -> Option<ProgramId> {
        self.programs.get(name).copied()
    }

    fn begin_frame(&mut self) -> RenderResult<()> {
        self.events.push(DeviceEvent::BeginFrame);
        Ok(())
    }

    fn begin_pass(&mut self, pass: &PassDesc) {
        if self.current_pass.is_some() {
            log::warn!("Pass '{}' begun inside another pass", pass.label);
            self.end_pass();
        }
        if let (PassTarget::Offscreen { target, face }, LoadOp::Clear(color)) =
            (pass.target, pass.color)
        {
            match self
                .targets
                .get_mut(target.index())
                .and_then(Option::as_mut)
            {
                Some(record) => {
                    if let Some(slot) = record.face_colors.get_mut(face as usize) {
                        *slot = color;
                    }
                }
                None => log::warn!("Pass '{}' targets a destroyed target", pass.label),
            }
        }
        self.current_pass = Some(*pass);
        self.events.push(DeviceEvent::BeginPass(*pass));
    }

    fn set_viewport(&mut self, rect: Rect) {
        self.events.push(DeviceEvent::Viewport(rect));
    }

    fn set_scissor(&mut self, rect: Option<Rect>) {
        self.events.push(DeviceEvent::Scissor(rect));
    }

    fn draw(&mut self, draw: &Draw<'_>) {
        let Some(pass) = self.current_pass else {
            log::warn!("Draw issued outside a pass, ignored");
            return;
        };
        let Some(program) = self.program_name(draw.program).map(str::to_string) else {
            return;
        };
        self.events.push(DeviceEvent::Draw(RecordedDraw {
            pass: pass.label,
            target: pass.target,
            program,
            geometry: draw.geometry,
            state: draw.state,
            params: *draw.params,
            textures: draw.textures.to_vec(),
        }));
    }

    fn end_pass(&mut self) {
        if self.current_pass.take().is_some() {
            self.events.push(DeviceEvent::EndPass);
        }
    }

    fn copy_target(&mut self, src: TargetId, dst: TargetId) {
        if let Some(colors) = self.record(src).map(|r| r.face_colors.clone()) {
            if let Some(Some(record)) = self.targets.get_mut(dst.index()) {
                record.face_colors = colors;
            }
        }
        self.events.push(DeviceEvent::CopyTarget { src, dst });
    }

    fn copy_depth(&mut self, src: TargetId, dst: TargetId) {
        self.events.push(DeviceEvent::CopyDepth { src, dst });
    }

    fn generate_mipmaps(&mut self, target: TargetId) {
        self.events.push(DeviceEvent::GenerateMipmaps(target));
    }

    fn read_target(&mut self, target: TargetId, face: u32) -> RenderResult<Vec<[f32; 4]>> {
        let record = self.record(target).ok_or(RenderError::UnknownTarget)?;
        let color = record
            .face_colors
            .get(face as usize)
            .copied()
            .ok_or(RenderError::UnknownTarget)?;
        let texels = (record.desc.size.width * record.desc.size.height) as usize;
        self.events.push(DeviceEvent::ReadTarget { target, face });
        Ok(vec![color; texels])
    }

    fn flush(&mut self) {
        self.events.push(DeviceEvent::Flush);
    }

    fn end_frame(&mut self) -> RenderResult<()> {
        if self.current_pass.is_some() {
            self.end_pass();
        }
        self.events.push(DeviceEvent::EndFrame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::device::TextureFormat;

    #[test]
    fn clear_color_is_read_back_per_face() {
        let mut device = HeadlessDevice::new(Extent::new(64, 64));
        let cube = device
            .create_target(
                &TargetDesc::color("cube", Extent::new(4, 4), TextureFormat::Rgba16Float).cube(1),
            )
            .unwrap();
        device.begin_pass(&PassDesc::clear(
            "face",
            PassTarget::Offscreen { target: cube, face: 3 },
            [0.5, 0.25, 0.0, 1.0],
        ));
        device.end_pass();

        let pixels = device.read_target(cube, 3).unwrap();
        assert_eq!(pixels.len(), 16);
        assert!(pixels.iter().all(|p| *p == [0.5, 0.25, 0.0, 1.0]));
        assert!(device.read_target(cube, 0).unwrap()[0][0].is_nan());
    }

    #[test]
    fn oversized_and_empty_targets_fail() {
        let mut device = HeadlessDevice::new(Extent::new(8, 8)).with_max_target_dimension(1024);
        let desc = TargetDesc::color("big", Extent::new(2048, 16), TextureFormat::Rgba8Unorm);
        assert!(matches!(
            device.create_target(&desc),
            Err(RenderError::InvalidTargetSize { width: 2048, .. })
        ));
        let desc = TargetDesc::color("empty", Extent::new(0, 16), TextureFormat::Rgba8Unorm);
        assert!(device.create_target(&desc).is_err());
        assert_eq!(device.live_target_count(), 0);
    }

    #[test]
    fn draws_with_removed_program_are_not_recorded() {
        let mut device = HeadlessDevice::new(Extent::new(8, 8));
        let program = device.program(programs::BLIT).unwrap();
        let params = ShaderParams::default();
        let draw = Draw {
            program,
            geometry: Geometry::Fullscreen,
            state: RasterState::fullscreen(),
            params: &params,
            textures: &[],
        };

        device.begin_pass(&PassDesc::load("blit", PassTarget::Output));
        device.draw(&draw);
        device.end_pass();
        assert_eq!(device.draws().count(), 1);

        device.remove_program(programs::BLIT);
        assert!(device.program(programs::BLIT).is_none());
        assert_eq!(device.program_name(program), Some(programs::BLIT));
    }

    #[test]
    fn read_of_destroyed_target_is_an_error() {
        let mut device = HeadlessDevice::new(Extent::new(8, 8));
        let target = device
            .create_target(&TargetDesc::color("t", Extent::new(2, 2), TextureFormat::Rgba8Unorm))
            .unwrap();
        device.destroy_target(target);
        assert!(matches!(
            device.read_target(target, 0),
            Err(RenderError::UnknownTarget)
        ));
    }
}
