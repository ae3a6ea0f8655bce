use std::mem;
use std::num::NonZeroU64;

use crate::renderer::uniforms::ShaderParams;

/// Offset granularity of dynamic uniform bindings.
pub(crate) const UNIFORM_ALIGNMENT: u64 = 256;

/// Bytes one parameter block occupies in the ring.
pub(crate) fn params_stride() -> u64 {
    let size = mem::size_of::<ShaderParams>() as u64;
    size.div_ceil(UNIFORM_ALIGNMENT) * UNIFORM_ALIGNMENT
}

struct UniformChunk {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    scratch: Vec<u8>,
}

/// Location of one uploaded parameter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UniformSlot {
    pub chunk: usize,
    pub offset: u32,
}

/// Per-draw `ShaderParams`, bound with a dynamic offset.
///
/// Blocks are staged on the CPU and written right before each submit; a full
/// chunk is never reallocated, a new one is appended instead so bind groups
/// recorded earlier stay valid.
pub(crate) struct UniformRing {
    pub(crate) bind_layout: wgpu::BindGroupLayout,
    chunks: Vec<UniformChunk>,
    capacity: u32,
    current: usize,
}

impl UniformRing {
    pub(crate) fn new(device: &wgpu::Device, capacity: u32) -> Self {
        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ParamsBindLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(mem::size_of::<ShaderParams>() as u64),
                },
                count: None,
            }],
        });
        let mut ring = Self {
            bind_layout,
            chunks: Vec::new(),
            capacity: capacity.max(1),
            current: 0,
        };
        ring.push_chunk(device);
        ring
    }

    fn push_chunk(&mut self, device: &wgpu::Device) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ParamsBuffer"),
            size: params_stride() * self.capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ParamsBindGroup"),
            layout: &self.bind_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(mem::size_of::<ShaderParams>() as u64),
                }),
            }],
        });
        if !self.chunks.is_empty() {
            log::info!(
                "Growing params ring: {} -> {} chunks",
                self.chunks.len(),
                self.chunks.len() + 1
            );
        }
        self.chunks.push(UniformChunk {
            buffer,
            bind_group,
            scratch: Vec::with_capacity((params_stride() * self.capacity as u64) as usize),
        });
    }

    pub(crate) fn push(&mut self, device: &wgpu::Device, params: &ShaderParams) -> UniformSlot {
        let stride = params_stride() as usize;
        let full = self.chunks[self.current].scratch.len() / stride >= self.capacity as usize;
        if full {
            self.current += 1;
            if self.current == self.chunks.len() {
                self.push_chunk(device);
            }
        }
        let chunk = &mut self.chunks[self.current];
        let offset = chunk.scratch.len();
        chunk.scratch.extend_from_slice(bytemuck::bytes_of(params));
        chunk.scratch.resize(offset + stride, 0);
        UniformSlot {
            chunk: self.current,
            offset: offset as u32,
        }
    }

    pub(crate) fn bind_group(&self, chunk: usize) -> &wgpu::BindGroup {
        &self.chunks[chunk].bind_group
    }

    /// Upload staged blocks and start over; call before every submit.
    pub(crate) fn flush(&mut self, queue: &wgpu::Queue) {
        for chunk in &mut self.chunks {
            if !chunk.scratch.is_empty() {
                queue.write_buffer(&chunk.buffer, 0, &chunk.scratch);
                chunk.scratch.clear();
            }
        }
        self.current = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_is_aligned_and_holds_params() {
        let stride = params_stride();
        assert_eq!(stride % UNIFORM_ALIGNMENT, 0);
        assert!(stride >= mem::size_of::<ShaderParams>() as u64);
        assert!(stride - (mem::size_of::<ShaderParams>() as u64) < UNIFORM_ALIGNMENT);
    }
}
