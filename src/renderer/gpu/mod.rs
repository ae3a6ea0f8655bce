//! wgpu implementation of [`GraphicsDevice`](crate::renderer::device::GraphicsDevice).

mod buffers;
mod context;
mod device;
mod mipmaps;
mod pipeline_builder;
mod readback;
mod shaders;

pub use device::WgpuDevice;
pub use pipeline_builder::PipelineBuilder;
pub use shaders::builtin_source;
