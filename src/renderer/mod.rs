pub mod cubemap;
pub mod debug;
mod deferred;
pub mod device;
mod forward;
pub mod frame;
pub mod gpu;
pub mod irradiance;
pub mod postprocess;
pub mod primitives;
pub mod programs;
mod reflections;
pub mod render_calls;
#[allow(clippy::module_inception)]
pub mod renderer;
pub mod resources;
pub mod sh;
pub mod shadows;
pub mod ssao;
pub mod uniforms;
pub mod vertex;

pub use cubemap::CubeFace;
pub use device::{GraphicsDevice, HeadlessDevice};
pub use frame::{FrameLight, RenderView};
pub use gpu::WgpuDevice;
pub use postprocess::PostStage;
pub use primitives::{cube_mesh, sphere_mesh};
pub use render_calls::{build_render_calls, sort_render_calls, RenderCall, RenderCondition};
pub use renderer::{Renderer, RendererStats};
pub use sh::SphericalHarmonics;
pub use shadows::ShadowState;
pub use uniforms::{LightParams, ShaderParams, MAX_SINGLE_PASS_LIGHTS};
pub use vertex::Vertex;
