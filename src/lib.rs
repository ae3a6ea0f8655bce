//! Rendering core: forward and deferred shading over a backend-neutral
//! [`GraphicsDevice`](renderer::GraphicsDevice), with shadow maps, SSAO,
//! baked SH irradiance, captured reflection probes and a post-processing chain.

pub mod asset;
pub mod config;
pub mod error;
pub mod renderer;
pub mod scene;

pub use config::RendererConfig;
pub use error::{RenderError, RenderResult};
pub use renderer::{HeadlessDevice, Renderer, RendererStats, WgpuDevice};

/// Install `env_logger` at `info` level. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
