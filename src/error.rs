use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a renderer operation.
///
/// Per-draw problems (unresolved programs, missing meshes, absent textures) never
/// surface here; they are logged and the draw is skipped.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid render target size {width}x{height}")]
    InvalidTargetSize { width: u32, height: u32 },

    #[error("graphics device error: {0}")]
    Device(String),

    #[error("surface error: {0}")]
    Surface(String),

    #[error("unknown render target")]
    UnknownTarget,

    #[error("probe bake requested while a frame is in flight")]
    FrameInFlight,

    #[error("scene has no irradiance grid")]
    NoIrradianceGrid,

    #[error("irradiance cache {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("irradiance cache {path:?} is malformed: {reason}")]
    MalformedCache { path: PathBuf, reason: String },
}

pub type RenderResult<T> = Result<T, RenderError>;
