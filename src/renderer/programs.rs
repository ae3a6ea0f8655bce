//! Names of the shader programs the renderer invokes.
//!
//! Devices resolve these through [`GraphicsDevice::program`]; a name the device
//! does not know makes every draw that needs it a silent no-op.
//!
//! [`GraphicsDevice::program`]: crate::renderer::device::GraphicsDevice::program

/// Forward shading, one light per draw (`params.light`).
pub const FORWARD_LIT: &str = "forward_lit";
/// Forward shading over the `params.lights` array.
pub const FORWARD_SINGLE_PASS: &str = "forward_single_pass";
/// Depth-only capture for shadow maps.
pub const SHADOW_DEPTH: &str = "shadow_depth";
/// Environment cubemap drawn behind the scene.
pub const SKYBOX: &str = "skybox";
/// Per-vertex material property visualisation.
pub const DEBUG_PROPERTY: &str = "debug_property";

pub const GBUFFER: &str = "gbuffer";
pub const DECAL: &str = "decal";
pub const SSAO: &str = "ssao";
/// Ambient, irradiance, reflections and emissive from the G-buffer.
pub const DEFERRED_AMBIENT: &str = "deferred_ambient";
/// One full-screen directional light.
pub const DEFERRED_DIRECTIONAL: &str = "deferred_directional";
/// Point or spot light drawn as a sphere proxy.
pub const DEFERRED_LOCAL: &str = "deferred_local";
/// Selects one G-buffer channel (`effect.x`) into the output.
pub const DEBUG_GBUFFER: &str = "debug_gbuffer";
/// Copies a colour texture, or linearised depth when `effect.x` is 1.
pub const DEBUG_TEXTURE: &str = "debug_texture";
/// Irradiance probe sphere shaded from its SH coefficients.
pub const PROBE: &str = "probe";

pub const TONEMAP: &str = "tonemap";
pub const GAMMA: &str = "gamma";
pub const MOTION_BLUR: &str = "motion_blur";
pub const BLUR: &str = "blur";
pub const PIXELATE: &str = "pixelate";
pub const DEPTH_OF_FIELD: &str = "depth_of_field";
pub const BLIT: &str = "blit";

pub const ALL: [&str; 21] = [
    FORWARD_LIT,
    FORWARD_SINGLE_PASS,
    SHADOW_DEPTH,
    SKYBOX,
    DEBUG_PROPERTY,
    GBUFFER,
    DECAL,
    SSAO,
    DEFERRED_AMBIENT,
    DEFERRED_DIRECTIONAL,
    DEFERRED_LOCAL,
    DEBUG_GBUFFER,
    DEBUG_TEXTURE,
    PROBE,
    TONEMAP,
    GAMMA,
    MOTION_BLUR,
    BLUR,
    PIXELATE,
    DEPTH_OF_FIELD,
    BLIT,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique() {
        let unique: HashSet<_> = ALL.iter().collect();
        assert_eq!(unique.len(), ALL.len());
    }
}
