//! WGSL sources of the builtin programs.
//!
//! Every program is the shared declarations, optionally the shading library,
//! then its own entry points.

use crate::renderer::programs;

const COMMON: &str = include_str!("../../shader/common.wgsl");
const LIGHTING: &str = include_str!("../../shader/lighting.wgsl");

/// Program body and whether it needs the shading library.
fn program_body(name: &str) -> Option<(&'static str, bool)> {
    let body = match name {
        programs::FORWARD_LIT => (include_str!("../../shader/forward_lit.wgsl"), true),
        programs::FORWARD_SINGLE_PASS => {
            (include_str!("../../shader/forward_single_pass.wgsl"), true)
        }
        programs::SHADOW_DEPTH => (include_str!("../../shader/shadow_depth.wgsl"), false),
        programs::SKYBOX => (include_str!("../../shader/skybox.wgsl"), false),
        programs::DEBUG_PROPERTY => (include_str!("../../shader/debug_property.wgsl"), true),
        programs::GBUFFER => (include_str!("../../shader/gbuffer.wgsl"), true),
        programs::DECAL => (include_str!("../../shader/decal.wgsl"), false),
        programs::SSAO => (include_str!("../../shader/ssao.wgsl"), false),
        programs::DEFERRED_AMBIENT => (include_str!("../../shader/deferred_ambient.wgsl"), true),
        programs::DEFERRED_DIRECTIONAL => {
            (include_str!("../../shader/deferred_directional.wgsl"), true)
        }
        programs::DEFERRED_LOCAL => (include_str!("../../shader/deferred_local.wgsl"), true),
        programs::DEBUG_GBUFFER => (include_str!("../../shader/debug_gbuffer.wgsl"), true),
        programs::DEBUG_TEXTURE => (include_str!("../../shader/debug_texture.wgsl"), false),
        programs::PROBE => (include_str!("../../shader/probe.wgsl"), true),
        programs::TONEMAP => (include_str!("../../shader/tonemap.wgsl"), false),
        programs::GAMMA => (include_str!("../../shader/gamma.wgsl"), false),
        programs::MOTION_BLUR => (include_str!("../../shader/motion_blur.wgsl"), false),
        programs::BLUR => (include_str!("../../shader/blur.wgsl"), false),
        programs::PIXELATE => (include_str!("../../shader/pixelate.wgsl"), false),
        programs::DEPTH_OF_FIELD => (include_str!("../../shader/depth_of_field.wgsl"), false),
        programs::BLIT => (include_str!("../../shader/blit.wgsl"), false),
        _ => return None,
    };
    Some(body)
}

/// Complete WGSL for the builtin program `name`.
pub fn builtin_source(name: &str) -> Option<String> {
    let (body, lighting) = program_body(name)?;
    Some(if lighting {
        format!("{COMMON}\n{LIGHTING}\n{body}")
    } else {
        format!("{COMMON}\n{body}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_program_has_both_entry_points() {
        for name in programs::ALL {
            let source = builtin_source(name).unwrap_or_else(|| panic!("no source for {name}"));
            assert!(source.contains("fn vs_main"), "{name} lacks vs_main");
            assert!(source.contains("fn fs_main"), "{name} lacks fs_main");
        }
    }

    #[test]
    fn shading_library_is_included_once() {
        let source = builtin_source(programs::FORWARD_LIT).unwrap();
        assert_eq!(source.matches("fn shade_light(").count(), 1);
        let blit = builtin_source(programs::BLIT).unwrap();
        assert!(!blit.contains("fn shade_light("));
        assert!(blit.contains("var<uniform> params: ShaderParams"));
    }

    #[test]
    fn unknown_names_have_no_source() {
        assert!(builtin_source("not_a_program").is_none());
    }

    #[test]
    fn parameter_block_matches_the_uniform_size() {
        // Every member is a vec4 or mat4, so the WGSL struct is tightly packed
        let light_members = 5 * 16 + 64;
        let vec4_members = 12;
        let mat4_members = 4;
        let expected = mat4_members * 64
            + vec4_members * 16
            + (1 + crate::renderer::uniforms::MAX_SINGLE_PASS_LIGHTS) * light_members;
        assert_eq!(
            std::mem::size_of::<crate::renderer::uniforms::ShaderParams>(),
            expected
        );
        let source = builtin_source(programs::BLIT).unwrap();
        let lights = format!(
            "lights: array<LightParams, {}>",
            crate::renderer::uniforms::MAX_SINGLE_PASS_LIGHTS
        );
        assert!(source.contains(&lights));
    }
}
