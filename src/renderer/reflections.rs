use glam::Vec3;

use crate::error::RenderResult;
use crate::renderer::cubemap::CubeFace;
use crate::renderer::device::{mip_level_count, Extent, PassTarget, TargetDesc, TargetId, TextureFormat};
use crate::renderer::forward::{render_forward, ForwardSettings};
use crate::renderer::frame::{FrameContext, FrameLight, RenderView};
use crate::renderer::irradiance::IrradianceBinding;
use crate::renderer::render_calls::{RenderCall, RenderCondition};

pub(crate) fn cubemap_desc(size: u32) -> TargetDesc {
    let extent = Extent::new(size, size);
    TargetDesc::color("reflection probe", extent, TextureFormat::Rgba16Float)
        .with_depth()
        .cube(mip_level_count(extent))
}

/// Render the six faces of one probe into a new cube target and build its
/// mip chain. The caller owns the returned target.
pub(crate) fn capture_probe(
    ctx: &mut FrameContext<'_>,
    position: Vec3,
    size: u32,
    calls: &[RenderCall],
    lights: &[FrameLight],
    irradiance: Option<IrradianceBinding>,
) -> RenderResult<TargetId> {
    let cubemap = ctx.device.create_target(&cubemap_desc(size))?;
    let background = ctx.scene.background_color.extend(1.0).to_array();
    let settings = ForwardSettings {
        lights,
        mode: ctx.config.lighting,
        condition: RenderCondition::NoAlpha,
        debug_property: None,
        ambient: ctx.scene.ambient_light,
        irradiance,
    };

    for face in CubeFace::ALL {
        let view = RenderView::cube_face(
            face,
            position,
            ctx.config.probe_near,
            ctx.config.probe_far,
            Extent::new(size, size),
        );
        render_forward(
            ctx,
            "reflection capture",
            PassTarget::Offscreen {
                target: cubemap,
                face: face.layer(),
            },
            Some(background),
            &view,
            calls,
            &settings,
        );
    }
    ctx.device.generate_mipmaps(cubemap);
    Ok(cubemap)
}
