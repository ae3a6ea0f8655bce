//! Irradiance probe baking, the runtime lookup texture, and the on-disk cache.
//!
//! Cache layout (native byte order, no version field):
//!
//! ```text
//! header: start[3] f32, end[3] f32, delta[3] f32, dims[3] f32, probe_count i32
//! probe:  position[3] f32, coord[3] f32, index i32, size f32, sh[27] f32
//! ```

use std::fs;
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use glam::{UVec3, Vec3};

use crate::error::{RenderError, RenderResult};
use crate::renderer::cubemap::CubeFace;
use crate::renderer::device::{
    slots, Extent, PassTarget, TargetDesc, TargetId, TextureDesc, TextureFormat, TextureId,
    TextureRef,
};
use crate::renderer::forward::{render_forward, ForwardSettings};
use crate::renderer::frame::{FrameContext, FrameLight, RenderView};
use crate::renderer::render_calls::{RenderCall, RenderCondition};
use crate::renderer::sh::{SphericalHarmonics, SH_COEFFICIENTS};
use crate::renderer::uniforms::ShaderParams;
use crate::scene::probes::{grid_probe_count, MAX_GRID_PROBES};
use crate::scene::{IrradianceGrid, IrradianceProbe};

/// Texels per lookup row: one per SH coefficient.
pub const LOOKUP_WIDTH: u32 = SH_COEFFICIENTS as u32;

/// Grid placement plus the lookup texture, as the lighting programs read them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrradianceBinding {
    pub texture: TextureId,
    pub start: Vec3,
    pub delta: Vec3,
    pub dims: UVec3,
    pub probe_count: u32,
}

impl IrradianceBinding {
    pub fn new(texture: TextureId, grid: &IrradianceGrid) -> Self {
        Self {
            texture,
            start: grid.start(),
            delta: grid.delta(),
            dims: grid.dims(),
            probe_count: grid.probes().len() as u32,
        }
    }

    pub fn apply(&self, params: &mut ShaderParams) {
        params.irradiance_start = self.start.extend(1.0).to_array();
        params.irradiance_delta = self.delta.extend(self.probe_count as f32).to_array();
        params.irradiance_dims = self.dims.as_vec3().extend(0.0).to_array();
    }

    pub fn slot(&self) -> (u32, TextureRef) {
        (slots::DATA, TextureRef::Texture(self.texture))
    }
}

/// One row per probe, nine RGB texels per row.
pub fn lookup_texels(probes: &[IrradianceProbe]) -> Vec<[f32; 4]> {
    probes
        .iter()
        .flat_map(|probe| probe.sh.coeffs.map(|c| c.extend(0.0).to_array()))
        .collect()
}

pub fn lookup_desc(probe_count: usize) -> TextureDesc {
    TextureDesc {
        label: "irradiance lookup",
        size: Extent::new(LOOKUP_WIDTH, probe_count.max(1) as u32),
        format: TextureFormat::Rgba32Float,
        cube: false,
    }
}

/// Texture contents for `probes`; an empty grid yields one black row.
pub fn lookup_bytes(probes: &[IrradianceProbe]) -> Vec<u8> {
    let mut texels = lookup_texels(probes);
    if texels.is_empty() {
        texels = vec![[0.0; 4]; LOOKUP_WIDTH as usize];
    }
    bytemuck::cast_slice(&texels).to_vec()
}

/// Capture the scene around each position and project it onto SH.
///
/// `capture` must be a flat `size` x `size` float target with depth.
pub(crate) fn bake_probes(
    ctx: &mut FrameContext<'_>,
    capture: TargetId,
    size: u32,
    positions: &[Vec3],
    calls: &[RenderCall],
    lights: &[FrameLight],
) -> RenderResult<Vec<SphericalHarmonics>> {
    let background = ctx.scene.background_color.extend(1.0).to_array();
    let settings = ForwardSettings {
        lights,
        mode: ctx.config.lighting,
        condition: RenderCondition::NoAlpha,
        debug_property: None,
        ambient: ctx.scene.ambient_light,
        irradiance: None,
    };
    let extent = Extent::new(size, size);

    let mut results = Vec::with_capacity(positions.len());
    for (index, &position) in positions.iter().enumerate() {
        let mut faces = Vec::with_capacity(CubeFace::ALL.len());
        for face in CubeFace::ALL {
            let view = RenderView::cube_face(
                face,
                position,
                ctx.config.probe_near,
                ctx.config.probe_far,
                extent,
            );
            render_forward(
                ctx,
                "irradiance capture",
                PassTarget::offscreen(capture),
                Some(background),
                &view,
                calls,
                &settings,
            );
            faces.push(ctx.device.read_target(capture, 0)?);
        }
        let sh = SphericalHarmonics::from_cubemap(&faces, size).ok_or_else(|| {
            RenderError::Device(format!("probe {index} read back malformed faces"))
        })?;
        results.push(sh);
    }
    Ok(results)
}

pub(crate) fn capture_target_desc(size: u32) -> TargetDesc {
    TargetDesc::color(
        "irradiance capture",
        Extent::new(size, size),
        TextureFormat::Rgba32Float,
    )
    .with_depth()
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct CacheHeader {
    start: [f32; 3],
    end: [f32; 3],
    delta: [f32; 3],
    dims: [f32; 3],
    probe_count: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ProbeRecord {
    position: [f32; 3],
    coord: [f32; 3],
    index: i32,
    size: f32,
    sh: [f32; SH_COEFFICIENTS * 3],
}

const HEADER_BYTES: usize = std::mem::size_of::<CacheHeader>();
const RECORD_BYTES: usize = std::mem::size_of::<ProbeRecord>();

pub fn encode_cache(grid: &IrradianceGrid) -> Vec<u8> {
    let header = CacheHeader {
        start: grid.start().to_array(),
        end: grid.end().to_array(),
        delta: grid.delta().to_array(),
        dims: grid.dims().as_vec3().to_array(),
        probe_count: grid.probes().len() as i32,
    };
    let mut bytes = Vec::with_capacity(HEADER_BYTES + RECORD_BYTES * grid.probes().len());
    bytes.extend_from_slice(bytemuck::bytes_of(&header));
    for probe in grid.probes() {
        let record = ProbeRecord {
            position: probe.position.to_array(),
            coord: probe.coord.as_vec3().to_array(),
            index: probe.index as i32,
            size: probe.size,
            sh: probe.sh.to_array(),
        };
        bytes.extend_from_slice(bytemuck::bytes_of(&record));
    }
    bytes
}

/// Decode `bytes` into `grid`. Nothing is modified unless every record is
/// present and well formed.
pub fn decode_cache(grid: &mut IrradianceGrid, bytes: &[u8]) -> Result<(), String> {
    if bytes.len() < HEADER_BYTES {
        return Err(format!("{} bytes is shorter than the header", bytes.len()));
    }
    let header: CacheHeader = bytemuck::pod_read_unaligned(&bytes[..HEADER_BYTES]);
    let count = usize::try_from(header.probe_count)
        .map_err(|_| format!("negative probe count {}", header.probe_count))?;
    let expected = count
        .checked_mul(RECORD_BYTES)
        .and_then(|records| records.checked_add(HEADER_BYTES))
        .ok_or_else(|| format!("probe count {count} overflows"))?;
    if bytes.len() != expected {
        return Err(format!(
            "expected {} bytes for {} probes, found {}",
            expected,
            count,
            bytes.len()
        ));
    }

    let dims = Vec3::from_array(header.dims);
    if !dims.is_finite() || dims.min_element() < 1.0 {
        return Err(format!("invalid grid dimensions {:?}", header.dims));
    }
    let dims = dims.round().as_uvec3();
    let Some(capacity) = grid_probe_count(dims) else {
        return Err(format!(
            "grid {}x{}x{} exceeds {} probes",
            dims.x, dims.y, dims.z, MAX_GRID_PROBES
        ));
    };
    if capacity != count {
        return Err(format!(
            "grid {}x{}x{} does not hold {} probes",
            dims.x, dims.y, dims.z, count
        ));
    }

    let probes = bytes[HEADER_BYTES..]
        .chunks_exact(RECORD_BYTES)
        .map(|chunk| {
            let record: ProbeRecord = bytemuck::pod_read_unaligned(chunk);
            IrradianceProbe {
                coord: Vec3::from_array(record.coord).round().as_uvec3(),
                index: record.index.max(0) as usize,
                position: Vec3::from_array(record.position),
                size: record.size,
                sh: SphericalHarmonics::from_array(&record.sh),
            }
        })
        .collect();

    grid.replace(
        Vec3::from_array(header.start),
        Vec3::from_array(header.end),
        Vec3::from_array(header.delta),
        dims,
        probes,
    );
    Ok(())
}

pub fn save_cache(grid: &IrradianceGrid, path: &Path) -> RenderResult<()> {
    let io_error = |source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, encode_cache(grid)).map_err(io_error)?;
    log::info!(
        "Saved {} irradiance probes to {:?}",
        grid.probes().len(),
        path
    );
    Ok(())
}

/// Replace `grid` with the cached one. A missing or malformed file leaves
/// `grid` untouched.
pub fn load_cache(grid: &mut IrradianceGrid, path: &Path) -> RenderResult<()> {
    let bytes = fs::read(path).map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_cache(grid, &bytes).map_err(|reason| RenderError::MalformedCache {
        path: path.to_path_buf(),
        reason,
    })?;
    log::info!(
        "Loaded {} irradiance probes from {:?}",
        grid.probes().len(),
        path
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baked_grid() -> IrradianceGrid {
        let mut grid = IrradianceGrid::new(
            Vec3::new(-2.0, 0.0, -2.0),
            Vec3::new(2.0, 3.0, 2.0),
            UVec3::new(3, 2, 2),
        );
        for (i, probe) in grid.probes_mut().iter_mut().enumerate() {
            for (j, c) in probe.sh.coeffs.iter_mut().enumerate() {
                *c = Vec3::new(i as f32, j as f32, 0.5);
            }
        }
        grid
    }

    #[test]
    fn record_sizes_match_layout() {
        assert_eq!(HEADER_BYTES, 13 * 4);
        assert_eq!(RECORD_BYTES, 35 * 4);
        assert_eq!(encode_cache(&baked_grid()).len(), HEADER_BYTES + 12 * RECORD_BYTES);
    }

    #[test]
    fn truncated_cache_leaves_grid_untouched() {
        let source = baked_grid();
        let mut bytes = encode_cache(&source);
        bytes.truncate(bytes.len() - 4);

        let mut grid = IrradianceGrid::default();
        let before = grid.clone();
        assert!(decode_cache(&mut grid, &bytes).is_err());
        assert_eq!(grid, before);
        assert!(decode_cache(&mut grid, &bytes[..10]).is_err());
        assert_eq!(grid, before);
    }

    #[test]
    fn decoded_cache_restores_the_whole_grid() {
        let source = baked_grid();
        let mut grid = IrradianceGrid::new(Vec3::ZERO, Vec3::ONE, UVec3::new(2, 2, 2));
        decode_cache(&mut grid, &encode_cache(&source)).unwrap();
        assert_eq!(grid, source);
        assert_ne!(grid.probes()[0].sh, grid.probes()[11].sh);
    }

    #[test]
    fn oversized_dimensions_are_rejected() {
        let header = CacheHeader {
            start: [0.0; 3],
            end: [1.0; 3],
            delta: [0.0; 3],
            dims: [1.0e5; 3],
            probe_count: 0,
        };
        let bytes = bytemuck::bytes_of(&header).to_vec();
        assert_eq!(bytes.len(), 52);

        let mut grid = IrradianceGrid::default();
        let before = grid.clone();
        assert!(decode_cache(&mut grid, &bytes).is_err());
        assert_eq!(grid, before);

        let header = CacheHeader {
            dims: [f32::NAN, 1.0, 1.0],
            ..header
        };
        assert!(decode_cache(&mut grid, bytemuck::bytes_of(&header)).is_err());
        assert_eq!(grid, before);
    }

    #[test]
    fn lookup_rows_follow_probe_order() {
        let grid = baked_grid();
        let texels = lookup_texels(grid.probes());
        assert_eq!(texels.len(), 12 * 9);
        assert_eq!(texels[9 * 5 + 2], [5.0, 2.0, 0.5, 0.0]);
        assert_eq!(lookup_desc(12).size, Extent::new(9, 12));
        assert_eq!(lookup_bytes(&[]).len(), 9 * 16);
    }
}
