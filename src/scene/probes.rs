use glam::{UVec3, Vec3};
use serde_json::Value;

use super::json;
use crate::renderer::device::TargetId;
use crate::renderer::sh::SphericalHarmonics;

#[derive(Debug, Clone, PartialEq)]
pub struct IrradianceProbe {
    pub coord: UVec3,
    pub index: usize,
    pub position: Vec3,
    /// Visualisation radius only.
    pub size: f32,
    pub sh: SphericalHarmonics,
}

/// Upper bound on probes in one grid.
pub const MAX_GRID_PROBES: usize = 65_536;

/// Probe count of a grid with `dims`, or `None` when the product overflows
/// or exceeds [`MAX_GRID_PROBES`].
pub fn grid_probe_count(dims: UVec3) -> Option<usize> {
    dims.x
        .checked_mul(dims.y)
        .and_then(|xy| xy.checked_mul(dims.z))
        .map(|count| count as usize)
        .filter(|&count| count <= MAX_GRID_PROBES)
}

/// Regular 3D grid of irradiance probes spanning `start..=end`.
#[derive(Debug, Clone, PartialEq)]
pub struct IrradianceGrid {
    start: Vec3,
    end: Vec3,
    dims: UVec3,
    delta: Vec3,
    probe_size: f32,
    probes: Vec<IrradianceProbe>,
}

impl Default for IrradianceGrid {
    fn default() -> Self {
        Self::new(Vec3::splat(-50.0), Vec3::splat(50.0), UVec3::splat(4))
    }
}

impl IrradianceGrid {
    pub fn new(start: Vec3, end: Vec3, dims: UVec3) -> Self {
        let mut grid = Self {
            start,
            end,
            dims: UVec3::ONE,
            delta: Vec3::ZERO,
            probe_size: 2.0,
            probes: Vec::new(),
        };
        grid.set_grid(start, end, dims);
        grid
    }

    /// Change the grid span or resolution. Rebuilds every probe, discarding
    /// baked lighting. A resolution above [`MAX_GRID_PROBES`] keeps the
    /// current one.
    pub fn set_grid(&mut self, start: Vec3, end: Vec3, dims: UVec3) {
        let dims = dims.max(UVec3::ONE);
        let dims = if grid_probe_count(dims).is_some() {
            dims
        } else {
            log::warn!(
                "Irradiance grid {}x{}x{} exceeds {} probes, keeping {}x{}x{}",
                dims.x,
                dims.y,
                dims.z,
                MAX_GRID_PROBES,
                self.dims.x,
                self.dims.y,
                self.dims.z
            );
            self.dims
        };
        self.start = start;
        self.end = end;
        self.dims = dims;
        self.delta = grid_delta(start, end, self.dims);
        self.place_probes();
    }

    pub fn set_probe_size(&mut self, size: f32) {
        self.probe_size = size;
        for probe in &mut self.probes {
            probe.size = size;
        }
    }

    fn place_probes(&mut self) {
        let count = grid_probe_count(self.dims).unwrap_or(0);
        self.probes.clear();
        self.probes.reserve(count);

        for z in 0..self.dims.z {
            for y in 0..self.dims.y {
                for x in 0..self.dims.x {
                    let coord = UVec3::new(x, y, z);
                    self.probes.push(IrradianceProbe {
                        coord,
                        index: self.probe_index(coord),
                        position: self.start + self.delta * coord.as_vec3(),
                        size: self.probe_size,
                        sh: SphericalHarmonics::zero(),
                    });
                }
            }
        }
    }

    /// Linear index: x fastest, then y, then z.
    pub fn probe_index(&self, coord: UVec3) -> usize {
        (coord.x + coord.y * self.dims.x + coord.z * self.dims.x * self.dims.y) as usize
    }

    pub fn start(&self) -> Vec3 {
        self.start
    }

    pub fn end(&self) -> Vec3 {
        self.end
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    pub fn delta(&self) -> Vec3 {
        self.delta
    }

    pub fn probe_size(&self) -> f32 {
        self.probe_size
    }

    pub fn probes(&self) -> &[IrradianceProbe] {
        &self.probes
    }

    pub fn probes_mut(&mut self) -> &mut [IrradianceProbe] {
        &mut self.probes
    }

    /// Swap in a fully decoded probe set (cache load). Callers validate first.
    pub(crate) fn replace(
        &mut self,
        start: Vec3,
        end: Vec3,
        delta: Vec3,
        dims: UVec3,
        probes: Vec<IrradianceProbe>,
    ) {
        self.start = start;
        self.end = end;
        self.delta = delta;
        self.dims = dims.max(UVec3::ONE);
        if let Some(first) = probes.first() {
            self.probe_size = first.size;
        }
        self.probes = probes;
    }

    pub fn configure(&mut self, block: &Value) {
        let start = json::vec3(block, "start_position").unwrap_or(self.start);
        let end = json::vec3(block, "end_position").unwrap_or(self.end);
        let dims = json::vec3(block, "dimensions")
            .map(|d| d.max(Vec3::ONE).round().as_uvec3())
            .unwrap_or(self.dims);
        if let Some(size) = json::f32(block, "size") {
            self.probe_size = size;
        }
        self.set_grid(start, end, dims);
    }

    pub fn describe(&self) -> String {
        format!(
            "Irradiance grid {}x{}x{} ({} probes) from ({:.1}, {:.1}, {:.1}) to ({:.1}, {:.1}, {:.1})",
            self.dims.x,
            self.dims.y,
            self.dims.z,
            self.probes.len(),
            self.start.x,
            self.start.y,
            self.start.z,
            self.end.x,
            self.end.y,
            self.end.z
        )
    }
}

/// Per-axis spacing; an axis with a single probe has zero spacing.
pub fn grid_delta(start: Vec3, end: Vec3, dims: UVec3) -> Vec3 {
    let steps = (dims.max(UVec3::ONE) - UVec3::ONE).as_vec3();
    let span = end - start;
    Vec3::new(
        if steps.x > 0.0 { span.x / steps.x } else { 0.0 },
        if steps.y > 0.0 { span.y / steps.y } else { 0.0 },
        if steps.z > 0.0 { span.z / steps.z } else { 0.0 },
    )
}

/// Point with a captured specular environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionProbe {
    pub size: f32,
    pub(crate) cubemap: Option<TargetId>,
}

impl Default for ReflectionProbe {
    fn default() -> Self {
        Self {
            size: 10.0,
            cubemap: None,
        }
    }
}

impl ReflectionProbe {
    pub fn new(size: f32) -> Self {
        Self {
            size,
            cubemap: None,
        }
    }

    pub fn cubemap(&self) -> Option<TargetId> {
        self.cubemap
    }

    pub fn configure(&mut self, block: &Value) {
        if let Some(size) = json::f32(block, "size") {
            self.size = size;
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "Reflection probe, radius {:.1}, {}",
            self.size,
            if self.cubemap.is_some() {
                "captured"
            } else {
                "not captured"
            }
        )
    }
}

/// Index of the probe closest to `point`; the first one wins ties.
pub fn nearest_probe(probes: &[Vec3], point: Vec3) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, probe) in probes.iter().enumerate() {
        let distance = probe.distance(point);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((index, distance)),
        }
    }
    best.map(|(index, _)| index)
}
