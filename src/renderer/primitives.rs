use glam::{Vec2, Vec3};
use std::f32::consts::PI;

use super::vertex::Vertex;

/// Unit sphere, used for light proxies and probe visualisation.
pub fn sphere_mesh(segments: u32, rings: u32) -> (Vec<Vertex>, Vec<u32>) {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
    let mut indices = Vec::with_capacity((segments * rings * 6) as usize);

    for ring in 0..=rings {
        let phi = PI * ring as f32 / rings as f32;
        let y = phi.cos();
        let ring_radius = phi.sin();

        for segment in 0..=segments {
            let theta = 2.0 * PI * segment as f32 / segments as f32;
            let x = ring_radius * theta.cos();
            let z = ring_radius * theta.sin();
            let point = Vec3::new(x, y, z);
            let uv = Vec2::new(segment as f32 / segments as f32, ring as f32 / rings as f32);
            vertices.push(Vertex::new(point, point, uv));
        }
    }

    // Counter-clockwise seen from outside
    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;

            indices.extend_from_slice(&[current, current + 1, next]);
            indices.extend_from_slice(&[current + 1, next + 1, next]);
        }
    }

    (vertices, indices)
}

/// Unit cube centred on the origin, used for decal volumes.
pub fn cube_mesh() -> (Vec<Vertex>, Vec<u32>) {
    // (normal, u axis, v axis)
    const FACES: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];
    const CORNERS: [(f32, f32, Vec2); 4] = [
        (-1.0, -1.0, Vec2::new(0.0, 1.0)),
        (1.0, -1.0, Vec2::new(1.0, 1.0)),
        (1.0, 1.0, Vec2::new(1.0, 0.0)),
        (-1.0, 1.0, Vec2::new(0.0, 0.0)),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, u_axis, v_axis) in FACES {
        let base = vertices.len() as u32;
        for (su, sv, uv) in CORNERS {
            let position = 0.5 * (normal + su * u_axis + sv * v_axis);
            vertices.push(Vertex::new(position, normal, uv));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    (vertices, indices)
}
