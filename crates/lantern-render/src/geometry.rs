//! Procedural mesh generators.
//!
//! All generators emit the same three-stream layout: positions, normals,
//! texture coordinates. Index width is chosen per mesh; anything over
//! 16-bit range switches to 32-bit indices.

use glam::Vec3;

use crate::resources::{IndexData, MeshData, VertexStream};

fn index_data(indices: Vec<u32>, vertex_count: u32) -> IndexData {
    if vertex_count as usize <= usize::from(u16::MAX) + 1 {
        IndexData::U16(indices.into_iter().map(|i| i as u16).collect())
    } else {
        IndexData::U32(indices)
    }
}

fn assemble(
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    indices: Vec<u32>,
) -> MeshData {
    let vertex_count = positions.len() as u32;
    MeshData {
        indices: index_data(indices, vertex_count),
        vertex_count,
        streams: vec![
            VertexStream::from_slice(&positions),
            VertexStream::from_slice(&normals),
            VertexStream::from_slice(&uvs),
        ],
    }
}

/// Axis-aligned cube centered at the origin, four vertices per face.
pub fn cube(size: f32) -> MeshData {
    let h = size * 0.5;

    // Per face: normal, then corners wound counter-clockwise seen from
    // outside.
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        (
            [1.0, 0.0, 0.0],
            [[h, -h, h], [h, -h, -h], [h, h, -h], [h, h, h]],
        ),
        (
            [-1.0, 0.0, 0.0],
            [[-h, -h, -h], [-h, -h, h], [-h, h, h], [-h, h, -h]],
        ),
        (
            [0.0, 1.0, 0.0],
            [[-h, h, h], [h, h, h], [h, h, -h], [-h, h, -h]],
        ),
        (
            [0.0, -1.0, 0.0],
            [[-h, -h, -h], [h, -h, -h], [h, -h, h], [-h, -h, h]],
        ),
        (
            [0.0, 0.0, 1.0],
            [[-h, -h, h], [h, -h, h], [h, h, h], [-h, h, h]],
        ),
        (
            [0.0, 0.0, -1.0],
            [[h, -h, -h], [-h, -h, -h], [-h, h, -h], [h, h, -h]],
        ),
    ];

    let mut positions = Vec::with_capacity(24);
    let mut normals = Vec::with_capacity(24);
    let mut uvs = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, corners) in faces {
        let base = positions.len() as u32;
        positions.extend_from_slice(&corners);
        normals.extend_from_slice(&[normal; 4]);
        uvs.extend_from_slice(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
        indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    assemble(positions, normals, uvs, indices)
}

/// Flat grid in the XZ plane, normal up, texture coordinates tiled once
/// per grid cell.
pub fn plane(extent: f32, segments: u32) -> MeshData {
    let segments = segments.max(1);
    let verts_per_side = segments + 1;
    let step = extent / segments as f32;
    let half = extent * 0.5;

    let mut positions = Vec::with_capacity((verts_per_side * verts_per_side) as usize);
    let mut normals = Vec::with_capacity(positions.capacity());
    let mut uvs = Vec::with_capacity(positions.capacity());

    for z in 0..verts_per_side {
        for x in 0..verts_per_side {
            positions.push([-half + x as f32 * step, 0.0, -half + z as f32 * step]);
            normals.push([0.0, 1.0, 0.0]);
            uvs.push([x as f32, z as f32]);
        }
    }

    let mut indices = Vec::with_capacity((segments * segments * 6) as usize);
    for z in 0..segments {
        for x in 0..segments {
            let a = z * verts_per_side + x;
            let b = a + 1;
            let c = a + verts_per_side;
            let d = c + 1;
            indices.extend([a, c, d, a, d, b]);
        }
    }

    assemble(positions, normals, uvs, indices)
}

/// Sphere used as the sky backdrop: faces point inward, normals point at
/// the viewer.
pub fn sky_dome(radius: f32, rings: u32, segments: u32) -> MeshData {
    let rings = rings.max(2);
    let segments = segments.max(3);

    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();

    for ring in 0..=rings {
        let v = ring as f32 / rings as f32;
        let polar = v * std::f32::consts::PI;
        let (sin_polar, cos_polar) = polar.sin_cos();

        for segment in 0..=segments {
            let u = segment as f32 / segments as f32;
            let azimuth = u * std::f32::consts::TAU;
            let (sin_azimuth, cos_azimuth) = azimuth.sin_cos();

            let dir = Vec3::new(sin_polar * cos_azimuth, cos_polar, sin_polar * sin_azimuth);
            positions.push((dir * radius).to_array());
            normals.push((-dir).to_array());
            uvs.push([u, v]);
        }
    }

    let stride = segments + 1;
    let mut indices = Vec::with_capacity((rings * segments * 6) as usize);
    for ring in 0..rings {
        for segment in 0..segments {
            let a = ring * stride + segment;
            let b = a + 1;
            let c = a + stride;
            let d = c + 1;
            // Inward winding: reversed relative to an outward-facing
            // sphere.
            indices.extend([a, b, d, a, d, c]);
        }
    }

    assemble(positions, normals, uvs, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_counts_and_stream_layout() {
        let mesh = cube(1.0);
        assert_eq!(mesh.vertex_count, 24);
        assert_eq!(mesh.indices.count(), 36);
        assert_eq!(mesh.streams.len(), 3);
        assert_eq!(mesh.streams[0].stride, 12);
        assert_eq!(mesh.streams[1].stride, 12);
        assert_eq!(mesh.streams[2].stride, 8);

        let layout = mesh.layout().unwrap();
        assert_eq!(layout.index_region().offset, 0);
        assert_eq!(layout.index_region().size, 36 * 2);
        assert_eq!(layout.stream_region(0).offset, 72);
        assert_eq!(layout.stream_region(0).size, 24 * 12);
        assert_eq!(layout.stream_region(2).size, 24 * 8);
    }

    #[test]
    fn cube_normals_are_axis_aligned() {
        let mesh = cube(2.0);
        let normals: &[[f32; 3]] = bytemuck::cast_slice(&mesh.streams[1].data);

        for normal in normals {
            let ones = normal.iter().filter(|c| c.abs() == 1.0).count();
            let zeros = normal.iter().filter(|&&c| c == 0.0).count();
            assert_eq!((ones, zeros), (1, 2), "normal {normal:?}");
        }
    }

    #[test]
    fn plane_grid_counts() {
        let mesh = plane(10.0, 4);
        assert_eq!(mesh.vertex_count, 25);
        assert_eq!(mesh.indices.count(), 96);
    }

    #[test]
    fn large_plane_switches_to_wide_indices() {
        let small = plane(1.0, 4);
        assert!(matches!(small.indices, IndexData::U16(_)));

        let large = plane(1.0, 256);
        assert_eq!(large.vertex_count, 257 * 257);
        assert!(matches!(large.indices, IndexData::U32(_)));
    }

    #[test]
    fn dome_counts() {
        let mesh = sky_dome(50.0, 2, 4);
        assert_eq!(mesh.vertex_count, 3 * 5);
        assert_eq!(mesh.indices.count(), 48);
    }

    #[test]
    fn dome_normals_point_inward() {
        let mesh = sky_dome(10.0, 4, 8);
        let positions: &[[f32; 3]] = bytemuck::cast_slice(&mesh.streams[0].data);
        let normals: &[[f32; 3]] = bytemuck::cast_slice(&mesh.streams[1].data);

        for (position, normal) in positions.iter().zip(normals) {
            let p = Vec3::from_array(*position);
            let n = Vec3::from_array(*normal);
            assert!(p.dot(n) < 0.0, "normal {n:?} at {p:?} faces outward");
        }
    }
}
