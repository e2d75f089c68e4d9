//! Immediate-mode overlay geometry.
//!
//! Collaborators hand over a list of batches each tick; they are repacked
//! into one combined mesh (single interleaved vertex stream, rebased u16
//! indices) that is uploaded like any other mesh and drawn span by span.

use ash::vk;
use lantern_gpu::error::{GpuError, Result};

use crate::resources::{IndexData, MeshData, VertexStream};

/// One overlay vertex: screen-space position, texture coordinates, color.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct OverlayVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: [u8; 4],
}

impl OverlayVertex {
    pub const STRIDE: u64 = std::mem::size_of::<Self>() as u64;
}

/// Vertex binding for the overlay pipeline.
pub fn vertex_binding() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription::default()
        .binding(0)
        .stride(OverlayVertex::STRIDE as u32)
        .input_rate(vk::VertexInputRate::VERTEX)
}

/// Vertex attributes for the overlay pipeline.
pub fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 3] {
    [
        vk::VertexInputAttributeDescription::default()
            .location(0)
            .binding(0)
            .format(vk::Format::R32G32_SFLOAT)
            .offset(std::mem::offset_of!(OverlayVertex, position) as u32),
        vk::VertexInputAttributeDescription::default()
            .location(1)
            .binding(0)
            .format(vk::Format::R32G32_SFLOAT)
            .offset(std::mem::offset_of!(OverlayVertex, uv) as u32),
        vk::VertexInputAttributeDescription::default()
            .location(2)
            .binding(0)
            .format(vk::Format::R8G8B8A8_UNORM)
            .offset(std::mem::offset_of!(OverlayVertex, color) as u32),
    ]
}

/// One draw batch: its own vertex and index lists, indices local to the
/// batch.
#[derive(Debug, Clone, Default)]
pub struct OverlayBatch {
    pub vertices: Vec<OverlayVertex>,
    pub indices: Vec<u16>,
}

/// Overlay content for one tick.
#[derive(Debug, Clone, Default)]
pub struct OverlayFrame {
    pub batches: Vec<OverlayBatch>,
}

impl OverlayFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new batch; subsequent quads land in it.
    pub fn begin_batch(&mut self) {
        self.batches.push(OverlayBatch::default());
    }

    /// Append an axis-aligned quad to the current batch.
    pub fn quad(&mut self, min: [f32; 2], max: [f32; 2], color: [u8; 4]) {
        if self.batches.is_empty() {
            self.begin_batch();
        }
        let batch = self.batches.last_mut().unwrap();

        let base = batch.vertices.len() as u16;
        let corners = [
            [min[0], min[1]],
            [max[0], min[1]],
            [max[0], max[1]],
            [min[0], max[1]],
        ];
        for (position, uv) in corners
            .into_iter()
            .zip([[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]])
        {
            batch.vertices.push(OverlayVertex {
                position,
                uv,
                color,
            });
        }
        batch
            .indices
            .extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Whether no batch holds any geometry.
    pub fn is_empty(&self) -> bool {
        self.batches.iter().all(|b| b.indices.is_empty())
    }
}

/// One draw call into the combined overlay mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawSpan {
    pub first_index: u32,
    pub index_count: u32,
}

/// The combined per-tick overlay mesh and the spans to draw it with.
#[derive(Debug, Clone)]
pub struct OverlayGeometry {
    pub mesh: MeshData,
    pub spans: Vec<DrawSpan>,
}

/// Repack a frame's batches into one combined mesh.
///
/// Batch-local indices are rebased onto the combined vertex list; each
/// batch becomes one draw span. Returns `None` for an empty frame.
pub fn pack_overlay(frame: &OverlayFrame) -> Result<Option<OverlayGeometry>> {
    if frame.is_empty() {
        return Ok(None);
    }

    let mut vertices: Vec<OverlayVertex> = Vec::new();
    let mut indices: Vec<u16> = Vec::new();
    let mut spans = Vec::with_capacity(frame.batches.len());

    for batch in &frame.batches {
        if batch.indices.is_empty() {
            continue;
        }

        let base = vertices.len();
        if base + batch.vertices.len() > usize::from(u16::MAX) + 1 {
            return Err(GpuError::InvalidState(format!(
                "Overlay vertex count {} exceeds 16-bit indexing",
                base + batch.vertices.len()
            )));
        }

        spans.push(DrawSpan {
            first_index: indices.len() as u32,
            index_count: batch.indices.len() as u32,
        });

        let base = base as u16;
        indices.extend(batch.indices.iter().map(|&i| i + base));
        vertices.extend_from_slice(&batch.vertices);
    }

    let mesh = MeshData {
        indices: IndexData::U16(indices),
        vertex_count: vertices.len() as u32,
        streams: vec![VertexStream::from_slice(&vertices)],
    };

    Ok(Some(OverlayGeometry { mesh, spans }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_emits_two_triangles() {
        let mut frame = OverlayFrame::new();
        frame.quad([0.0, 0.0], [10.0, 10.0], [255, 0, 0, 255]);

        let batch = &frame.batches[0];
        assert_eq!(batch.vertices.len(), 4);
        assert_eq!(batch.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn pack_rebases_indices_across_batches() {
        let mut frame = OverlayFrame::new();
        frame.quad([0.0, 0.0], [1.0, 1.0], [255, 255, 255, 255]);
        frame.begin_batch();
        frame.quad([2.0, 2.0], [3.0, 3.0], [0, 255, 0, 255]);

        let packed = pack_overlay(&frame).unwrap().unwrap();

        assert_eq!(packed.mesh.vertex_count, 8);
        assert_eq!(packed.mesh.indices.count(), 12);
        assert_eq!(
            packed.spans,
            vec![
                DrawSpan {
                    first_index: 0,
                    index_count: 6
                },
                DrawSpan {
                    first_index: 6,
                    index_count: 6
                },
            ]
        );

        match &packed.mesh.indices {
            IndexData::U16(indices) => {
                assert_eq!(&indices[6..], &[4, 5, 6, 4, 6, 7]);
            }
            IndexData::U32(_) => panic!("overlay indices should be 16-bit"),
        }
    }

    #[test]
    fn packed_mesh_layout_is_index_prefixed() {
        let mut frame = OverlayFrame::new();
        frame.quad([0.0, 0.0], [1.0, 1.0], [255, 255, 255, 255]);

        let packed = pack_overlay(&frame).unwrap().unwrap();
        let layout = packed.mesh.layout().unwrap();

        assert_eq!(layout.index_region().offset, 0);
        assert_eq!(layout.index_region().size, 6 * 2);
        assert_eq!(layout.stream_region(0).offset, 12);
        assert_eq!(layout.stream_region(0).size, 4 * OverlayVertex::STRIDE);
    }

    #[test]
    fn empty_frame_packs_to_none() {
        let frame = OverlayFrame::new();
        assert!(pack_overlay(&frame).unwrap().is_none());

        let mut with_empty_batch = OverlayFrame::new();
        with_empty_batch.begin_batch();
        assert!(pack_overlay(&with_empty_batch).unwrap().is_none());
    }

    #[test]
    fn pack_rejects_vertex_overflow() {
        let mut frame = OverlayFrame::new();
        let batch = OverlayBatch {
            vertices: vec![
                OverlayVertex {
                    position: [0.0, 0.0],
                    uv: [0.0, 0.0],
                    color: [0, 0, 0, 0],
                };
                usize::from(u16::MAX) + 2
            ],
            indices: vec![0, 1, 2],
        };
        frame.batches.push(batch);

        assert!(pack_overlay(&frame).is_err());
    }
}
