//! Packed buffer layout computation.
//!
//! Meshes and overlay geometry live in single buffers holding an index
//! prefix followed by one region per vertex stream. The builder computes
//! the byte ranges up front so every consumer (staging writes, copy
//! commands, vertex binding) reads offsets from one place instead of
//! repeating pointer arithmetic.

use ash::vk;
use lantern_gpu::error::{GpuError, Result};

/// A byte range inside a packed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub offset: u64,
    pub size: u64,
}

impl Region {
    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// An ordered set of non-overlapping byte regions.
#[derive(Debug, Clone)]
pub struct PackedLayout {
    regions: Vec<Region>,
    total_size: u64,
}

impl PackedLayout {
    /// Start building a layout.
    pub fn builder() -> PackedLayoutBuilder {
        PackedLayoutBuilder {
            regions: Vec::new(),
            cursor: 0,
            align: 1,
        }
    }

    /// Get a region by insertion order.
    pub fn region(&self, index: usize) -> Region {
        self.regions[index]
    }

    /// Number of regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the layout holds no regions.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Total byte size covering all regions.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }
}

/// Builder accumulating (count, element size) regions.
pub struct PackedLayoutBuilder {
    regions: Vec<Region>,
    cursor: u64,
    align: u64,
}

impl PackedLayoutBuilder {
    /// Align the start of every subsequent region to `align` bytes.
    pub fn align_to(mut self, align: u64) -> Self {
        debug_assert!(align.is_power_of_two());
        self.align = align;
        self
    }

    /// Append a region of `count` elements of `elem_size` bytes each.
    pub fn region(mut self, count: u64, elem_size: u64) -> Result<Self> {
        let size = count
            .checked_mul(elem_size)
            .ok_or_else(|| GpuError::InvalidState("Region size overflow".to_string()))?;

        let offset = align_up(self.cursor, self.align)
            .ok_or_else(|| GpuError::InvalidState("Region offset overflow".to_string()))?;

        let end = offset
            .checked_add(size)
            .ok_or_else(|| GpuError::InvalidState("Region end overflow".to_string()))?;

        self.regions.push(Region { offset, size });
        self.cursor = end;
        Ok(self)
    }

    /// Finish the layout.
    pub fn build(self) -> PackedLayout {
        PackedLayout {
            regions: self.regions,
            total_size: self.cursor,
        }
    }
}

fn align_up(value: u64, align: u64) -> Option<u64> {
    let mask = align - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

/// Byte layout of a packed mesh buffer: indices first, then one region
/// per vertex stream, all vertex streams holding `vertex_count` elements.
#[derive(Debug, Clone)]
pub struct MeshLayout {
    layout: PackedLayout,
    index_count: u32,
    index_type: vk::IndexType,
    vertex_count: u32,
}

impl MeshLayout {
    /// Compute the layout for a mesh.
    ///
    /// `stream_strides` gives the per-vertex byte size of each vertex
    /// stream in binding order.
    pub fn new(
        index_count: u32,
        index_type: vk::IndexType,
        vertex_count: u32,
        stream_strides: &[u64],
    ) -> Result<Self> {
        let index_size = index_type_size(index_type)?;

        let mut builder = PackedLayout::builder().region(u64::from(index_count), index_size)?;
        for &stride in stream_strides {
            builder = builder.region(u64::from(vertex_count), stride)?;
        }

        Ok(Self {
            layout: builder.build(),
            index_count,
            index_type,
            vertex_count,
        })
    }

    /// The index prefix region.
    pub fn index_region(&self) -> Region {
        self.layout.region(0)
    }

    /// A vertex stream region by stream order.
    pub fn stream_region(&self, stream: usize) -> Region {
        self.layout.region(stream + 1)
    }

    /// Number of vertex streams.
    pub fn stream_count(&self) -> usize {
        self.layout.len() - 1
    }

    /// Total byte size of the packed buffer.
    pub fn total_size(&self) -> u64 {
        self.layout.total_size()
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn index_type(&self) -> vk::IndexType {
        self.index_type
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

fn index_type_size(index_type: vk::IndexType) -> Result<u64> {
    match index_type {
        vk::IndexType::UINT16 => Ok(2),
        vk::IndexType::UINT32 => Ok(4),
        other => Err(GpuError::InvalidState(format!(
            "Unsupported index type {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_are_contiguous_and_disjoint() {
        let layout = PackedLayout::builder()
            .region(6, 2)
            .unwrap()
            .region(4, 12)
            .unwrap()
            .region(4, 8)
            .unwrap()
            .build();

        assert_eq!(layout.len(), 3);
        assert_eq!(layout.region(0), Region { offset: 0, size: 12 });
        assert_eq!(layout.region(1), Region { offset: 12, size: 48 });
        assert_eq!(layout.region(2), Region { offset: 60, size: 32 });
        assert_eq!(layout.total_size(), 92);

        for i in 1..layout.len() {
            assert!(layout.region(i).offset >= layout.region(i - 1).end());
        }
    }

    #[test]
    fn aligned_regions_pad_between() {
        let layout = PackedLayout::builder()
            .align_to(4)
            .region(3, 2)
            .unwrap()
            .region(2, 4)
            .unwrap()
            .build();

        // 6 bytes of indices, next region starts at the aligned offset 8
        assert_eq!(layout.region(0), Region { offset: 0, size: 6 });
        assert_eq!(layout.region(1), Region { offset: 8, size: 8 });
    }

    #[test]
    fn region_size_overflow_is_rejected() {
        let result = PackedLayout::builder().region(u64::MAX, 16);
        assert!(result.is_err());
    }

    #[test]
    fn mesh_layout_puts_indices_first() {
        // Two triangles over four vertices: positions, normals, uvs
        let layout = MeshLayout::new(6, vk::IndexType::UINT16, 4, &[12, 12, 8]).unwrap();

        assert_eq!(layout.index_region(), Region { offset: 0, size: 12 });
        assert_eq!(layout.stream_region(0), Region { offset: 12, size: 48 });
        assert_eq!(layout.stream_region(1), Region { offset: 60, size: 48 });
        assert_eq!(layout.stream_region(2), Region { offset: 108, size: 32 });
        assert_eq!(layout.total_size(), 140);
        assert_eq!(layout.stream_count(), 3);
    }

    #[test]
    fn mesh_layout_u32_indices() {
        let layout = MeshLayout::new(3, vk::IndexType::UINT32, 3, &[12]).unwrap();
        assert_eq!(layout.index_region().size, 12);
        assert_eq!(layout.stream_region(0).offset, 12);
    }
}
