//! GPU resource primitives: const buffers, meshes, textures.
//!
//! Every resource follows the staging-then-copy discipline: the CPU writes
//! only the host-visible staging half, shaders read only the device-local
//! resident half, and a recorded copy command is the sole path between them.

use crate::layout::MeshLayout;
use ash::vk;
use lantern_gpu::error::{GpuError, Result};
use lantern_gpu::memory::{GpuAllocator, GpuBuffer, GpuImage};

/// Upper bound on buffer-to-image copy regions per texture.
pub const MAX_REGION_COUNT: usize = 16;

/// Number of mip levels for a full chain down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Dimensions of a mip level: each level halves, clamped to 1.
pub fn mip_extent(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

/// CPU-side index data with its format tag.
#[derive(Debug, Clone)]
pub enum IndexData {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexData {
    pub fn count(&self) -> u32 {
        match self {
            Self::U16(v) => v.len() as u32,
            Self::U32(v) => v.len() as u32,
        }
    }

    pub fn index_type(&self) -> vk::IndexType {
        match self {
            Self::U16(_) => vk::IndexType::UINT16,
            Self::U32(_) => vk::IndexType::UINT32,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::U16(v) => bytemuck::cast_slice(v),
            Self::U32(v) => bytemuck::cast_slice(v),
        }
    }
}

/// One vertex attribute stream as raw bytes plus per-vertex stride.
#[derive(Debug, Clone)]
pub struct VertexStream {
    pub data: Vec<u8>,
    pub stride: u64,
}

impl VertexStream {
    /// Build a stream from a slice of vertex elements.
    pub fn from_slice<T: bytemuck::Pod>(data: &[T]) -> Self {
        Self {
            data: bytemuck::cast_slice(data).to_vec(),
            stride: std::mem::size_of::<T>() as u64,
        }
    }
}

/// CPU-side mesh descriptor produced by generators or scene import.
#[derive(Debug, Clone)]
pub struct MeshData {
    pub indices: IndexData,
    pub vertex_count: u32,
    pub streams: Vec<VertexStream>,
}

impl MeshData {
    /// Compute the packed buffer layout for this mesh.
    pub fn layout(&self) -> Result<MeshLayout> {
        let strides: Vec<u64> = self.streams.iter().map(|s| s.stride).collect();
        MeshLayout::new(
            self.indices.count(),
            self.indices.index_type(),
            self.vertex_count,
            &strides,
        )
    }
}

/// How a byte range of staging pixels maps onto one texture subresource.
#[derive(Debug, Clone, Copy)]
pub struct TextureRegion {
    pub byte_offset: u64,
    pub mip_level: u32,
    pub base_layer: u32,
    pub layer_count: u32,
    pub width: u32,
    pub height: u32,
}

/// CPU-side texture descriptor.
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub layer_count: u32,
    /// Raw pixels for all regions, concatenated.
    pub pixels: Vec<u8>,
    /// Explicit subresource mapping. Empty means one full-extent region for
    /// mip 0 across all layers.
    pub regions: Vec<TextureRegion>,
    /// Generate the remaining mip chain on the GPU after upload.
    pub gen_mips: bool,
}

/// Build the buffer-to-image copy regions for a texture upload.
///
/// Fails if the descriptor exceeds [`MAX_REGION_COUNT`].
pub fn build_copy_regions(data: &TextureData) -> Result<Vec<vk::BufferImageCopy>> {
    if data.regions.len() > MAX_REGION_COUNT {
        return Err(GpuError::InvalidState(format!(
            "Texture has {} copy regions, max is {MAX_REGION_COUNT}",
            data.regions.len()
        )));
    }

    if data.regions.is_empty() {
        return Ok(vec![vk::BufferImageCopy::default()
            .buffer_offset(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(data.layer_count),
            )
            .image_extent(vk::Extent3D {
                width: data.width,
                height: data.height,
                depth: 1,
            })]);
    }

    Ok(data
        .regions
        .iter()
        .map(|region| {
            vk::BufferImageCopy::default()
                .buffer_offset(region.byte_offset)
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(region.mip_level)
                        .base_array_layer(region.base_layer)
                        .layer_count(region.layer_count),
                )
                .image_extent(vk::Extent3D {
                    width: region.width,
                    height: region.height,
                    depth: 1,
                })
        })
        .collect())
}

/// A uniform buffer pair with host staging and device resident halves.
pub struct ConstBuffer {
    pub staging: GpuBuffer,
    pub resident: GpuBuffer,
    pub size: u64,
    /// Set by staging writes, cleared when the buffer is enqueued for upload.
    dirty: bool,
}

impl ConstBuffer {
    /// Create a const buffer pair of the given byte size.
    pub fn new(allocator: &mut GpuAllocator, size: u64, name: &str) -> Result<Self> {
        let staging = allocator.create_staging_buffer(size, &format!("{name}.staging"))?;
        let resident = allocator.create_resident_buffer(
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            &format!("{name}.resident"),
        )?;

        Ok(Self {
            staging,
            resident,
            size,
            dirty: false,
        })
    }

    /// Write a value into the staging half and mark the buffer changed.
    pub fn write<T: bytemuck::Pod>(&mut self, value: &T) -> Result<()> {
        self.write_at(0, value)
    }

    /// Write a value at a byte offset into the staging half.
    ///
    /// Used for arrays of per-draw constants indexed by dynamic offset.
    pub fn write_at<T: bytemuck::Pod>(&mut self, offset: u64, value: &T) -> Result<()> {
        self.staging.write_bytes(offset, bytemuck::bytes_of(value))?;
        self.dirty = true;
        Ok(())
    }

    /// Whether staging holds data the resident half has not been given yet.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    #[cfg(test)]
    pub(crate) fn from_raw_parts(staging: GpuBuffer, resident: GpuBuffer, size: u64) -> Self {
        Self {
            staging,
            resident,
            size,
            dirty: true,
        }
    }

    /// Free both halves.
    pub fn destroy(&mut self, allocator: &mut GpuAllocator) -> Result<()> {
        allocator.free_buffer(&mut self.staging)?;
        allocator.free_buffer(&mut self.resident)?;
        Ok(())
    }
}

/// A packed mesh buffer pair: index prefix plus contiguous vertex streams.
pub struct GpuMesh {
    pub staging: GpuBuffer,
    pub resident: GpuBuffer,
    pub layout: MeshLayout,
}

impl GpuMesh {
    /// Create the buffer pair and write the mesh data into staging.
    pub fn new(allocator: &mut GpuAllocator, data: &MeshData, name: &str) -> Result<Self> {
        let layout = data.layout()?;
        let size = layout.total_size();

        let staging = allocator.create_staging_buffer(size, &format!("{name}.staging"))?;
        let resident = allocator.create_resident_buffer(
            size,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::VERTEX_BUFFER,
            &format!("{name}.resident"),
        )?;

        staging.write_bytes(layout.index_region().offset, data.indices.bytes())?;
        for (i, stream) in data.streams.iter().enumerate() {
            staging.write_bytes(layout.stream_region(i).offset, &stream.data)?;
        }

        Ok(Self {
            staging,
            resident,
            layout,
        })
    }

    pub fn index_count(&self) -> u32 {
        self.layout.index_count()
    }

    pub fn index_type(&self) -> vk::IndexType {
        self.layout.index_type()
    }

    /// Free both halves.
    pub fn destroy(&mut self, allocator: &mut GpuAllocator) -> Result<()> {
        allocator.free_buffer(&mut self.staging)?;
        allocator.free_buffer(&mut self.resident)?;
        Ok(())
    }
}

/// A sampled texture with its staging buffer and upload metadata.
pub struct GpuTexture {
    pub staging: GpuBuffer,
    pub image: GpuImage,
    pub view: vk::ImageView,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub layer_count: u32,
    pub gen_mips: bool,
    pub regions: Vec<vk::BufferImageCopy>,
}

impl GpuTexture {
    /// Create the image, view, and staging buffer, and write pixels into
    /// staging.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        allocator: &mut GpuAllocator,
        data: &TextureData,
        name: &str,
    ) -> Result<Self> {
        let regions = build_copy_regions(data)?;

        let mip_levels = if data.gen_mips {
            mip_level_count(data.width, data.height)
        } else {
            // Explicit regions may populate several levels themselves
            regions
                .iter()
                .map(|r| r.image_subresource.mip_level + 1)
                .max()
                .unwrap_or(1)
        };

        let mut usage = vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST;
        if data.gen_mips {
            // Blit source for the mip chain
            usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(data.format)
            .extent(vk::Extent3D {
                width: data.width,
                height: data.height,
                depth: 1,
            })
            .mip_levels(mip_levels)
            .array_layers(data.layer_count)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = allocator.create_device_image(&image_info, name)?;

        let view_type = if data.layer_count > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.image)
            .view_type(view_type)
            .format(data.format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(mip_levels)
                    .base_array_layer(0)
                    .layer_count(data.layer_count),
            );

        let view = device.create_image_view(&view_info, None)?;

        let staging =
            allocator.create_staging_buffer(data.pixels.len() as u64, &format!("{name}.staging"))?;
        staging.write_bytes(0, &data.pixels)?;

        Ok(Self {
            staging,
            image,
            view,
            width: data.width,
            height: data.height,
            mip_levels,
            layer_count: data.layer_count,
            gen_mips: data.gen_mips,
            regions,
        })
    }

    /// Free the view, image, and staging buffer.
    ///
    /// # Safety
    /// The device must be valid and the texture must not be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device, allocator: &mut GpuAllocator) -> Result<()> {
        device.destroy_image_view(self.view, None);
        allocator.free_image(&mut self.image)?;
        allocator.free_buffer(&mut self.staging)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_count_full_chain() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(640, 480), 10);
        assert_eq!(mip_level_count(2, 1), 2);
    }

    #[test]
    fn mip_extents_halve_and_clamp() {
        let (w, h) = (256, 100);
        let levels = mip_level_count(w, h);
        for level in 0..levels {
            let (mw, mh) = mip_extent(w, h, level);
            assert_eq!(mw, (w >> level).max(1));
            assert_eq!(mh, (h >> level).max(1));
            assert!(mw >= 1 && mh >= 1);
        }
        assert_eq!(mip_extent(256, 100, 8), (1, 1));
    }

    #[test]
    fn default_region_covers_base_level() {
        let data = TextureData {
            width: 64,
            height: 32,
            format: vk::Format::R8G8B8A8_UNORM,
            layer_count: 2,
            pixels: vec![0; 64 * 32 * 4 * 2],
            regions: Vec::new(),
            gen_mips: false,
        };

        let regions = build_copy_regions(&data).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].image_extent.width, 64);
        assert_eq!(regions[0].image_extent.height, 32);
        assert_eq!(regions[0].image_subresource.layer_count, 2);
        assert_eq!(regions[0].image_subresource.mip_level, 0);
    }

    #[test]
    fn region_count_is_bounded() {
        let region = TextureRegion {
            byte_offset: 0,
            mip_level: 0,
            base_layer: 0,
            layer_count: 1,
            width: 4,
            height: 4,
        };
        let data = TextureData {
            width: 4,
            height: 4,
            format: vk::Format::R8G8B8A8_UNORM,
            layer_count: 1,
            pixels: vec![0; 64],
            regions: vec![region; MAX_REGION_COUNT + 1],
            gen_mips: false,
        };

        assert!(build_copy_regions(&data).is_err());

        let data = TextureData {
            regions: vec![region; MAX_REGION_COUNT],
            ..data
        };
        assert_eq!(build_copy_regions(&data).unwrap().len(), MAX_REGION_COUNT);
    }

    #[test]
    fn mesh_data_layout_matches_streams() {
        let data = MeshData {
            indices: IndexData::U16(vec![0, 1, 2, 2, 3, 0]),
            vertex_count: 4,
            streams: vec![
                VertexStream::from_slice(&[[0.0f32; 3]; 4]),
                VertexStream::from_slice(&[[0.0f32; 2]; 4]),
            ],
        };

        let layout = data.layout().unwrap();
        assert_eq!(layout.index_region().size, 12);
        assert_eq!(layout.stream_region(0).offset, 12);
        assert_eq!(layout.stream_region(0).size, 48);
        assert_eq!(layout.stream_region(1).offset, 60);
        assert_eq!(layout.stream_region(1).size, 32);
    }
}
