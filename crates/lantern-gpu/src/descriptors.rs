//! Descriptor layouts, pools, and writes.
//!
//! The frame pipeline binds three kinds of resources: plain uniform
//! buffers, dynamic uniform buffers indexed per draw, and combined image
//! samplers. Layouts are built once at startup, one pool per frame slot
//! allocates the sets, and [`DescriptorWrite`] points them at resources.

use crate::error::Result;
use ash::vk;

/// Builder for a descriptor set layout.
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl<'a> DescriptorSetLayoutBuilder<'a> {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    fn push(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1)
                .stage_flags(stage_flags),
        );
        self
    }

    /// Add a uniform buffer binding.
    pub fn uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.push(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    /// Add a uniform buffer binding addressed by a per-draw dynamic offset.
    pub fn dynamic_uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.push(
            binding,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            stage_flags,
        )
    }

    /// Add a combined image sampler binding.
    pub fn sampled_image(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.push(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            stage_flags,
        )
    }

    /// Build the descriptor set layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);

        Ok(device.create_descriptor_set_layout(&layout_info, None)?)
    }
}

impl Default for DescriptorSetLayoutBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// A descriptor pool sized for a fixed number of sets.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a pool. `pool_sizes` must cover every descriptor the sets
    /// allocated from it will hold.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        let pool = device.create_descriptor_pool(&create_info, None)?;
        Ok(Self { pool })
    }

    /// Allocate one set per layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate(
        &self,
        device: &ash::Device,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        Ok(device.allocate_descriptor_sets(&alloc_info)?)
    }

    /// Destroy the pool, freeing its sets.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_descriptor_pool(self.pool, None);
    }
}

/// One descriptor update, as plain data.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorWrite {
    UniformBuffer {
        buffer: vk::Buffer,
        offset: u64,
        range: u64,
    },
    /// `range` is the stride visible per draw, not the full buffer size.
    DynamicUniformBuffer {
        buffer: vk::Buffer,
        offset: u64,
        range: u64,
    },
    CombinedImageSampler {
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    },
}

impl DescriptorWrite {
    /// Point `binding` of `dst_set` at this resource.
    ///
    /// # Safety
    /// The device, set, and referenced resource must be valid.
    pub unsafe fn apply(&self, device: &ash::Device, dst_set: vk::DescriptorSet, binding: u32) {
        let write = vk::WriteDescriptorSet::default()
            .dst_set(dst_set)
            .dst_binding(binding);

        match *self {
            Self::UniformBuffer {
                buffer,
                offset,
                range,
            } => {
                let info = vk::DescriptorBufferInfo::default()
                    .buffer(buffer)
                    .offset(offset)
                    .range(range);
                let write = write
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(&info));
                device.update_descriptor_sets(&[write], &[]);
            }
            Self::DynamicUniformBuffer {
                buffer,
                offset,
                range,
            } => {
                let info = vk::DescriptorBufferInfo::default()
                    .buffer(buffer)
                    .offset(offset)
                    .range(range);
                let write = write
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                    .buffer_info(std::slice::from_ref(&info));
                device.update_descriptor_sets(&[write], &[]);
            }
            Self::CombinedImageSampler {
                view,
                sampler,
                layout,
            } => {
                let info = vk::DescriptorImageInfo::default()
                    .image_view(view)
                    .sampler(sampler)
                    .image_layout(layout);
                let write = write
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(&info));
                device.update_descriptor_sets(&[write], &[]);
            }
        }
    }
}
