//! Vulkan Texture - GPU image resource management.

use ash::{vk, Device};
use std::cell::RefCell;
use std::ops::RangeBounds;
use cinder_core::collections::hashmap::HashMap;
use cinder_rhi_derive::DeviceObject;
use crate::Sampler;
use crate::utility::{find_memory_type, normalize_range_u32};

/// Texture descriptor for creating GPU textures.
#[derive(Debug, Clone)]
pub struct TextureDesc {
    pub name: String,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub usage: vk::ImageUsageFlags,
    pub memory_flags: vk::MemoryPropertyFlags,
    pub image_type: vk::ImageType,
    pub view_type: vk::ImageViewType,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
    pub tiling: vk::ImageTiling,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            name: String::new(),
            format: vk::Format::R8G8B8A8_UNORM,
            extent: vk::Extent3D {
                width: 1,
                height: 1,
                depth: 1,
            },
            usage: vk::ImageUsageFlags::SAMPLED,
            memory_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            image_type: vk::ImageType::TYPE_2D,
            view_type: vk::ImageViewType::TYPE_2D,
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
        }
    }
}

impl TextureDesc {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(name: &str, width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            name: name.to_owned(),
            format,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            ..Default::default()
        }
    }

    /// Create a depth attachment descriptor.
    pub fn new_depth_attachment(name: &str, width: u32, height: u32) -> Self {
        Self {
            name: name.to_owned(),
            format: vk::Format::D32_SFLOAT,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        }
    }

    /// Set the texture usage flags.
    pub fn with_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    /// Add additional usage flags.
    pub fn with_additional_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage |= usage;
        self
    }

    /// Enable transfer destination usage.
    pub fn with_transfer_dst_usage(mut self) -> Self {
        self.usage |= vk::ImageUsageFlags::TRANSFER_DST;
        self
    }
}

/// GPU texture with memory allocation and cached per-subresource views.
#[DeviceObject]
pub struct Texture {
    desc: TextureDesc,
    image: vk::Image,
    /// If memory is null, it is a swapchain texture
    memory: vk::DeviceMemory,
    views: RefCell<HashMap<TextureSubresource, vk::ImageView>>,
}

impl Texture {
    /// Create a new texture from a descriptor (view is not created).
    pub fn new(
        device: &crate::RenderDevice,
        desc: &TextureDesc,
    ) -> Result<Self, vk::Result> {
        let memory_properties = device.memory_properties();
        let device = device.handle();

        let image_info = vk::ImageCreateInfo::default()
            .image_type(desc.image_type)
            .format(desc.format)
            .extent(desc.extent)
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .samples(desc.samples)
            .tiling(desc.tiling)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.create_image(&image_info, None)? };

        let mem_requirements = unsafe { device.get_image_memory_requirements(image) };

        let memory_type_index = find_memory_type(memory_properties, mem_requirements.memory_type_bits, desc.memory_flags)
            .ok_or(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)?;

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { device.allocate_memory(&alloc_info, None)? };

        unsafe { device.bind_image_memory(image, memory, 0)? };

        Ok(Self {
            desc: desc.clone(),
            image,
            memory,
            views: RefCell::new(Default::default()),
            device: device.clone(),
        })
    }

    /// Create a texture wrapper for a swapchain image (does not own the image or memory).
    pub(crate) fn from_swapchain_image(
        device: &Device,
        name: String,
        image: vk::Image,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Self {
        let desc = TextureDesc {
            name,
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            memory_flags: Default::default(),
            image_type: Default::default(),
            view_type: vk::ImageViewType::TYPE_2D,
            mip_levels: 1,
            array_layers: 1,
            samples: Default::default(),
            tiling: Default::default(),
        };
        Self {
            desc,
            image,
            memory: vk::DeviceMemory::null(),
            views: RefCell::new(Default::default()),
            device: device.clone(),
        }
    }

    pub fn as_range<R: RangeBounds<u32>>(&self, mipmaps: R, layers: R) -> Result<TextureRange<'_>, vk::Result> {
        let (base_mip, num_mips) = normalize_range_u32(mipmaps, self.desc.mip_levels)?;
        let (base_layer, num_layers) = normalize_range_u32(layers, self.desc.array_layers)?;

        Ok(TextureRange {
            texture: self,
            subresource: TextureSubresource {
                base_mip,
                num_mips,
                base_layer,
                num_layers,
            },
        })
    }

    /// Get the raw Vulkan image handle.
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.desc.name
    }

    #[inline]
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.desc.extent
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.desc.extent.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.desc.extent.height
    }

    /// Get the aspect flags for this texture based on its format.
    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        format_to_aspect_mask(self.desc.format)
    }

    pub fn is_swapchain_texture(&self) -> bool {
        self.memory == vk::DeviceMemory::null()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            for view in self.views.borrow().values() {
                self.device.destroy_image_view(*view, None);
            }

            if self.memory != vk::DeviceMemory::null() {
                self.device.destroy_image(self.image, None);
                self.device.free_memory(self.memory, None);
            }
        }
    }
}

/// Get the appropriate aspect mask for an image format.
fn format_to_aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

pub struct TextureRange<'a> {
    texture: &'a Texture,
    subresource: TextureSubresource,
}

#[derive(Hash, PartialEq, Eq, Clone, Copy)]
struct TextureSubresource {
    base_mip: u32,
    num_mips: u32,
    base_layer: u32,
    num_layers: u32,
}

impl TextureSubresource {
    fn to_vk(self, aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: self.base_mip,
            level_count: self.num_mips,
            base_array_layer: self.base_layer,
            layer_count: self.num_layers,
        }
    }
}

impl<'a> TextureRange<'a> {
    #[inline]
    pub fn texture(&self) -> &'a Texture { self.texture }

    pub fn view(&self) -> Result<vk::ImageView, vk::Result> {
        // Cached per-subresource view.
        if let Some(v) = { self.texture.views.borrow().get(&self.subresource).copied() } {
            return Ok(v);
        }

        let aspect_mask = format_to_aspect_mask(self.texture.desc.format);
        let view_info = vk::ImageViewCreateInfo::default()
            .image(self.texture.image)
            .view_type(self.texture.desc.view_type)
            .format(self.texture.desc.format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(self.subresource.to_vk(aspect_mask));

        let view = unsafe { self.texture.device.create_image_view(&view_info, None)? };
        self.texture.views.borrow_mut().insert(self.subresource, view);
        Ok(view)
    }

    pub fn to_binding(&self, sampler: &Sampler, layout: vk::ImageLayout) -> Result<vk::DescriptorImageInfo, vk::Result> {
        Ok(vk::DescriptorImageInfo::default()
            .image_view(self.view()?)
            .sampler(sampler.handle())
            .image_layout(layout))
    }
}
