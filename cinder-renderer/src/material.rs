//! Materials: a shader effect, its pipeline, and an optional texture set.

use std::sync::Arc;
use anyhow::Result;
use cinder_rhi::{
    vk, DescriptorLayoutCache, DescriptorSetAllocator, DescriptorSetBuilder, GraphicPipeline,
    GraphicPipelineInfo, PipelineCache, RenderDevice, Sampler, ShaderEffect, Texture,
};

/// Everything needed to draw with one surface appearance.
pub struct Material {
    pub effect: Arc<ShaderEffect>,
    pub pipeline: Arc<GraphicPipeline>,
    /// Combined-image-sampler set (logical set 3), built once at material
    /// creation from the static allocator.
    pub texture_set: Option<vk::DescriptorSet>,
}

impl Material {
    /// Create a material without textures.
    pub fn new(
        device: &RenderDevice,
        pipeline_cache: &mut PipelineCache,
        effect: Arc<ShaderEffect>,
        pipeline_info: &GraphicPipelineInfo,
    ) -> Result<Self, vk::Result> {
        let pipeline = pipeline_cache.get_or_create(device, effect.pipeline_layout(), pipeline_info)?;

        Ok(Self {
            effect,
            pipeline,
            texture_set: None,
        })
    }

    /// Create a textured material. The texture set is written up front
    /// and stays valid for the material's lifetime.
    #[allow(clippy::too_many_arguments)]
    pub fn textured(
        device: &RenderDevice,
        pipeline_cache: &mut PipelineCache,
        layout_cache: &mut DescriptorLayoutCache,
        allocator: &mut DescriptorSetAllocator,
        effect: Arc<ShaderEffect>,
        pipeline_info: &GraphicPipelineInfo,
        texture: &Texture,
        sampler: &Sampler,
    ) -> Result<Self> {
        let pipeline = pipeline_cache.get_or_create(device, effect.pipeline_layout(), pipeline_info)?;

        let image_info = texture
            .as_range(.., ..)?
            .to_binding(sampler, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?;

        let (texture_set, _) = DescriptorSetBuilder::new(layout_cache, allocator)
            .bind_image(
                0,
                image_info,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            )
            .build()?;

        Ok(Self {
            effect,
            pipeline,
            texture_set: Some(texture_set),
        })
    }
}
