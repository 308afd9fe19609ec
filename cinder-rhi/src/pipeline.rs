//! Vulkan Pipeline - graphics pipeline construction over dynamic rendering.

use ash::vk;
use cinder_core::log;
use crate::RenderDevice;

/// Per-binding vertex buffer description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: vk::VertexInputRate,
}

/// One vertex attribute within a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: vk::Format,
    pub offset: u32,
}

/// Vertex structs implement this (usually via `#[derive(VertexLayout)]`)
/// to describe themselves to pipeline construction.
pub trait VertexLayout {
    fn vertex_layout() -> (VertexBinding, Vec<VertexAttribute>);
}

/// Graphics pipeline configuration.
pub struct GraphicPipelineInfo<'a> {
    pub stages: &'a [vk::PipelineShaderStageCreateInfo<'a>],
    pub vertex_binding: Option<VertexBinding>,
    pub vertex_attributes: &'a [VertexAttribute],
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: vk::CompareOp,
    pub color_format: vk::Format,
    pub depth_format: Option<vk::Format>,
}

impl<'a> Default for GraphicPipelineInfo<'a> {
    fn default() -> Self {
        Self {
            stages: &[],
            vertex_binding: None,
            vertex_attributes: &[],
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            depth_write: true,
            depth_compare: vk::CompareOp::GREATER_OR_EQUAL,
            color_format: vk::Format::B8G8R8A8_SRGB,
            depth_format: Some(vk::Format::D32_SFLOAT),
        }
    }
}

/// Graphics pipeline using dynamic rendering (Vulkan 1.3+).
///
/// The pipeline layout is borrowed (owned by the shader effect), only the
/// pipeline object itself is destroyed on drop.
pub struct GraphicPipeline {
    device: ash::Device,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

impl GraphicPipeline {
    /// Create a new graphics pipeline against an existing pipeline layout.
    pub fn new(
        device: &RenderDevice,
        layout: vk::PipelineLayout,
        info: &GraphicPipelineInfo,
        cache: vk::PipelineCache,
    ) -> Result<Self, vk::Result> {
        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = info
            .vertex_binding
            .iter()
            .map(|b| {
                vk::VertexInputBindingDescription::default()
                    .binding(b.binding)
                    .stride(b.stride)
                    .input_rate(b.input_rate)
            })
            .collect();

        let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = info
            .vertex_attributes
            .iter()
            .map(|a| {
                vk::VertexInputAttributeDescription::default()
                    .location(a.location)
                    .binding(a.binding)
                    .format(a.format)
                    .offset(a.offset)
            })
            .collect();

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(info.topology)
            .primitive_restart_enable(false);

        // Viewport state (dynamic)
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(info.polygon_mode)
            .cull_mode(info.cull_mode)
            .front_face(info.front_face)
            .line_width(1.0);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(info.depth_test)
            .depth_write_enable(info.depth_write)
            .depth_compare_op(info.depth_compare)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA);

        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .attachments(std::slice::from_ref(&color_blend_attachment));

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        // Dynamic rendering info
        let color_formats = [info.color_format];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats);

        if let Some(depth_format) = info.depth_format {
            rendering_info = rendering_info.depth_attachment_format(depth_format);
        }

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(info.stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            device.handle().create_graphics_pipelines(cache, &[pipeline_info], None)
        }
        .map_err(|e| e.1)?;

        log::debug!("graphics pipeline created");

        Ok(Self {
            device: device.handle().clone(),
            layout,
            pipeline: pipelines[0],
        })
    }

    /// Get the raw Vulkan pipeline handle.
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}
