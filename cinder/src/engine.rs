use std::sync::Arc;
use winit::window::Window;
use cinder_core::log;
use cinder_rhi::core::{select_physical_device, PhysicalDevice};
use cinder_rhi::{
    vk, CommandEncoder, CommandPool, PipelineCache, RenderDevice, RhiCore, Swapchain,
    SwapchainConfig, SwapchainWindow, Texture, TextureDesc,
};
use crate::app::{RenderContext, RenderableApp};

pub struct Engine {
    pub main_window: Arc<Window>,

    frame_pools: Vec<CommandPool>,
    depth_texture: Texture,
    pub pipeline_cache: PipelineCache,
    swapchain: Swapchain,
    pub render_device: RenderDevice,
    _physical_device: PhysicalDevice,
    _rhi_core: RhiCore,

    should_exit: bool,
}

impl Engine {
    pub fn new(main_window: Arc<Window>) -> Result<Self, anyhow::Error> {
        let core = RhiCore::new(&main_window)?;
        let swapchain_window = SwapchainWindow::new(&main_window, &core)?;
        let physical_device = select_physical_device(core.instance(), &swapchain_window)?;
        let device = core.create_render_device(&physical_device)?;

        let swapchain_config = SwapchainConfig::default();
        let swapchain = Swapchain::new(&core, &device, swapchain_window, swapchain_config)?;

        let pipeline_cache = PipelineCache::new("pipeline_cache.main", &device)?;

        let extent = swapchain.extent();
        let depth_texture = Texture::new(
            &device,
            &TextureDesc::new_depth_attachment("frame.depth", extent.width, extent.height),
        )?;

        let graphics_family = device.graphics_queue().family_index();
        let frame_pools = (0..device.num_frames())
            .map(|i| {
                CommandPool::new(
                    &format!("command_pool.frame{i}"),
                    &device,
                    graphics_family,
                    vk::CommandPoolCreateFlags::empty(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            main_window,
            _rhi_core: core,
            _physical_device: physical_device,
            render_device: device,

            frame_pools,
            depth_texture,
            swapchain,
            pipeline_cache,

            should_exit: false,
        })
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain { &self.swapchain }

    #[profiling::function]
    pub fn tick(&mut self, _delta_time: f32) {
    }

    #[profiling::function]
    pub fn render<A: RenderableApp>(&mut self, app: &mut A) {
        let frame_index = self.render_device.begin_frame();
        self.frame_pools[frame_index].reset().expect("frame command pool reset failed");

        let (image_index, _suboptimal) = match self.swapchain.acquire_next_image() {
            Ok(acquired) => acquired,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.recreate_swapchain();
                self.render_device.end_frame();
                return;
            }
            Err(e) => panic!("swapchain image acquisition failed: {:?}", e),
        };

        let encoder = CommandEncoder::new("cmd.frame", &self.render_device, &self.frame_pools[frame_index])
            .expect("frame command buffer allocation failed");
        encoder
            .begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .expect("command buffer begin failed");

        let backbuffer = self.swapchain.swapchain_texture(image_index as usize);
        let extent = self.swapchain.extent();

        self.record_frame_begin(&encoder, &backbuffer, extent);

        {
            let mut context = RenderContext::new(&encoder, extent, frame_index);
            app.render(&mut context);
        }

        self.record_frame_end(&encoder, &backbuffer);
        encoder.end().expect("command buffer end failed");

        self.render_device
            .frame_fence()
            .reset()
            .expect("frame fence reset failed");

        let sync = self.swapchain.current_frame_sync();
        self.render_device.submit_commands(
            encoder,
            self.render_device.graphics_queue(),
            &[sync.image_available],
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            &[sync.render_finished],
            vk::PipelineStageFlags2::ALL_GRAPHICS,
            self.render_device.frame_fence(),
        );

        let suboptimal = self
            .swapchain
            .present(self.render_device.present_queue(), image_index)
            .expect("swapchain present failed");
        if suboptimal {
            self.recreate_swapchain();
        }

        self.render_device.end_frame();
    }

    /// Transition attachments and open the frame's render pass.
    fn record_frame_begin(&self, encoder: &CommandEncoder, backbuffer: &Texture, extent: vk::Extent2D) {
        let color_range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };
        let depth_range = vk::ImageSubresourceRange {
            aspect_mask: self.depth_texture.aspect(),
            ..color_range
        };

        let barriers = [
            vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::TOP_OF_PIPE)
                .dst_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
                .dst_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .image(backbuffer.handle())
                .subresource_range(color_range),
            vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::TOP_OF_PIPE)
                .dst_stage_mask(vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS)
                .dst_access_mask(vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
                .image(self.depth_texture.handle())
                .subresource_range(depth_range),
        ];
        encoder.image_barriers(&barriers);

        let color_view = backbuffer
            .as_range(.., ..)
            .and_then(|r| r.view())
            .expect("backbuffer view creation failed");
        let depth_view = self
            .depth_texture
            .as_range(.., ..)
            .and_then(|r| r.view())
            .expect("depth view creation failed");

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(color_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.05, 0.05, 0.08, 1.0],
                },
            });

        // Reverse-Z: clear depth to zero, test with GREATER_OR_EQUAL.
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(depth_view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 0.0, stencil: 0 },
            });

        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment))
            .depth_attachment(&depth_attachment);

        encoder.begin_rendering(&rendering_info);

        encoder.set_viewport(0, &[vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }]);
        encoder.set_scissor(0, &[vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        }]);
    }

    /// Close the render pass and make the backbuffer presentable.
    fn record_frame_end(&self, encoder: &CommandEncoder, backbuffer: &Texture) {
        encoder.end_rendering();

        let to_present = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::BOTTOM_OF_PIPE)
            .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .image(backbuffer.handle())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        encoder.image_barriers(std::slice::from_ref(&to_present));
    }

    fn recreate_swapchain(&mut self) {
        let inner_size = self.main_window.inner_size();
        if inner_size.width == 0 || inner_size.height == 0 {
            return;
        }

        let window_extent = vk::Extent2D {
            width: inner_size.width,
            height: inner_size.height,
        };

        self.swapchain
            .resize(&self.render_device, window_extent)
            .expect("swapchain recreation failed");

        self.depth_texture = Texture::new(
            &self.render_device,
            &TextureDesc::new_depth_attachment("frame.depth", window_extent.width, window_extent.height),
        )
        .expect("depth texture recreation failed");

        log::debug!("swapchain recreated at {}x{}", window_extent.width, window_extent.height);
    }

    #[profiling::function]
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.recreate_swapchain();
        }
    }

    #[inline]
    pub fn request_exit(&mut self) { self.should_exit = true; }

    #[inline]
    pub fn should_exit(&self) -> bool { self.should_exit }

    #[inline]
    pub fn pipeline_cache_size(&self) -> usize { self.pipeline_cache.len() }
}
