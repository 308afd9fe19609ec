use winit::event::{DeviceEvent, WindowEvent};
use winit::window::Window;
use cinder_core::cli::EngineArgs;
use cinder_rhi::{vk, CommandEncoder};
use crate::Engine;

pub trait App: Sized + 'static {
    fn new(args: &EngineArgs) -> anyhow::Result<Self>;
    fn on_window_event(&mut self, _event: &WindowEvent, _window: &Window) {}
    fn on_device_event(&mut self, _event: &DeviceEvent) {}
    fn tick(&mut self, _delta_time: f32) {}
}

/// All contexts needed to record a frame. The encoder is inside an
/// active dynamic-rendering pass with viewport and scissor set.
pub struct RenderContext<'a, 'b> {
    encoder: &'a CommandEncoder<'b>,
    extent: vk::Extent2D,
    frame_index: usize,
}

impl<'a, 'b> RenderContext<'a, 'b> {
    pub(crate) fn new(encoder: &'a CommandEncoder<'b>, extent: vk::Extent2D, frame_index: usize) -> Self {
        Self {
            encoder,
            extent,
            frame_index,
        }
    }

    #[inline]
    pub fn encoder(&self) -> &'a CommandEncoder<'b> { self.encoder }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D { self.extent }

    #[inline]
    pub fn frame_index(&self) -> usize { self.frame_index }

    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height.max(1) as f32
    }
}

pub trait RenderableApp: App {
    fn prepare(&mut self, _engine: &mut Engine) -> anyhow::Result<()> { Ok(()) }
    fn resize(&mut self, _width: u32, _height: u32) {}
    fn render(&mut self, context: &mut RenderContext);
}
