//! Vulkan Device - logical device and queue management.

use crate::core::PhysicalDevice;
use crate::defer_release::{ReleaseAction, ReleaseQueue};
use crate::queue::Queue;
use crate::synchronization::{Fence, Semaphore};
use crate::CommandEncoder;
use ash::{vk, Device, Instance};
use std::cell::RefCell;
use cinder_core::collections::{hashset::HashSet, SmallVec};

/// Get required device extensions.
fn get_required_device_extensions() -> Vec<*const i8> {
    vec![ash::khr::swapchain::NAME.as_ptr()]
}

/// Vulkan logical device with queues.
pub struct RenderDevice {
    parent_physical_device: PhysicalDevice,
    device: Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,

    #[cfg(feature = "validation")]
    debug_utils: Option<ash::ext::debug_utils::Device>,

    frame_fences: Vec<Fence>,
    release_queues: RefCell<Vec<ReleaseQueue>>,

    current_frame: u8,
}

impl RenderDevice {
    /// Create a new logical device from a physical device.
    pub fn new(
        instance: &Instance,
        physical_device: &PhysicalDevice,
        num_frames: u32,
    ) -> Result<Self, vk::Result> {
        // Collect unique queue families
        let unique_families: HashSet<u32> = [physical_device.graphics_queue_family(), physical_device.present_queue_family()]
            .into_iter()
            .collect();

        let queue_priority = 1.0f32;

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(std::slice::from_ref(&queue_priority))
            })
            .collect();

        let extensions = get_required_device_extensions();

        let features = vk::PhysicalDeviceFeatures::default();

        // Vulkan 1.3 features
        let mut vulkan_13_features = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features)
            .push_next(&mut vulkan_13_features);

        let device = unsafe { instance.create_device(physical_device.handle(), &create_info, None)? };

        let graphics_queue = unsafe { device.get_device_queue(physical_device.graphics_queue_family(), 0) };
        let present_queue = unsafe { device.get_device_queue(physical_device.present_queue_family(), 0) };

        #[cfg(feature = "validation")]
        let debug_utils = Some(ash::ext::debug_utils::Device::new(instance, &device));

        let mut frame_fences = Vec::with_capacity(num_frames as usize);
        let mut release_queues = Vec::with_capacity(num_frames as usize);

        for _ in 0..num_frames {
            frame_fences.push(Fence::new(&device, true)?);
            release_queues.push(ReleaseQueue::new());
        }

        Ok(Self {
            parent_physical_device: physical_device.clone(),
            device,
            graphics_queue,
            present_queue,
            #[cfg(feature = "validation")]
            debug_utils,
            frame_fences,
            release_queues: RefCell::new(release_queues),
            current_frame: 0,
        })
    }

    /// Get a reference to the logical device.
    #[inline]
    pub fn handle(&self) -> &Device {
        &self.device
    }

    /// Block until the GPU has finished with this frame slot, then free
    /// the slot's deferred resources. Returns the frame index.
    ///
    /// The fence is left signaled; callers reset it right before the
    /// submission that will signal it again, so a frame abandoned
    /// without submitting cannot deadlock the slot.
    #[profiling::function]
    pub fn begin_frame(&mut self) -> usize {
        self.frame_fences[self.current_frame as usize]
            .wait()
            .expect("frame fence wait failed");

        self.release_queues.borrow_mut()[self.current_frame as usize].flush();

        self.current_frame as usize
    }

    /// Park a resource until the current frame's GPU work completes.
    #[inline]
    pub fn defer_release(&self, value: impl Into<ReleaseAction>) {
        self.release_queues.borrow_mut()[self.current_frame as usize].push(value);
    }

    #[inline]
    pub fn end_frame(&mut self) {
        self.current_frame = (self.current_frame + 1) % (self.frame_fences.len() as u8);
    }

    #[inline]
    pub fn current_frame_index(&self) -> usize { self.current_frame as _ }

    #[inline]
    pub fn num_frames(&self) -> usize { self.frame_fences.len() }

    pub fn frame_fence(&self) -> &Fence {
        &self.frame_fences[self.current_frame as usize]
    }

    /// Get the physical device properties.
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        self.parent_physical_device.properties()
    }

    /// Get the physical device memory properties.
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        self.parent_physical_device.memory_properties()
    }

    pub fn graphics_queue(&self) -> Queue {
        Queue::new(self.graphics_queue, self.parent_physical_device.graphics_queue_family())
    }

    pub fn present_queue(&self) -> Queue {
        Queue::new(self.present_queue, self.parent_physical_device.present_queue_family())
    }

    pub fn wait_until_idle(&self) -> Result<(), vk::Result> {
        unsafe { self.device.device_wait_idle() }
    }

    pub fn parent_physical_device(&self) -> &PhysicalDevice {
        &self.parent_physical_device
    }

    pub fn set_debug_name<T: DebuggableObject>(&self, object: &T) {
        object.set_debug_name(self);
    }

    pub fn submit_commands<'a>(
        &self,
        encoder: CommandEncoder<'a>,
        queue: Queue,
        wait_semaphores: &'a [&Semaphore],
        wait_stage: vk::PipelineStageFlags2,
        signal_semaphores: &'a [&Semaphore],
        signal_stage: vk::PipelineStageFlags2,
        fence: &Fence,
    ) {
        let command_submit_info = vk::CommandBufferSubmitInfo::default()
            .command_buffer(encoder.handle());

        let wait_semaphore_infos = wait_semaphores.iter()
            .map(|semaphore| {
                vk::SemaphoreSubmitInfo::default()
                    .semaphore(semaphore.handle())
                    .stage_mask(wait_stage)
            })
            .collect::<SmallVec<[vk::SemaphoreSubmitInfo; 4]>>();

        let signal_semaphore_infos = signal_semaphores.iter()
            .map(|semaphore| {
                vk::SemaphoreSubmitInfo::default()
                    .semaphore(semaphore.handle())
                    .stage_mask(signal_stage)
            })
            .collect::<SmallVec<[vk::SemaphoreSubmitInfo; 4]>>();

        let submit_info = vk::SubmitInfo2::default()
            .command_buffer_infos(std::slice::from_ref(&command_submit_info))
            .wait_semaphore_infos(&wait_semaphore_infos)
            .signal_semaphore_infos(&signal_semaphore_infos);

        unsafe {
            self.device.queue_submit2(
                queue.handle(),
                &[submit_info],
                fence.handle()
            ).expect("command submission failed");
        }
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe { self.device.device_wait_idle().unwrap(); }

        for queue in self.release_queues.get_mut() {
            queue.flush();
        }
        self.frame_fences.clear();

        unsafe {
            self.device.destroy_device(None);
        }
    }
}

pub(crate) mod sealed {
    pub trait Sealed {}
}

/// Crate-only trait for objects that own an `ash::Device` used for
/// destruction and device calls.
///
/// This trait is sealed and not visible to users of `cinder-rhi`.
#[allow(dead_code)]
pub(crate) trait DeviceObject: sealed::Sealed {
    fn device(&self) -> &Device;
    fn set_device(&mut self, device: Device);
}

/// Objects that can label their Vulkan handles for debug tooling.
pub trait DebuggableObject {
    fn set_debug_name(&self, device: &RenderDevice);
}

/// Attach a debug name to a raw handle. No-op without validation.
pub(crate) fn set_debug_name_handle<T: vk::Handle>(device: &RenderDevice, handle: T, name: &str) {
    #[cfg(feature = "validation")]
    {
        use std::ffi::CString;

        let Some(debug_utils) = &device.debug_utils else { return };
        let Ok(cname) = CString::new(name) else { return };

        let name_info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(&cname);

        unsafe {
            let _ = debug_utils.set_debug_utils_object_name(&name_info);
        }
    }

    #[cfg(not(feature = "validation"))]
    {
        let _ = (device, handle, name);
    }
}
