use ash::{vk, Device};

/// An owning fence wrapper.
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    pub fn new(device: &Device, signaled: bool) -> Result<Self, vk::Result> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default().flags(flags), None)? };

        Ok(Self {
            device: device.clone(),
            fence,
        })
    }

    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Block until the fence signals. The wait is unbounded; a device
    /// error here means the GPU is gone and callers treat it as fatal.
    pub fn wait(&self) -> Result<(), vk::Result> {
        unsafe { self.device.wait_for_fences(&[self.fence], true, u64::MAX) }
    }

    pub fn reset(&self) -> Result<(), vk::Result> {
        unsafe { self.device.reset_fences(&[self.fence]) }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: &Device) -> Result<Self, vk::Result> {
        let semaphore = unsafe {
            device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };

        Ok(Self {
            device: device.clone(),
            semaphore,
        })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}
