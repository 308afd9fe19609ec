//! Per-frame GPU data layouts and frame-owned resources.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use cinder_rhi::{DescriptorSetAllocator, RenderDevice};

/// Upper bound on renderables per frame; sizes the object buffer.
pub const MAX_OBJECTS: usize = 10_000;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuCameraData {
    pub view: Mat4,
    pub proj: Mat4,
    pub viewproj: Mat4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuObjectData {
    pub model: Mat4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuSceneData {
    pub ambient_color: Vec4,
    pub sunlight_direction: Vec4,
    pub sunlight_color: Vec4,
}

/// Round `size` up to the device's minimum uniform buffer offset alignment.
pub fn pad_uniform_buffer_size(device: &RenderDevice, size: u64) -> u64 {
    let min_alignment = device.properties().limits.min_uniform_buffer_offset_alignment;
    pad_to_alignment(size, min_alignment)
}

/// Round `size` up to the device's minimum storage buffer offset alignment.
pub fn pad_storage_buffer_size(device: &RenderDevice, size: u64) -> u64 {
    let min_alignment = device.properties().limits.min_storage_buffer_offset_alignment;
    pad_to_alignment(size, min_alignment)
}

fn pad_to_alignment(size: u64, alignment: u64) -> u64 {
    if alignment > 0 {
        (size + alignment - 1) & !(alignment - 1)
    } else {
        size
    }
}

/// Resources owned by one frame in flight.
pub struct FrameResources {
    /// Allocator for sets that live for exactly one frame. Reset at the
    /// start of the frame, after the frame fence guarantees the GPU is
    /// done reading them.
    pub transient_allocator: DescriptorSetAllocator,
}

impl FrameResources {
    pub fn new(device: &RenderDevice) -> Self {
        Self {
            transient_allocator: DescriptorSetAllocator::new(device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_rounds_up_to_alignment() {
        assert_eq!(pad_to_alignment(1, 256), 256);
        assert_eq!(pad_to_alignment(256, 256), 256);
        assert_eq!(pad_to_alignment(257, 256), 512);
        assert_eq!(pad_to_alignment(0, 64), 0);
        assert_eq!(pad_to_alignment(100, 0), 100);
    }
}
