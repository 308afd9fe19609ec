//! Cinder RHI (Render Hardware Interface) - Pure Vulkan backend.
//!
//! This crate provides low-level Vulkan abstractions for the Cinder engine.

pub mod binder;
pub mod buffer;
pub mod command;
pub mod core;
pub mod descriptor;
pub mod device;
pub mod pipeline;
pub mod pipeline_cache;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod texture;
pub mod upload;
pub mod queue;
mod defer_release;
mod synchronization;
mod utility;

pub(crate) use paste::paste;

pub(crate) const NUM_BACK_BUFFERS: u32 = 3;

pub use memoffset;
pub use cinder_rhi_derive::VertexLayout;

pub use ash::{vk, Device};
pub use binder::ShaderDescriptorBinder;
pub use buffer::{Buffer, BufferDesc, BufferRange};
pub use command::{CommandPool, CommandEncoder, ImmediateCommandEncoder};
pub use core::RhiCore;
pub use queue::Queue;
pub use descriptor::{
    DescriptorSetAllocator, DescriptorLayoutCache, DescriptorSetBuilder,
    LayoutBinding, LayoutSignature,
};
pub use device::RenderDevice;
pub use defer_release::{ReleaseAction, ReleaseQueue};
pub use pipeline::{
    GraphicPipeline, GraphicPipelineInfo, VertexAttribute, VertexBinding, VertexLayout,
};
pub use pipeline_cache::PipelineCache;
pub use sampler::{Sampler, SamplerConfig};
pub use shader::{
    reflect_spirv, ReflectedBinding, ReflectionOverride, Shader, ShaderBinding, ShaderEffect,
    ShaderError, ShaderReflection, ShaderStage, MAX_DESCRIPTOR_SETS,
};
pub use swapchain::{FrameSync, SwapchainConfig, SwapchainWindow, Swapchain};
pub use texture::{Texture, TextureDesc, TextureRange};
pub use synchronization::{Semaphore, Fence};
pub use upload::{upload_texture, UploadPool};
