//! Staging-buffer-based upload utilities.
//!
//! All uploads go through immediate submit and block until the GPU
//! finishes, so staging memory can be reused (or dropped) on return.

use std::sync::Arc;

use ash::vk;

use crate::{Buffer, BufferDesc, ImmediateCommandEncoder, RenderDevice, Texture};

struct PendingBufferCopy {
    dst: Arc<Buffer>,
    dst_offset: vk::DeviceSize,
    src_offset: vk::DeviceSize,
    size: vk::DeviceSize,
    dst_stage: vk::PipelineStageFlags2,
    dst_access: vk::AccessFlags2,
}

/// A simple upload pool backed by a single reusable staging buffer.
///
/// Supports queueing multiple buffer uploads and flushing them in one
/// blocking submit.
pub struct UploadPool {
    staging: Buffer,
    staging_size: vk::DeviceSize,
    write_head: vk::DeviceSize,
    pending: Vec<PendingBufferCopy>,
}

impl UploadPool {
    pub fn new(device: &RenderDevice, staging_size: vk::DeviceSize) -> Result<Self, vk::Result> {
        let staging = Buffer::new(device, &BufferDesc::staging("upload.staging", staging_size))?;
        Ok(Self {
            staging,
            staging_size,
            write_head: 0,
            pending: Vec::new(),
        })
    }

    pub fn staging_size(&self) -> vk::DeviceSize { self.staging_size }

    pub fn is_empty(&self) -> bool { self.pending.is_empty() }

    /// Enqueue an upload into `dst` at `dst_offset`.
    ///
    /// If the staging buffer doesn't have enough remaining space, the
    /// upload is rejected; call `flush()` first and retry.
    pub fn enqueue_copy(
        &mut self,
        dst: Arc<Buffer>,
        dst_offset: vk::DeviceSize,
        data: &[u8],
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
    ) -> Result<(), vk::Result> {
        let size = data.len() as vk::DeviceSize;
        if size == 0 {
            return Ok(());
        }
        if size > self.staging_size || self.write_head + size > self.staging_size {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }

        let src_offset = self.write_head;
        self.staging.write_at(src_offset, data)?;
        self.write_head += size;

        self.pending.push(PendingBufferCopy {
            dst,
            dst_offset,
            src_offset,
            size,
            dst_stage,
            dst_access,
        });

        Ok(())
    }

    /// Flush all pending uploads using an immediate submit, blocking until completion.
    pub fn flush(&mut self, immediate: &ImmediateCommandEncoder) -> Result<(), vk::Result> {
        if self.pending.is_empty() {
            self.write_head = 0;
            return Ok(());
        }

        let staging_handle = self.staging.handle();
        let pending = std::mem::take(&mut self.pending);

        let result = immediate.submit_and_wait(|encoder| {
            // Host writes into staging must be visible to the copies.
            let pre = vk::MemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::HOST)
                .src_access_mask(vk::AccessFlags2::HOST_WRITE)
                .dst_stage_mask(vk::PipelineStageFlags2::TRANSFER)
                .dst_access_mask(vk::AccessFlags2::TRANSFER_READ);
            encoder.memory_barriers(std::slice::from_ref(&pre));

            for p in pending.iter() {
                let region = vk::BufferCopy::default()
                    .src_offset(p.src_offset)
                    .dst_offset(p.dst_offset)
                    .size(p.size);
                encoder.copy_buffer(staging_handle, p.dst.handle(), std::slice::from_ref(&region));
            }

            // Copies must complete before the destination's first use.
            let post: Vec<vk::BufferMemoryBarrier2> = pending
                .iter()
                .map(|p| {
                    vk::BufferMemoryBarrier2::default()
                        .src_stage_mask(vk::PipelineStageFlags2::TRANSFER)
                        .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
                        .dst_stage_mask(p.dst_stage)
                        .dst_access_mask(p.dst_access)
                        .buffer(p.dst.handle())
                        .offset(p.dst_offset)
                        .size(p.size)
                })
                .collect();
            encoder.buffer_barriers(&post);
        });

        if result.is_err() {
            // restore pending on failure (best-effort)
            self.pending = pending;
        }

        result?;
        self.write_head = 0;
        Ok(())
    }

    /// Convenience: enqueue then flush (blocking). Flushes first if the
    /// staging buffer is full.
    pub fn upload_buffer(
        &mut self,
        immediate: &ImmediateCommandEncoder,
        dst: Arc<Buffer>,
        dst_offset: vk::DeviceSize,
        data: &[u8],
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
    ) -> Result<(), vk::Result> {
        if self.enqueue_copy(dst.clone(), dst_offset, data, dst_stage, dst_access).is_err() {
            self.flush(immediate)?;
            self.enqueue_copy(dst, dst_offset, data, dst_stage, dst_access)?;
        }
        self.flush(immediate)
    }
}

/// Upload pixel data into a freshly created texture and leave it in
/// SHADER_READ_ONLY_OPTIMAL layout. Blocks until the copy completes.
pub fn upload_texture(
    device: &RenderDevice,
    immediate: &ImmediateCommandEncoder,
    texture: &Texture,
    pixels: &[u8],
) -> Result<(), vk::Result> {
    let staging = Buffer::new(device, &BufferDesc::staging("texture.staging", pixels.len() as vk::DeviceSize))?;
    staging.write_at(0, pixels)?;

    let subresource_range = vk::ImageSubresourceRange {
        aspect_mask: texture.aspect(),
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    };

    immediate.submit_and_wait(|encoder| {
        let to_transfer = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::NONE)
            .src_access_mask(vk::AccessFlags2::NONE)
            .dst_stage_mask(vk::PipelineStageFlags2::TRANSFER)
            .dst_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .image(texture.handle())
            .subresource_range(subresource_range);
        encoder.image_barriers(std::slice::from_ref(&to_transfer));

        let region = vk::BufferImageCopy::default()
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: texture.aspect(),
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(texture.extent());
        encoder.copy_buffer_to_image(
            staging.handle(),
            texture.handle(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            std::slice::from_ref(&region),
        );

        let to_sampled = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::TRANSFER)
            .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::FRAGMENT_SHADER)
            .dst_access_mask(vk::AccessFlags2::SHADER_READ)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image(texture.handle())
            .subresource_range(subresource_range);
        encoder.image_barriers(std::slice::from_ref(&to_sampled));
    })

    // staging drops here, after the fence wait
}
