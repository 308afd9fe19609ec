//! Per-draw descriptor binding by reflected name.
//!
//! The binder caches one descriptor set per logical set index across
//! frames. A cached set survives as long as its writes keep the same
//! resource identity; a dynamic-offset-only change updates the recorded
//! offset without touching the set. This is the path that lets a frame
//! re-bind the same uniform buffer at a new offset without allocating or
//! rewriting anything.

use std::sync::Arc;
use ash::vk;
use cinder_core::collections::SmallVec;
use cinder_core::log;
use crate::command::CommandEncoder;
use crate::descriptor::DescriptorSetAllocator;
use crate::shader::{ShaderEffect, MAX_DESCRIPTOR_SETS};

#[derive(Clone, Copy)]
struct BufferWrite {
    binding: u32,
    descriptor_type: vk::DescriptorType,
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    range: vk::DeviceSize,
    dynamic_offset: u32,
    is_dynamic: bool,
}

impl BufferWrite {
    fn same_resource(&self, other: &BufferWrite) -> bool {
        self.descriptor_type == other.descriptor_type
            && self.buffer == other.buffer
            && self.offset == other.offset
            && self.range == other.range
            && self.is_dynamic == other.is_dynamic
    }
}

/// Pending writes and cached sets per logical set index. Pure state, no
/// device access; the binder drives it.
#[derive(Default)]
struct WriteTable {
    writes: [Vec<BufferWrite>; MAX_DESCRIPTOR_SETS],
    cached: [Option<vk::DescriptorSet>; MAX_DESCRIPTOR_SETS],
}

impl WriteTable {
    /// Forget everything recorded for a set slot. Used when the bound
    /// effect changes the slot's layout.
    fn reset_slot(&mut self, set: usize) {
        self.writes[set].clear();
        self.cached[set] = None;
    }

    /// Record a buffer write. Returns without invalidating when only the
    /// dynamic offset changed; drops the cached set when the resource
    /// identity changed or the binding is new.
    fn record(&mut self, set: usize, write: BufferWrite) {
        let slot = &mut self.writes[set];

        match slot.iter_mut().find(|w| w.binding == write.binding) {
            Some(existing) if existing.same_resource(&write) => {
                existing.dynamic_offset = write.dynamic_offset;
            }
            Some(existing) => {
                *existing = write;
                self.cached[set] = None;
            }
            None => {
                // Keep writes ordered by binding so dynamic offsets line
                // up the way vkCmdBindDescriptorSets consumes them.
                let pos = slot.partition_point(|w| w.binding < write.binding);
                slot.insert(pos, write);
                self.cached[set] = None;
            }
        }
    }

    fn needs_build(&self, set: usize) -> bool {
        !self.writes[set].is_empty() && self.cached[set].is_none()
    }

    fn cached(&self, set: usize) -> Option<vk::DescriptorSet> {
        self.cached[set]
    }

    fn set_cached(&mut self, set: usize, descriptor_set: vk::DescriptorSet) {
        self.cached[set] = Some(descriptor_set);
    }

    fn dynamic_offsets(&self, set: usize) -> SmallVec<[u32; 4]> {
        self.writes[set]
            .iter()
            .filter(|w| w.is_dynamic)
            .map(|w| w.dynamic_offset)
            .collect()
    }
}

/// Binds named shader resources for draw calls, caching descriptor sets
/// across frames.
#[derive(Default)]
pub struct ShaderDescriptorBinder {
    effect: Option<Arc<ShaderEffect>>,
    table: WriteTable,
}

impl ShaderDescriptorBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to a new effect. Set slots whose structural hash differs
    /// from the previous effect's (or that have no bindings in either)
    /// lose their cached set and pending writes; matching slots keep both.
    pub fn set_shader(&mut self, effect: &Arc<ShaderEffect>) {
        let new_hashes = effect.set_hashes();

        for set in 0..MAX_DESCRIPTOR_SETS {
            let old_hash = self
                .effect
                .as_ref()
                .map(|e| e.set_hashes()[set])
                .unwrap_or(0);
            let new_hash = new_hashes[set];

            if old_hash != new_hash || old_hash == 0 || new_hash == 0 {
                self.table.reset_slot(set);
            }
        }

        self.effect = Some(effect.clone());
    }

    /// Bind a buffer to a named shader binding.
    pub fn bind_buffer(&mut self, name: &str, info: vk::DescriptorBufferInfo) {
        self.bind_buffer_internal(name, info, 0, false);
    }

    /// Bind a dynamic buffer to a named shader binding with an offset.
    pub fn bind_dynamic_buffer(&mut self, name: &str, dynamic_offset: u32, info: vk::DescriptorBufferInfo) {
        self.bind_buffer_internal(name, info, dynamic_offset, true);
    }

    fn bind_buffer_internal(
        &mut self,
        name: &str,
        info: vk::DescriptorBufferInfo,
        dynamic_offset: u32,
        is_dynamic: bool,
    ) {
        let Some(effect) = &self.effect else {
            log::error!("bind_buffer('{}') called with no shader effect bound", name);
            return;
        };
        let Some(reflected) = effect.find_binding(name) else {
            // The frame continues with whatever was bound at this slot.
            log::error!("shader binding '{}' not found in the bound effect", name);
            return;
        };

        self.table.record(reflected.set as usize, BufferWrite {
            binding: reflected.binding,
            descriptor_type: reflected.descriptor_type,
            buffer: info.buffer,
            offset: info.offset,
            range: info.range,
            dynamic_offset,
            is_dynamic,
        });
    }

    /// Allocate and write descriptor sets for every slot with pending
    /// writes and no valid cached set. Slots with a live cache are left
    /// untouched.
    pub fn build_sets(&mut self, allocator: &mut DescriptorSetAllocator) -> Result<(), vk::Result> {
        let Some(effect) = &self.effect else {
            return Ok(());
        };

        for set in 0..MAX_DESCRIPTOR_SETS {
            if !self.table.needs_build(set) {
                continue;
            }

            let layout = effect.set_layouts()[set];
            if layout == vk::DescriptorSetLayout::null() {
                log::error!("set {} has pending writes but the bound effect declares no layout for it", set);
                continue;
            }

            let descriptor_set = allocator.allocate(layout)?;

            let buffer_infos: SmallVec<[vk::DescriptorBufferInfo; 8]> = self.table.writes[set]
                .iter()
                .map(|w| {
                    vk::DescriptorBufferInfo::default()
                        .buffer(w.buffer)
                        .offset(w.offset)
                        .range(w.range)
                })
                .collect();

            let writes: SmallVec<[vk::WriteDescriptorSet; 8]> = self.table.writes[set]
                .iter()
                .zip(buffer_infos.iter())
                .map(|(w, info)| {
                    vk::WriteDescriptorSet::default()
                        .dst_set(descriptor_set)
                        .dst_binding(w.binding)
                        .dst_array_element(0)
                        .descriptor_type(w.descriptor_type)
                        .buffer_info(std::slice::from_ref(info))
                })
                .collect();

            unsafe {
                allocator.device.update_descriptor_sets(&writes, &[]);
            }

            self.table.set_cached(set, descriptor_set);
        }

        Ok(())
    }

    /// Bind every live descriptor set in ascending set-index order, with
    /// each set's accumulated dynamic offsets.
    pub fn apply_binds(&self, encoder: &CommandEncoder) {
        let Some(effect) = &self.effect else {
            return;
        };

        for set in 0..MAX_DESCRIPTOR_SETS {
            let Some(descriptor_set) = self.table.cached(set) else {
                continue;
            };

            let offsets = self.table.dynamic_offsets(set);
            encoder.bind_descriptor_sets(
                vk::PipelineBindPoint::GRAPHICS,
                effect.pipeline_layout(),
                set as u32,
                &[descriptor_set],
                &offsets,
            );
        }
    }

    /// The descriptor set currently cached for a logical set index.
    pub fn cached_set(&self, set: usize) -> Option<vk::DescriptorSet> {
        self.table.cached(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn write(binding: u32, buffer_raw: u64, dynamic_offset: u32) -> BufferWrite {
        BufferWrite {
            binding,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            buffer: vk::Buffer::from_raw(buffer_raw),
            offset: 0,
            range: 256,
            dynamic_offset,
            is_dynamic: true,
        }
    }

    #[test]
    fn offset_only_change_keeps_cached_set() {
        let mut table = WriteTable::default();

        table.record(0, write(0, 0xA, 0));
        assert!(table.needs_build(0));

        let set = vk::DescriptorSet::from_raw(0x1234);
        table.set_cached(0, set);
        assert!(!table.needs_build(0));

        // Same buffer, new dynamic offset: the cached set must survive.
        table.record(0, write(0, 0xA, 512));
        assert_eq!(table.cached(0), Some(set));
        assert!(!table.needs_build(0));
        assert_eq!(table.dynamic_offsets(0).as_slice(), &[512]);
    }

    #[test]
    fn resource_change_invalidates_cached_set() {
        let mut table = WriteTable::default();

        table.record(0, write(0, 0xA, 0));
        table.set_cached(0, vk::DescriptorSet::from_raw(0x1234));

        // A different buffer handle must force a rebuild.
        table.record(0, write(0, 0xB, 0));
        assert_eq!(table.cached(0), None);
        assert!(table.needs_build(0));
    }

    #[test]
    fn new_binding_invalidates_cached_set() {
        let mut table = WriteTable::default();

        table.record(1, write(0, 0xA, 0));
        table.set_cached(1, vk::DescriptorSet::from_raw(0x1));

        table.record(1, write(1, 0xC, 0));
        assert_eq!(table.cached(1), None);
    }

    #[test]
    fn dynamic_offsets_follow_binding_order() {
        let mut table = WriteTable::default();

        table.record(0, write(2, 0xC, 300));
        table.record(0, write(0, 0xA, 100));
        table.record(0, write(1, 0xB, 200));

        assert_eq!(table.dynamic_offsets(0).as_slice(), &[100, 200, 300]);
    }

    #[test]
    fn reset_slot_clears_writes_and_cache() {
        let mut table = WriteTable::default();

        table.record(2, write(0, 0xA, 0));
        table.set_cached(2, vk::DescriptorSet::from_raw(0x1));

        table.reset_slot(2);
        assert!(!table.needs_build(2));
        assert_eq!(table.cached(2), None);
        assert!(table.dynamic_offsets(2).is_empty());
    }
}
