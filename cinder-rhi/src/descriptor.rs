//! Descriptor set allocation, layout deduplication, and one-shot set building.

use ash::vk;
use cinder_rhi_derive::DeviceObject;
use std::hash::{Hash, Hasher};
use cinder_core::collections::hashmap::HashMap;
use crate::RenderDevice;

/// Sets carved from each pool before a new one is grabbed.
const SETS_PER_POOL: u32 = 1000;

/// Per-type descriptor weights, multiplied by [`SETS_PER_POOL`] to size a
/// pool. Reasonable defaults; tune per project if allocation patterns
/// differ wildly.
const POOL_SIZE_WEIGHTS: &[(vk::DescriptorType, f32)] = &[
    (vk::DescriptorType::SAMPLER, 0.5),
    (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4.0),
    (vk::DescriptorType::SAMPLED_IMAGE, 4.0),
    (vk::DescriptorType::STORAGE_IMAGE, 1.0),
    (vk::DescriptorType::UNIFORM_TEXEL_BUFFER, 1.0),
    (vk::DescriptorType::STORAGE_TEXEL_BUFFER, 1.0),
    (vk::DescriptorType::UNIFORM_BUFFER, 2.0),
    (vk::DescriptorType::STORAGE_BUFFER, 2.0),
    (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1.0),
    (vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, 1.0),
    (vk::DescriptorType::INPUT_ATTACHMENT, 0.5),
];

/// Grows a set of descriptor pools and hands out descriptor sets.
///
/// Every pool this allocator ever creates is in exactly one of
/// {current, used, free} until teardown. `reset_pools` makes all sets
/// allocated so far invalid; callers must not hold on to them across it.
#[DeviceObject]
pub struct DescriptorSetAllocator {
    current: Option<vk::DescriptorPool>,
    used: Vec<vk::DescriptorPool>,
    free: Vec<vk::DescriptorPool>,
}

impl DescriptorSetAllocator {
    pub fn new(device: &RenderDevice) -> Self {
        Self {
            current: None,
            used: Vec::new(),
            free: Vec::new(),
            device: device.handle().clone(),
        }
    }

    fn create_pool(&self) -> Result<vk::DescriptorPool, vk::Result> {
        let sizes: Vec<vk::DescriptorPoolSize> = POOL_SIZE_WEIGHTS
            .iter()
            .map(|&(ty, weight)| vk::DescriptorPoolSize {
                ty,
                descriptor_count: (weight * SETS_PER_POOL as f32) as u32,
            })
            .collect();

        let info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(SETS_PER_POOL)
            .pool_sizes(&sizes);

        unsafe { self.device.create_descriptor_pool(&info, None) }
    }

    /// Reuse a reset pool if one is available, otherwise create a new one.
    fn grab_pool(&mut self) -> Result<vk::DescriptorPool, vk::Result> {
        match self.free.pop() {
            Some(pool) => Ok(pool),
            None => self.create_pool(),
        }
    }

    fn try_allocate(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, vk::Result> {
        let layouts = [layout];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&info)? };
        Ok(sets[0])
    }

    /// Allocate one descriptor set of the given layout.
    ///
    /// Pool exhaustion and fragmentation trigger exactly one retry with a
    /// freshly grabbed pool; a second failure propagates. Any other
    /// allocation error propagates immediately — callers treat both as
    /// unrecoverable.
    pub fn allocate(&mut self, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet, vk::Result> {
        let current = match self.current {
            Some(pool) => pool,
            None => {
                let pool = self.grab_pool()?;
                self.current = Some(pool);
                pool
            }
        };

        match self.try_allocate(current, layout) {
            Ok(set) => Ok(set),
            Err(vk::Result::ERROR_FRAGMENTED_POOL | vk::Result::ERROR_OUT_OF_POOL_MEMORY) => {
                // Retire the exhausted pool and retry once with a fresh one.
                self.used.push(current);
                let pool = self.grab_pool()?;
                self.current = Some(pool);
                self.try_allocate(pool, layout)
            }
            Err(e) => Err(e),
        }
    }

    /// Reset every pool and move it to the free list. All previously
    /// allocated sets become invalid.
    pub fn reset_pools(&mut self) -> Result<(), vk::Result> {
        for pool in self.used.drain(..).chain(self.current.take()) {
            unsafe {
                self.device.reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())?;
            }
            self.free.push(pool);
        }
        Ok(())
    }

    /// Number of pools this allocator currently owns.
    pub fn pool_count(&self) -> usize {
        self.used.len() + self.free.len() + usize::from(self.current.is_some())
    }
}

impl Drop for DescriptorSetAllocator {
    fn drop(&mut self) {
        unsafe {
            for pool in self.used.drain(..).chain(self.free.drain(..)).chain(self.current.take()) {
                self.device.destroy_descriptor_pool(pool, None);
            }
        }
    }
}

/// One binding of a descriptor set layout.
#[derive(Debug, Clone)]
pub struct LayoutBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stage_flags: vk::ShaderStageFlags,
}

impl LayoutBinding {
    /// Pack the binding into one word for structural hashing.
    fn packed(&self) -> u64 {
        (self.binding as u64)
            | (self.descriptor_type.as_raw() as u64) << 8
            | (self.count as u64) << 16
            | (self.stage_flags.as_raw() as u64) << 32
    }
}

impl PartialEq for LayoutBinding {
    fn eq(&self, other: &Self) -> bool {
        self.binding == other.binding
            && self.descriptor_type == other.descriptor_type
            && self.count == other.count
            && self.stage_flags.as_raw() == other.stage_flags.as_raw()
    }
}

impl Eq for LayoutBinding {}

/// Structural identity of a descriptor set layout: the bindings sorted by
/// binding index. Two signatures built from permutations of the same
/// bindings compare and hash equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutSignature {
    bindings: Vec<LayoutBinding>,
}

impl LayoutSignature {
    pub fn new(mut bindings: Vec<LayoutBinding>) -> Self {
        bindings.sort_unstable_by_key(|b| b.binding);
        Self { bindings }
    }

    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Stable structural hash, used by the shader binder to detect when a
    /// different effect changes the layout of a logical set index.
    pub fn structural_hash(&self) -> u64 {
        cinder_core::collections::hash_value(self)
    }
}

impl Hash for LayoutSignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bindings.len().hash(state);
        for binding in &self.bindings {
            binding.packed().hash(state);
        }
    }
}

/// Deduplicates descriptor set layouts by structural signature.
///
/// Identical layouts requested twice return the same Vulkan handle; the
/// cache owns the layouts and lives as long as the renderer.
#[DeviceObject]
pub struct DescriptorLayoutCache {
    layouts: HashMap<LayoutSignature, vk::DescriptorSetLayout>,
}

impl DescriptorLayoutCache {
    pub fn new(device: &RenderDevice) -> Self {
        Self {
            layouts: HashMap::default(),
            device: device.handle().clone(),
        }
    }

    /// Get or create the layout for the given bindings. Input order does
    /// not matter; bindings are sorted by index before lookup.
    pub fn create_layout(&mut self, bindings: &[LayoutBinding]) -> Result<vk::DescriptorSetLayout, vk::Result> {
        let signature = LayoutSignature::new(bindings.to_vec());

        if let Some(layout) = self.layouts.get(&signature) {
            return Ok(*layout);
        }

        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = signature
            .bindings()
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.descriptor_type)
                    .descriptor_count(b.count)
                    .stage_flags(b.stage_flags)
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let layout = unsafe { self.device.create_descriptor_set_layout(&create_info, None)? };

        self.layouts.insert(signature, layout);
        Ok(layout)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

impl Drop for DescriptorLayoutCache {
    fn drop(&mut self) {
        unsafe {
            for layout in self.layouts.values() {
                self.device.destroy_descriptor_set_layout(*layout, None);
            }
        }
    }
}

enum PendingResource {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

struct PendingWrite {
    binding: u32,
    descriptor_type: vk::DescriptorType,
    resource: PendingResource,
}

/// Single-use fluent accumulator producing a written descriptor set.
///
/// `build` resolves the layout through the cache, allocates a set, then
/// flushes every pending write in one batched update. The builder is
/// consumed by `build` and cannot be reused.
pub struct DescriptorSetBuilder<'a> {
    cache: &'a mut DescriptorLayoutCache,
    allocator: &'a mut DescriptorSetAllocator,
    bindings: Vec<LayoutBinding>,
    writes: Vec<PendingWrite>,
}

impl<'a> DescriptorSetBuilder<'a> {
    pub fn new(cache: &'a mut DescriptorLayoutCache, allocator: &'a mut DescriptorSetAllocator) -> Self {
        Self {
            cache,
            allocator,
            bindings: Vec::new(),
            writes: Vec::new(),
        }
    }

    pub fn bind_buffer(
        mut self,
        binding: u32,
        info: vk::DescriptorBufferInfo,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(LayoutBinding {
            binding,
            descriptor_type,
            count: 1,
            stage_flags,
        });
        self.writes.push(PendingWrite {
            binding,
            descriptor_type,
            resource: PendingResource::Buffer(info),
        });
        self
    }

    pub fn bind_image(
        mut self,
        binding: u32,
        info: vk::DescriptorImageInfo,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(LayoutBinding {
            binding,
            descriptor_type,
            count: 1,
            stage_flags,
        });
        self.writes.push(PendingWrite {
            binding,
            descriptor_type,
            resource: PendingResource::Image(info),
        });
        self
    }

    pub fn build(self) -> Result<(vk::DescriptorSet, vk::DescriptorSetLayout), vk::Result> {
        let layout = self.cache.create_layout(&self.bindings)?;
        let set = self.allocator.allocate(layout)?;

        let writes: Vec<vk::WriteDescriptorSet> = self
            .writes
            .iter()
            .map(|pending| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(pending.binding)
                    .dst_array_element(0)
                    .descriptor_type(pending.descriptor_type);

                match &pending.resource {
                    PendingResource::Buffer(info) => write.buffer_info(std::slice::from_ref(info)),
                    PendingResource::Image(info) => write.image_info(std::slice::from_ref(info)),
                }
            })
            .collect();

        if !writes.is_empty() {
            unsafe {
                self.allocator.device.update_descriptor_sets(&writes, &[]);
            }
        }

        Ok((set, layout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(index: u32, ty: vk::DescriptorType, stages: vk::ShaderStageFlags) -> LayoutBinding {
        LayoutBinding {
            binding: index,
            descriptor_type: ty,
            count: 1,
            stage_flags: stages,
        }
    }

    #[test]
    fn signature_ignores_input_order() {
        let a = LayoutSignature::new(vec![
            binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
            binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT),
            binding(2, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::VERTEX),
        ]);
        let b = LayoutSignature::new(vec![
            binding(2, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::VERTEX),
            binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
            binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT),
        ]);

        assert_eq!(a, b);
        assert_eq!(a.structural_hash(), b.structural_hash());
    }

    #[test]
    fn signature_requires_exact_binding_match() {
        let base = LayoutSignature::new(vec![
            binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
        ]);

        let different_type = LayoutSignature::new(vec![
            binding(0, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, vk::ShaderStageFlags::VERTEX),
        ]);
        let different_stage = LayoutSignature::new(vec![
            binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT),
        ]);
        let different_count = LayoutSignature::new(vec![
            LayoutBinding {
                binding: 0,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                count: 4,
                stage_flags: vk::ShaderStageFlags::VERTEX,
            },
        ]);

        assert_ne!(base, different_type);
        assert_ne!(base, different_stage);
        assert_ne!(base, different_count);
        assert_ne!(base.structural_hash(), different_type.structural_hash());
        assert_ne!(base.structural_hash(), different_stage.structural_hash());
        assert_ne!(base.structural_hash(), different_count.structural_hash());
    }

    #[test]
    fn signature_hash_differs_from_empty() {
        let empty = LayoutSignature::new(Vec::new());
        let one = LayoutSignature::new(vec![
            binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
        ]);

        assert!(empty.is_empty());
        assert_ne!(empty.structural_hash(), one.structural_hash());
    }

    #[test]
    fn signature_distinguishes_equal_counts_with_different_bindings() {
        // Same number of bindings is not enough; every entry must match.
        let a = LayoutSignature::new(vec![
            binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
            binding(1, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
        ]);
        let b = LayoutSignature::new(vec![
            binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
            binding(2, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
        ]);

        assert_ne!(a, b);
        assert_ne!(a.structural_hash(), b.structural_hash());
    }
}
