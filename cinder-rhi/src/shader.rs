//! Vulkan Shader - SPIR-V loading, reflection, and shader effects.
//!
//! A [`ShaderEffect`] owns the merged view of all stages of one pipeline:
//! descriptor set layouts derived from reflection, per-set structural
//! hashes, push constant ranges, and the pipeline layout.

use ash::{vk, Device};
use rspirv_reflect::{BindingCount, Reflection};
use std::ffi::CString;
use std::path::Path;
use cinder_core::collections::hashmap::HashMap;
use cinder_rhi_derive::DeviceObject;
use crate::descriptor::{DescriptorLayoutCache, LayoutBinding, LayoutSignature};
use crate::device::{set_debug_name_handle, DebuggableObject};
use crate::RenderDevice;

/// Logical descriptor set slots an effect can use.
pub const MAX_DESCRIPTOR_SETS: usize = 4;

/// Shader compilation and reflection errors.
#[derive(Debug)]
pub enum ShaderError {
    ReflectionFailed(String),
    /// Two stages declare the same (set, binding) with different
    /// descriptor types. There is no sane automatic resolution; the
    /// effect is rejected.
    BindingTypeConflict {
        set: u32,
        binding: u32,
        first: vk::DescriptorType,
        second: vk::DescriptorType,
    },
    SetIndexOutOfRange {
        set: u32,
    },
    VulkanError(vk::Result),
    IoError(std::io::Error),
}

impl From<vk::Result> for ShaderError {
    fn from(e: vk::Result) -> Self {
        ShaderError::VulkanError(e)
    }
}

impl From<std::io::Error> for ShaderError {
    fn from(e: std::io::Error) -> Self {
        ShaderError::IoError(e)
    }
}

impl std::fmt::Display for ShaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderError::ReflectionFailed(msg) => write!(f, "Shader reflection failed: {}", msg),
            ShaderError::BindingTypeConflict { set, binding, first, second } => write!(
                f,
                "Conflicting descriptor types at (set {}, binding {}): {:?} vs {:?}",
                set, binding, first, second
            ),
            ShaderError::SetIndexOutOfRange { set } => {
                write!(f, "Descriptor set index {} exceeds the {} supported sets", set, MAX_DESCRIPTOR_SETS)
            }
            ShaderError::VulkanError(e) => write!(f, "Vulkan error: {:?}", e),
            ShaderError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for ShaderError {}

/// Shader stage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// Convert to Vulkan shader stage flags.
    pub fn to_vk_stage(&self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }
}

/// A single shader resource binding, as declared in the source.
#[derive(Debug, Clone)]
pub struct ShaderBinding {
    pub name: String,
    pub set: u32,
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub stage_flags: vk::ShaderStageFlags,
    pub count: u32,
}

/// Reflection data for one shader stage.
#[derive(Debug, Clone, Default)]
pub struct ShaderReflection {
    pub bindings: Vec<ShaderBinding>,
    pub push_constant_offset: u32,
    pub push_constant_size: u32,
}

/// Reflect SPIR-V bytecode to extract resource bindings.
pub fn reflect_spirv(spirv: &[u8], stage: ShaderStage) -> Result<ShaderReflection, ShaderError> {
    if spirv.len() % 4 != 0 {
        return Err(ShaderError::ReflectionFailed("SPIR-V must be 4-byte aligned".to_string()));
    }

    let reflection = Reflection::new_from_spirv(spirv)
        .map_err(|e| ShaderError::ReflectionFailed(format!("{:?}", e)))?;

    let mut bindings = Vec::new();
    let stage_flags = stage.to_vk_stage();

    let descriptor_sets = reflection
        .get_descriptor_sets()
        .map_err(|e| ShaderError::ReflectionFailed(format!("{:?}", e)))?;

    for (set_index, set_bindings) in descriptor_sets.iter() {
        for (binding_index, binding_info) in set_bindings.iter() {
            let descriptor_type = convert_descriptor_type(binding_info.ty);
            let count = match &binding_info.binding_count {
                BindingCount::One => 1,
                BindingCount::StaticSized(n) => *n as u32,
                BindingCount::Unbounded => u32::MAX,
            };

            bindings.push(ShaderBinding {
                name: binding_info.name.clone(),
                set: *set_index,
                binding: *binding_index,
                descriptor_type,
                stage_flags,
                count,
            });
        }
    }

    let (push_constant_offset, push_constant_size) = reflection
        .get_push_constant_range()
        .map_err(|e| ShaderError::ReflectionFailed(format!("{:?}", e)))?
        .map(|info| (info.offset, info.size))
        .unwrap_or((0, 0));

    Ok(ShaderReflection {
        bindings,
        push_constant_offset,
        push_constant_size,
    })
}

/// Convert rspirv_reflect descriptor type to Vulkan descriptor type.
fn convert_descriptor_type(reflect_type: rspirv_reflect::DescriptorType) -> vk::DescriptorType {
    // DescriptorType is a transparent wrapper around u32, matching Vulkan values
    vk::DescriptorType::from_raw(reflect_type.0 as i32)
}

/// Create a Vulkan shader module from SPIR-V bytecode.
fn create_shader_module(device: &Device, spirv: &[u8]) -> Result<vk::ShaderModule, ShaderError> {
    if spirv.len() % 4 != 0 {
        return Err(ShaderError::ReflectionFailed("SPIR-V bytecode must be 4-byte aligned".to_string()));
    }

    let code: &[u32] = unsafe { std::slice::from_raw_parts(spirv.as_ptr() as *const u32, spirv.len() / 4) };

    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    let module = unsafe { device.create_shader_module(&create_info, None)? };

    Ok(module)
}

/// Compiled shader with Vulkan shader module and reflection data.
#[DeviceObject]
pub struct Shader {
    name: String,
    module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
    reflection: ShaderReflection,
}

impl Shader {
    /// Create a shader from pre-compiled SPIR-V bytecode.
    pub fn from_spirv(
        name: &str,
        device: &RenderDevice,
        spirv: &[u8],
        entry_point: &str,
        stage: ShaderStage,
    ) -> Result<Self, ShaderError> {
        let reflection = reflect_spirv(spirv, stage)?;
        let module = create_shader_module(device.handle(), spirv)?;

        let shader = Self {
            name: name.to_owned(),
            module,
            stage,
            entry_point: CString::new(entry_point).unwrap(),
            reflection,
            device: device.handle().clone(),
        };
        device.set_debug_name(&shader);
        Ok(shader)
    }

    /// Load a SPIR-V file from disk and create a shader.
    pub fn from_file(
        name: &str,
        device: &RenderDevice,
        path: &Path,
        entry_point: &str,
        stage: ShaderStage,
    ) -> Result<Self, ShaderError> {
        let spirv = std::fs::read(path)?;
        Self::from_spirv(name, device, &spirv, entry_point, stage)
    }

    #[inline]
    pub fn name(&self) -> &str { &self.name }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule { self.module }

    /// Get the shader stage.
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Get the entry point name.
    pub fn entry_point(&self) -> &CString {
        &self.entry_point
    }

    /// Get the shader reflection data.
    pub fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    /// Get Vulkan shader stage flags.
    pub fn vk_stage(&self) -> vk::ShaderStageFlags {
        self.stage.to_vk_stage()
    }
}

impl DebuggableObject for Shader {
    fn set_debug_name(&self, device: &RenderDevice) {
        set_debug_name_handle(device, self.module, self.name());
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Forces the descriptor type of a named binding, e.g. to turn a
/// reflected uniform buffer into a dynamic one.
#[derive(Debug, Clone)]
pub struct ReflectionOverride {
    pub name: String,
    pub descriptor_type: vk::DescriptorType,
}

impl ReflectionOverride {
    pub fn new(name: &str, descriptor_type: vk::DescriptorType) -> Self {
        Self {
            name: name.to_owned(),
            descriptor_type,
        }
    }
}

/// Where a named binding landed after merging all stages.
#[derive(Debug, Clone, Copy)]
pub struct ReflectedBinding {
    pub set: u32,
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
}

/// Merged per-set bindings and the name lookup table.
struct MergedLayout {
    per_set: [Vec<LayoutBinding>; MAX_DESCRIPTOR_SETS],
    by_name: HashMap<String, ReflectedBinding>,
}

/// Merge the reflections of every stage into per-set binding lists.
///
/// A binding present in several stages gets its stage flags OR'd; a type
/// disagreement between stages is an error.
fn merge_stage_bindings(
    stages: &[(vk::ShaderStageFlags, &ShaderReflection)],
    overrides: &[ReflectionOverride],
) -> Result<MergedLayout, ShaderError> {
    let mut merged: HashMap<(u32, u32), LayoutBinding> = HashMap::default();
    let mut by_name: HashMap<String, ReflectedBinding> = HashMap::default();

    for (stage_flags, reflection) in stages {
        for binding in &reflection.bindings {
            if binding.set >= MAX_DESCRIPTOR_SETS as u32 {
                return Err(ShaderError::SetIndexOutOfRange { set: binding.set });
            }

            let mut descriptor_type = binding.descriptor_type;
            for o in overrides {
                if o.name == binding.name {
                    descriptor_type = o.descriptor_type;
                }
            }

            let key = (binding.set, binding.binding);
            match merged.get_mut(&key) {
                Some(existing) => {
                    if existing.descriptor_type != descriptor_type {
                        return Err(ShaderError::BindingTypeConflict {
                            set: binding.set,
                            binding: binding.binding,
                            first: existing.descriptor_type,
                            second: descriptor_type,
                        });
                    }
                    existing.stage_flags |= *stage_flags;
                }
                None => {
                    merged.insert(key, LayoutBinding {
                        binding: binding.binding,
                        descriptor_type,
                        count: binding.count,
                        stage_flags: *stage_flags,
                    });
                }
            }

            by_name.entry(binding.name.clone()).or_insert(ReflectedBinding {
                set: binding.set,
                binding: binding.binding,
                descriptor_type,
            });
        }
    }

    let mut per_set: [Vec<LayoutBinding>; MAX_DESCRIPTOR_SETS] = Default::default();
    for ((set, _), binding) in merged {
        per_set[set as usize].push(binding);
    }
    for bindings in &mut per_set {
        bindings.sort_unstable_by_key(|b| b.binding);
    }

    Ok(MergedLayout { per_set, by_name })
}

struct EffectStage {
    module: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
    entry_point: CString,
}

/// The merged pipeline interface of a set of shader stages.
pub struct ShaderEffect {
    device: Device,
    stages: Vec<EffectStage>,

    bindings: HashMap<String, ReflectedBinding>,
    set_layouts: [vk::DescriptorSetLayout; MAX_DESCRIPTOR_SETS],
    /// Structural hash per logical set; 0 marks "no bindings".
    set_hashes: [u64; MAX_DESCRIPTOR_SETS],
    push_constant_ranges: Vec<vk::PushConstantRange>,
    pipeline_layout: vk::PipelineLayout,
}

impl ShaderEffect {
    /// Build an effect from its stages, deriving every set layout through
    /// the cache and creating the pipeline layout.
    ///
    /// The set layouts are owned by `cache`; the effect owns only the
    /// pipeline layout. The shaders must outlive the effect.
    pub fn new(
        device: &RenderDevice,
        cache: &mut DescriptorLayoutCache,
        shaders: &[&Shader],
        overrides: &[ReflectionOverride],
    ) -> Result<Self, ShaderError> {
        let per_stage: Vec<(vk::ShaderStageFlags, &ShaderReflection)> = shaders
            .iter()
            .map(|s| (s.vk_stage(), s.reflection()))
            .collect();

        let merged = merge_stage_bindings(&per_stage, overrides)?;

        let mut set_layouts = [vk::DescriptorSetLayout::null(); MAX_DESCRIPTOR_SETS];
        let mut set_hashes = [0u64; MAX_DESCRIPTOR_SETS];
        let mut last_used_set = None;

        for (index, bindings) in merged.per_set.iter().enumerate() {
            if bindings.is_empty() {
                continue;
            }
            let signature = LayoutSignature::new(bindings.clone());
            set_hashes[index] = signature.structural_hash();
            set_layouts[index] = cache.create_layout(bindings)?;
            last_used_set = Some(index);
        }

        // Pipeline layout wants a dense array; keep reflected set numbers
        // stable by plugging gaps with the cached empty layout.
        let mut dense_layouts = Vec::new();
        if let Some(last) = last_used_set {
            let empty_layout = cache.create_layout(&[])?;
            for layout in set_layouts.iter().take(last + 1) {
                dense_layouts.push(if *layout == vk::DescriptorSetLayout::null() {
                    empty_layout
                } else {
                    *layout
                });
            }
        }

        let mut push_constant_ranges = Vec::new();
        for (stage_flags, reflection) in &per_stage {
            if reflection.push_constant_size > 0 {
                push_constant_ranges.push(
                    vk::PushConstantRange::default()
                        .stage_flags(*stage_flags)
                        .offset(reflection.push_constant_offset)
                        .size(reflection.push_constant_size),
                );
            }
        }

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&dense_layouts)
            .push_constant_ranges(&push_constant_ranges);

        let pipeline_layout = unsafe { device.handle().create_pipeline_layout(&layout_info, None)? };

        let stages = shaders
            .iter()
            .map(|s| EffectStage {
                module: s.handle(),
                stage: s.vk_stage(),
                entry_point: s.entry_point().clone(),
            })
            .collect();

        Ok(Self {
            device: device.handle().clone(),
            stages,
            bindings: merged.by_name,
            set_layouts,
            set_hashes,
            push_constant_ranges,
            pipeline_layout,
        })
    }

    /// Resolve a named binding to its (set, binding, type) triple.
    pub fn find_binding(&self, name: &str) -> Option<&ReflectedBinding> {
        self.bindings.get(name)
    }

    #[inline]
    pub fn set_layouts(&self) -> &[vk::DescriptorSetLayout; MAX_DESCRIPTOR_SETS] {
        &self.set_layouts
    }

    #[inline]
    pub fn set_hashes(&self) -> &[u64; MAX_DESCRIPTOR_SETS] {
        &self.set_hashes
    }

    #[inline]
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    #[inline]
    pub fn push_constant_ranges(&self) -> &[vk::PushConstantRange] {
        &self.push_constant_ranges
    }

    /// Shader stage create infos for pipeline construction.
    pub fn stage_create_infos(&self) -> Vec<vk::PipelineShaderStageCreateInfo<'_>> {
        self.stages
            .iter()
            .map(|s| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(s.stage)
                    .module(s.module)
                    .name(&s.entry_point)
            })
            .collect()
    }
}

impl Drop for ShaderEffect {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reflection(bindings: Vec<ShaderBinding>) -> ShaderReflection {
        ShaderReflection {
            bindings,
            push_constant_offset: 0,
            push_constant_size: 0,
        }
    }

    fn shader_binding(name: &str, set: u32, binding: u32, ty: vk::DescriptorType, stage: vk::ShaderStageFlags) -> ShaderBinding {
        ShaderBinding {
            name: name.to_owned(),
            set,
            binding,
            descriptor_type: ty,
            stage_flags: stage,
            count: 1,
        }
    }

    #[test]
    fn merge_ors_stage_flags_for_shared_bindings() {
        let vs = reflection(vec![shader_binding(
            "camera_data", 0, 0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX,
        )]);
        let fs = reflection(vec![shader_binding(
            "camera_data", 0, 0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::FRAGMENT,
        )]);

        let merged = merge_stage_bindings(
            &[(vk::ShaderStageFlags::VERTEX, &vs), (vk::ShaderStageFlags::FRAGMENT, &fs)],
            &[],
        )
        .unwrap();

        assert_eq!(merged.per_set[0].len(), 1);
        assert_eq!(
            merged.per_set[0][0].stage_flags,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn merge_rejects_type_conflicts() {
        let vs = reflection(vec![shader_binding(
            "object_data", 1, 0,
            vk::DescriptorType::STORAGE_BUFFER,
            vk::ShaderStageFlags::VERTEX,
        )]);
        let fs = reflection(vec![shader_binding(
            "object_data", 1, 0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::FRAGMENT,
        )]);

        let result = merge_stage_bindings(
            &[(vk::ShaderStageFlags::VERTEX, &vs), (vk::ShaderStageFlags::FRAGMENT, &fs)],
            &[],
        );

        assert!(matches!(
            result,
            Err(ShaderError::BindingTypeConflict { set: 1, binding: 0, .. })
        ));
    }

    #[test]
    fn overrides_force_descriptor_type() {
        let vs = reflection(vec![shader_binding(
            "scene_data", 0, 1,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX,
        )]);

        let merged = merge_stage_bindings(
            &[(vk::ShaderStageFlags::VERTEX, &vs)],
            &[ReflectionOverride::new("scene_data", vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)],
        )
        .unwrap();

        assert_eq!(merged.per_set[0][0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC);
        assert_eq!(
            merged.by_name.get("scene_data").unwrap().descriptor_type,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
        );
    }

    #[test]
    fn merged_bindings_are_sorted_by_index() {
        let vs = reflection(vec![
            shader_binding("b", 0, 2, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
            shader_binding("a", 0, 0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
            shader_binding("c", 0, 1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::VERTEX),
        ]);

        let merged = merge_stage_bindings(&[(vk::ShaderStageFlags::VERTEX, &vs)], &[]).unwrap();

        let order: Vec<u32> = merged.per_set[0].iter().map(|b| b.binding).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn merge_rejects_out_of_range_sets() {
        let vs = reflection(vec![shader_binding(
            "too_far", 4, 0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX,
        )]);

        let result = merge_stage_bindings(&[(vk::ShaderStageFlags::VERTEX, &vs)], &[]);
        assert!(matches!(result, Err(ShaderError::SetIndexOutOfRange { set: 4 })));
    }
}
