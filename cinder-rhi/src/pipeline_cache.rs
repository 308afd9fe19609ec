//! Pipeline cache - deduplicates graphics pipelines by description.

use std::sync::Arc;
use ash::vk;
use ash::vk::Handle;
use cinder_core::collections::hashmap::HashMap;
use cinder_rhi_derive::DeviceObject;
use crate::pipeline::{GraphicPipeline, GraphicPipelineInfo};
use crate::RenderDevice;
use crate::device::DebuggableObject;
use crate::device::set_debug_name_handle;

/// Identity of a graphics pipeline, derived from its description. Two
/// requests with equal keys share one pipeline object.
#[derive(Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    layout: u64,
    modules: Vec<u64>,
    vertex_binding: Option<(u32, u32, i32)>,
    vertex_attributes: Vec<(u32, u32, i32, u32)>,
    topology: i32,
    polygon_mode: i32,
    cull_mode: u32,
    front_face: i32,
    depth: (bool, bool, i32),
    color_format: i32,
    depth_format: Option<i32>,
}

impl PipelineKey {
    fn from_info(layout: vk::PipelineLayout, info: &GraphicPipelineInfo) -> Self {
        Self {
            layout: layout.as_raw(),
            modules: info.stages.iter().map(|s| s.module.as_raw()).collect(),
            vertex_binding: info
                .vertex_binding
                .map(|b| (b.binding, b.stride, b.input_rate.as_raw())),
            vertex_attributes: info
                .vertex_attributes
                .iter()
                .map(|a| (a.location, a.binding, a.format.as_raw(), a.offset))
                .collect(),
            topology: info.topology.as_raw(),
            polygon_mode: info.polygon_mode.as_raw(),
            cull_mode: info.cull_mode.as_raw(),
            front_face: info.front_face.as_raw(),
            depth: (info.depth_test, info.depth_write, info.depth_compare.as_raw()),
            color_format: info.color_format.as_raw(),
            depth_format: info.depth_format.map(|f| f.as_raw()),
        }
    }
}

/// Pipeline cache for storing and reusing graphics pipelines.
#[DeviceObject]
pub struct PipelineCache {
    name: String,
    cache: vk::PipelineCache,
    pipelines: HashMap<PipelineKey, Arc<GraphicPipeline>>,
}

impl PipelineCache {
    /// Create a new pipeline cache.
    pub fn new(name: &str, device: &RenderDevice) -> Result<Self, vk::Result> {
        let cache_info = vk::PipelineCacheCreateInfo::default();
        let vk_cache = unsafe { device.handle().create_pipeline_cache(&cache_info, None)? };

        let pc = Self {
            name: name.to_owned(),
            cache: vk_cache,
            pipelines: HashMap::default(),
            device: device.handle().clone(),
        };
        device.set_debug_name(&pc);
        Ok(pc)
    }

    #[inline]
    pub fn name(&self) -> &str { &self.name }

    #[inline]
    pub fn handle(&self) -> vk::PipelineCache { self.cache }

    /// Get or create a graphics pipeline.
    pub fn get_or_create(
        &mut self,
        device: &RenderDevice,
        layout: vk::PipelineLayout,
        info: &GraphicPipelineInfo,
    ) -> Result<Arc<GraphicPipeline>, vk::Result> {
        let key = PipelineKey::from_info(layout, info);

        if let Some(cached) = self.pipelines.get(&key) {
            return Ok(cached.clone());
        }

        let pipeline = Arc::new(GraphicPipeline::new(device, layout, info, self.cache)?);
        self.pipelines.insert(key, pipeline.clone());
        Ok(pipeline)
    }

    /// Get cached pipeline data for serialization.
    pub fn get_cache_data(&self) -> Result<Vec<u8>, vk::Result> {
        unsafe { self.device.get_pipeline_cache_data(self.cache) }
    }

    /// Get the number of cached pipelines.
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Clear all cached pipelines.
    pub fn clear(&mut self) {
        self.pipelines.clear();
    }
}

impl DebuggableObject for PipelineCache {
    fn set_debug_name(&self, device: &RenderDevice) {
        set_debug_name_handle(device, self.cache, self.name());
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        self.clear();
        unsafe {
            self.device.destroy_pipeline_cache(self.cache, None);
        }
    }
}
