//! The per-frame mesh draw path.
//!
//! Owns the descriptor machinery (layout cache, static + per-frame
//! allocators, the shader binder) and the shared per-frame data buffers.
//! Camera and object data live in one buffer each, sliced per frame in
//! flight and bound through dynamic offsets, so a new frame normally
//! changes only the offsets and reuses every cached descriptor set.

use bytemuck::bytes_of;
use cinder_rhi::{
    vk, Buffer, BufferDesc, CommandEncoder, DescriptorLayoutCache, DescriptorSetAllocator,
    DescriptorSetBuilder, ReflectionOverride, RenderDevice, ShaderDescriptorBinder,
};
use crate::frame::{
    pad_storage_buffer_size, pad_uniform_buffer_size, FrameResources, GpuCameraData,
    GpuObjectData, GpuSceneData, MAX_OBJECTS,
};
use crate::registry::RenderRegistry;
use crate::scene::{RenderObject, RenderScene};

/// Logical set indices the mesh shaders use.
const SCENE_SET_INDEX: u32 = 2;
const TEXTURE_SET_INDEX: u32 = 3;

pub struct MeshRenderer {
    layout_cache: DescriptorLayoutCache,
    /// Allocator for sets cached across frames: binder sets and material
    /// texture sets. Never reset while the renderer is alive.
    static_allocator: DescriptorSetAllocator,
    binder: ShaderDescriptorBinder,
    scene: RenderScene,

    frames: Vec<FrameResources>,

    camera_buffer: Buffer,
    scene_buffer: Buffer,
    object_buffer: Buffer,
    camera_stride: u64,
    scene_stride: u64,
    object_block: u64,

    object_scratch: Vec<GpuObjectData>,
}

impl MeshRenderer {
    pub fn new(device: &RenderDevice) -> Result<Self, vk::Result> {
        let num_frames = device.num_frames() as u64;

        let camera_stride = pad_uniform_buffer_size(device, std::mem::size_of::<GpuCameraData>() as u64);
        let scene_stride = pad_uniform_buffer_size(device, std::mem::size_of::<GpuSceneData>() as u64);
        let object_block = pad_storage_buffer_size(
            device,
            (MAX_OBJECTS * std::mem::size_of::<GpuObjectData>()) as u64,
        );

        let camera_buffer = Buffer::new(device, &BufferDesc::uniform("frame.camera", camera_stride * num_frames))?;
        let scene_buffer = Buffer::new(device, &BufferDesc::uniform("frame.scene_params", scene_stride * num_frames))?;
        let object_buffer = Buffer::new(device, &BufferDesc::storage("frame.objects", object_block * num_frames))?;

        let frames = (0..num_frames).map(|_| FrameResources::new(device)).collect();

        Ok(Self {
            layout_cache: DescriptorLayoutCache::new(device),
            static_allocator: DescriptorSetAllocator::new(device),
            binder: ShaderDescriptorBinder::new(),
            scene: RenderScene::new(),
            frames,
            camera_buffer,
            scene_buffer,
            object_buffer,
            camera_stride,
            scene_stride,
            object_block,
            object_scratch: Vec::new(),
        })
    }

    /// Overrides applied when reflecting mesh shader effects: per-frame
    /// data is bound through dynamic offsets, which the shader source
    /// cannot express.
    pub fn reflection_overrides() -> Vec<ReflectionOverride> {
        vec![
            ReflectionOverride::new("camera_data", vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC),
            ReflectionOverride::new("object_data", vk::DescriptorType::STORAGE_BUFFER_DYNAMIC),
        ]
    }

    /// The caches material creation needs: the shared layout cache and
    /// the static (never-reset) allocator.
    pub fn descriptor_resources(&mut self) -> (&mut DescriptorLayoutCache, &mut DescriptorSetAllocator) {
        (&mut self.layout_cache, &mut self.static_allocator)
    }

    pub fn layout_cache_mut(&mut self) -> &mut DescriptorLayoutCache {
        &mut self.layout_cache
    }

    /// Record draws for the frame's renderables.
    ///
    /// Must run between the frame fence wait and submission, on the
    /// render thread.
    #[profiling::function]
    pub fn draw(
        &mut self,
        encoder: &CommandEncoder,
        registry: &RenderRegistry,
        objects: &[RenderObject],
        camera: &GpuCameraData,
        scene_params: &GpuSceneData,
        frame_index: usize,
    ) -> Result<(), vk::Result> {
        // The frame fence has signaled; sets handed out for this frame
        // slot last time are no longer in flight.
        self.frames[frame_index].transient_allocator.reset_pools()?;

        self.scene.build_instances(objects);
        if self.scene.instances().is_empty() {
            return Ok(());
        }

        let camera_offset = self.camera_stride * frame_index as u64;
        let scene_offset = self.scene_stride * frame_index as u64;
        let object_offset = self.object_block * frame_index as u64;

        self.camera_buffer.write_at(camera_offset, bytes_of(camera))?;
        self.scene_buffer.write_at(scene_offset, bytes_of(scene_params))?;

        // Object data is indexed by draw slot (firstInstance + instance
        // index), so it goes out in sorted order.
        self.object_scratch.clear();
        let transforms = self.scene.transforms();
        self.object_scratch.extend(
            self.scene
                .instance_data()
                .iter()
                .map(|&object_index| GpuObjectData {
                    model: transforms[object_index as usize],
                }),
        );
        self.object_buffer
            .write_at(object_offset, bytemuck::cast_slice(&self.object_scratch))?;

        // The scene parameter set is rebuilt from the transient allocator
        // every frame; its layout comes from the shared cache, so it is
        // identical to the one reflection derived for the pipelines.
        let scene_info = vk::DescriptorBufferInfo::default()
            .buffer(self.scene_buffer.handle())
            .offset(scene_offset)
            .range(std::mem::size_of::<GpuSceneData>() as u64);
        let (scene_set, _) = DescriptorSetBuilder::new(
            &mut self.layout_cache,
            &mut self.frames[frame_index].transient_allocator,
        )
        .bind_buffer(
            0,
            scene_info,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        )
        .build()?;

        let camera_info = vk::DescriptorBufferInfo::default()
            .buffer(self.camera_buffer.handle())
            .offset(0)
            .range(std::mem::size_of::<GpuCameraData>() as u64);
        let object_info = vk::DescriptorBufferInfo::default()
            .buffer(self.object_buffer.handle())
            .offset(0)
            .range(self.object_block);

        let mut last_material = None;
        let mut last_mesh = None;

        for batch in self.scene.instances() {
            let material = registry.material(batch.material);

            if last_material != Some(batch.material) {
                encoder.bind_graphics_pipeline(material.pipeline.pipeline());

                self.binder.set_shader(&material.effect);
                self.binder.bind_dynamic_buffer("camera_data", camera_offset as u32, camera_info);
                self.binder.bind_dynamic_buffer("object_data", object_offset as u32, object_info);
                self.binder.build_sets(&mut self.static_allocator)?;
                self.binder.apply_binds(encoder);

                encoder.bind_descriptor_sets(
                    vk::PipelineBindPoint::GRAPHICS,
                    material.effect.pipeline_layout(),
                    SCENE_SET_INDEX,
                    &[scene_set],
                    &[],
                );
                if let Some(texture_set) = material.texture_set {
                    encoder.bind_descriptor_sets(
                        vk::PipelineBindPoint::GRAPHICS,
                        material.effect.pipeline_layout(),
                        TEXTURE_SET_INDEX,
                        &[texture_set],
                        &[],
                    );
                }

                last_material = Some(batch.material);
            }

            if last_mesh != Some(batch.mesh) {
                let mesh = registry.mesh(batch.mesh);
                encoder.bind_vertex_buffers(0, &[mesh.vertex_buffer.handle()], &[0]);
                encoder.bind_index_buffer(mesh.index_buffer.handle(), 0, vk::IndexType::UINT32);
                last_mesh = Some(batch.mesh);
            }

            let mesh = registry.mesh(batch.mesh);
            encoder.draw_indexed(mesh.index_count, batch.count, 0, 0, batch.first);
        }

        Ok(())
    }
}
