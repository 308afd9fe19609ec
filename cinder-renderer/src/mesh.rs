//! GPU-resident meshes.

use std::path::Path;
use std::sync::Arc;
use anyhow::{anyhow, Context, Result};
use bytemuck::{Pod, Zeroable};
use cinder_asset::{load_binary_file, read_mesh_info, unpack_mesh, MeshBounds, Vertex, VertexFormat};
use cinder_core::log;
use cinder_rhi::{vk, Buffer, BufferDesc, ImmediateCommandEncoder, RenderDevice, UploadPool, VertexLayout};

/// Vertex layout the mesh pipelines consume. Matches the baked PNCV_F32
/// format byte for byte, so unpacked payloads cast straight into it.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, VertexLayout)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

impl From<Vertex> for MeshVertex {
    fn from(v: Vertex) -> Self {
        Self {
            position: v.position,
            normal: v.normal,
            color: v.color,
            uv: v.uv,
        }
    }
}

/// Vertex and index buffers of one mesh, uploaded to device-local memory.
pub struct GpuMesh {
    pub vertex_buffer: Arc<Buffer>,
    pub index_buffer: Arc<Buffer>,
    pub index_count: u32,
    pub bounds: MeshBounds,
}

impl GpuMesh {
    /// Upload raw vertex/index bytes into device-local buffers.
    #[profiling::function]
    pub fn upload(
        device: &RenderDevice,
        immediate: &ImmediateCommandEncoder,
        upload: &mut UploadPool,
        name: &str,
        vertex_bytes: &[u8],
        index_bytes: &[u8],
        index_count: u32,
        bounds: MeshBounds,
    ) -> Result<Self> {
        let vertex_buffer = Arc::new(Buffer::new(
            device,
            &BufferDesc::vertex(&format!("{name}.vertices"), vertex_bytes.len() as vk::DeviceSize),
        )?);
        let index_buffer = Arc::new(Buffer::new(
            device,
            &BufferDesc::index(&format!("{name}.indices"), index_bytes.len() as vk::DeviceSize),
        )?);

        upload.upload_buffer(
            immediate,
            vertex_buffer.clone(),
            0,
            vertex_bytes,
            vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT,
            vk::AccessFlags2::VERTEX_ATTRIBUTE_READ,
        )?;
        upload.upload_buffer(
            immediate,
            index_buffer.clone(),
            0,
            index_bytes,
            vk::PipelineStageFlags2::INDEX_INPUT,
            vk::AccessFlags2::INDEX_READ,
        )?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count,
            bounds,
        })
    }

    /// Load a baked `.mesh` asset and upload it.
    ///
    /// Failures are reported to the caller; a missing or corrupt file
    /// must not take the process down.
    #[profiling::function]
    pub fn from_asset(
        device: &RenderDevice,
        immediate: &ImmediateCommandEncoder,
        upload: &mut UploadPool,
        path: &Path,
    ) -> Result<Self> {
        let file = load_binary_file(path)
            .with_context(|| format!("loading mesh asset {:?}", path))?;
        let info = read_mesh_info(&file)
            .with_context(|| format!("parsing mesh metadata of {:?}", path))?;

        if info.vertex_format != VertexFormat::PncvF32 {
            return Err(anyhow!("mesh {:?} has unsupported vertex format {:?}", path, info.vertex_format));
        }
        if info.index_size != 4 {
            return Err(anyhow!("mesh {:?} has unsupported index size {}", path, info.index_size));
        }

        let (vertex_bytes, index_bytes) = unpack_mesh(&info, &file.blob)
            .with_context(|| format!("unpacking mesh payload of {:?}", path))?;

        let index_count = (index_bytes.len() / std::mem::size_of::<u32>()) as u32;
        log::info!(
            "loaded mesh {:?}: {} vertices, {} indices",
            path,
            vertex_bytes.len() / std::mem::size_of::<MeshVertex>(),
            index_count
        );

        let name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        Self::upload(device, immediate, upload, &name, &vertex_bytes, &index_bytes, index_count, info.bounds)
    }

    /// Upload an in-memory vertex/index list.
    pub fn from_vertices(
        device: &RenderDevice,
        immediate: &ImmediateCommandEncoder,
        upload: &mut UploadPool,
        name: &str,
        vertices: &[MeshVertex],
        indices: &[u32],
    ) -> Result<Self> {
        let asset_vertices: Vec<Vertex> = vertices
            .iter()
            .map(|v| Vertex {
                position: v.position,
                normal: v.normal,
                color: v.color,
                uv: v.uv,
            })
            .collect();
        let bounds = cinder_asset::calculate_bounds(&asset_vertices);

        Self::upload(
            device,
            immediate,
            upload,
            name,
            bytemuck::cast_slice(vertices),
            bytemuck::cast_slice(indices),
            indices.len() as u32,
            bounds,
        )
    }
}
