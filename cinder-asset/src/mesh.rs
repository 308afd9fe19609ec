//! Mesh asset codec: PNCV_F32 vertex/index payloads with LZ4 compression.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use crate::{AssetError, AssetFile, CompressionMode, ASSET_VERSION};

const MESH_TAG: [u8; 4] = *b"MESH";

/// Interleaved vertex: position, normal, color, uv.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Unknown,
    PncvF32,
}

impl VertexFormat {
    fn parse(s: &str) -> Self {
        if s == "PNCV_F32" {
            VertexFormat::PncvF32
        } else {
            VertexFormat::Unknown
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            VertexFormat::PncvF32 => "PNCV_F32",
            VertexFormat::Unknown => "Unknown",
        }
    }
}

/// Axis-aligned box plus bounding sphere, both centered on `origin`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeshBounds {
    pub origin: [f32; 3],
    pub radius: f32,
    pub extents: [f32; 3],
}

/// Mesh metadata carried in the asset's JSON block.
#[derive(Debug, Clone)]
pub struct MeshInfo {
    pub vertex_format: VertexFormat,
    pub compression: CompressionMode,
    pub vertex_buffer_size: u64,
    pub index_buffer_size: u64,
    pub index_size: u8,
    pub original_file: String,
    pub bounds: MeshBounds,
}

/// Wire form of the metadata. Field names are the on-disk contract.
#[derive(Serialize, Deserialize)]
struct MeshMetadata {
    format: String,
    compression: String,
    #[serde(rename = "vertexBufferSize")]
    vertex_buffer_size: u64,
    #[serde(rename = "indexBufferSize")]
    index_buffer_size: u64,
    #[serde(rename = "indexSize")]
    index_size: u8,
    #[serde(rename = "originalFile")]
    original_file: String,
    /// origin xyz, radius, extents xyz
    bounds: [f32; 7],
}

/// Parse the mesh metadata from an asset file.
pub fn read_mesh_info(file: &AssetFile) -> Result<MeshInfo, AssetError> {
    file.expect_tag(MESH_TAG)?;

    let metadata: MeshMetadata = serde_json::from_str(&file.json)?;
    let b = metadata.bounds;

    Ok(MeshInfo {
        vertex_format: VertexFormat::parse(&metadata.format),
        compression: CompressionMode::parse(&metadata.compression),
        vertex_buffer_size: metadata.vertex_buffer_size,
        index_buffer_size: metadata.index_buffer_size,
        index_size: metadata.index_size,
        original_file: metadata.original_file,
        bounds: MeshBounds {
            origin: [b[0], b[1], b[2]],
            radius: b[3],
            extents: [b[4], b[5], b[6]],
        },
    })
}

/// Pack vertex and index data into an asset file, LZ4-compressing the
/// merged payload.
#[profiling::function]
pub fn pack_mesh(info: &MeshInfo, vertex_data: &[u8], index_data: &[u8]) -> Result<AssetFile, AssetError> {
    let mut merged = Vec::with_capacity(vertex_data.len() + index_data.len());
    merged.extend_from_slice(vertex_data);
    merged.extend_from_slice(index_data);

    let blob = lz4_flex::block::compress(&merged);

    let b = info.bounds;
    let metadata = MeshMetadata {
        format: info.vertex_format.as_str().to_owned(),
        compression: CompressionMode::Lz4.as_str().to_owned(),
        vertex_buffer_size: vertex_data.len() as u64,
        index_buffer_size: index_data.len() as u64,
        index_size: info.index_size,
        original_file: info.original_file.clone(),
        bounds: [
            b.origin[0], b.origin[1], b.origin[2],
            b.radius,
            b.extents[0], b.extents[1], b.extents[2],
        ],
    };

    Ok(AssetFile {
        tag: MESH_TAG,
        version: ASSET_VERSION,
        json: serde_json::to_string(&metadata)?,
        blob,
    })
}

/// Unpack the blob into separate vertex and index buffers.
#[profiling::function]
pub fn unpack_mesh(info: &MeshInfo, blob: &[u8]) -> Result<(Vec<u8>, Vec<u8>), AssetError> {
    let full_size = (info.vertex_buffer_size + info.index_buffer_size) as usize;

    let merged = match info.compression {
        CompressionMode::Lz4 => lz4_flex::block::decompress(blob, full_size)
            .map_err(|e| AssetError::Decompression(e.to_string()))?,
        CompressionMode::None => blob.to_vec(),
    };

    if merged.len() < full_size {
        return Err(AssetError::Truncated);
    }

    let vertex_end = info.vertex_buffer_size as usize;
    let vertices = merged[..vertex_end].to_vec();
    let indices = merged[vertex_end..full_size].to_vec();

    Ok((vertices, indices))
}

/// Compute the bounding box and exact bounding sphere of a vertex list.
pub fn calculate_bounds(vertices: &[Vertex]) -> MeshBounds {
    if vertices.is_empty() {
        return MeshBounds::default();
    }

    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];

    for v in vertices {
        for axis in 0..3 {
            min[axis] = min[axis].min(v.position[axis]);
            max[axis] = max[axis].max(v.position[axis]);
        }
    }

    let mut bounds = MeshBounds::default();
    for axis in 0..3 {
        bounds.extents[axis] = (max[axis] - min[axis]) / 2.0;
        bounds.origin[axis] = bounds.extents[axis] + min[axis];
    }

    // Second pass for the exact bounding sphere radius.
    let mut r2 = 0.0f32;
    for v in vertices {
        let offset = [
            v.position[0] - bounds.origin[0],
            v.position[1] - bounds.origin[1],
            v.position[2] - bounds.origin[2],
        ];
        let distance = offset[0] * offset[0] + offset[1] * offset[1] + offset[2] * offset[2];
        r2 = r2.max(distance);
    }
    bounds.radius = r2.sqrt();

    bounds
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(position: [f32; 3]) -> Vertex {
        Vertex {
            position,
            normal: [0.0, 0.0, 1.0],
            color: [1.0, 1.0, 1.0],
            uv: [0.0, 0.0],
        }
    }

    fn sample_info(vertex_len: usize, index_len: usize) -> MeshInfo {
        MeshInfo {
            vertex_format: VertexFormat::PncvF32,
            compression: CompressionMode::Lz4,
            vertex_buffer_size: vertex_len as u64,
            index_buffer_size: index_len as u64,
            index_size: 4,
            original_file: "meshes/cube.obj".to_owned(),
            bounds: MeshBounds {
                origin: [0.5, 0.5, 0.5],
                radius: 0.87,
                extents: [0.5, 0.5, 0.5],
            },
        }
    }

    #[test]
    fn pack_unpack_round_trip() {
        let vertices: Vec<Vertex> = (0..12)
            .map(|i| vertex([i as f32, (i * 2) as f32, -(i as f32)]))
            .collect();
        let indices: Vec<u32> = (0..12).collect();

        let vertex_bytes = bytemuck::cast_slice(&vertices);
        let index_bytes = bytemuck::cast_slice(&indices);

        let file = pack_mesh(&sample_info(vertex_bytes.len(), index_bytes.len()), vertex_bytes, index_bytes).unwrap();
        assert_eq!(&file.tag, b"MESH");

        let info = read_mesh_info(&file).unwrap();
        assert_eq!(info.compression, CompressionMode::Lz4);
        assert_eq!(info.vertex_format, VertexFormat::PncvF32);
        assert_eq!(info.vertex_buffer_size, vertex_bytes.len() as u64);

        let (unpacked_vertices, unpacked_indices) = unpack_mesh(&info, &file.blob).unwrap();
        assert_eq!(unpacked_vertices, vertex_bytes);
        assert_eq!(unpacked_indices, index_bytes);
    }

    #[test]
    fn round_trip_survives_disk_format() {
        let vertices = [vertex([1.0, 2.0, 3.0]), vertex([-1.0, -2.0, -3.0])];
        let indices: [u32; 3] = [0, 1, 0];
        let vertex_bytes = bytemuck::cast_slice(&vertices);
        let index_bytes = bytemuck::cast_slice(&indices);

        let packed = pack_mesh(&sample_info(vertex_bytes.len(), index_bytes.len()), vertex_bytes, index_bytes).unwrap();
        let reloaded = AssetFile::from_bytes(&packed.to_bytes()).unwrap();

        let info = read_mesh_info(&reloaded).unwrap();
        let (v, i) = unpack_mesh(&info, &reloaded.blob).unwrap();
        assert_eq!(v, vertex_bytes);
        assert_eq!(i, index_bytes);
    }

    #[test]
    fn metadata_preserves_bounds_and_names() {
        let file = pack_mesh(&sample_info(0, 0), &[], &[]).unwrap();
        let info = read_mesh_info(&file).unwrap();

        assert_eq!(info.original_file, "meshes/cube.obj");
        assert_eq!(info.bounds.origin, [0.5, 0.5, 0.5]);
        assert_eq!(info.bounds.radius, 0.87);
        assert_eq!(info.bounds.extents, [0.5, 0.5, 0.5]);
        assert_eq!(info.index_size, 4);
    }

    #[test]
    fn texture_tag_is_rejected() {
        let mut file = pack_mesh(&sample_info(0, 0), &[], &[]).unwrap();
        file.tag = *b"TEXI";
        assert!(matches!(read_mesh_info(&file), Err(AssetError::WrongType { .. })));
    }

    #[test]
    fn unknown_format_string_maps_to_unknown() {
        let mut file = pack_mesh(&sample_info(0, 0), &[], &[]).unwrap();
        file.json = file.json.replace("PNCV_F32", "PNCV_F16");
        let info = read_mesh_info(&file).unwrap();
        assert_eq!(info.vertex_format, VertexFormat::Unknown);
    }

    #[test]
    fn bounds_cover_all_vertices() {
        let vertices = [
            vertex([-2.0, 0.0, 0.0]),
            vertex([2.0, 0.0, 0.0]),
            vertex([0.0, -1.0, 3.0]),
        ];

        let bounds = calculate_bounds(&vertices);
        assert_eq!(bounds.origin[0], 0.0);
        assert_eq!(bounds.extents[0], 2.0);

        // Every vertex lies inside the sphere.
        for v in &vertices {
            let d2: f32 = (0..3)
                .map(|a| (v.position[a] - bounds.origin[a]).powi(2))
                .sum();
            assert!(d2.sqrt() <= bounds.radius + 1e-5);
        }
    }

    #[test]
    fn empty_vertex_list_produces_zero_bounds() {
        assert_eq!(calculate_bounds(&[]), MeshBounds::default());
    }
}
