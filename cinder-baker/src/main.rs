//! Offline asset baker.
//!
//! Usage: `cinder-baker <directory>`
//!
//! Walks the directory (non-recursively) and converts `.png` files to
//! `.tx` textures and `.obj` files to `.mesh` meshes, both LZ4
//! compressed. Per-file failures are logged and skipped; the exit code
//! does not distinguish partial failure.

use std::path::{Path, PathBuf};
use std::time::Instant;
use anyhow::{Context, Result};
use log::{error, info, warn};

use cinder_asset::{
    calculate_bounds, pack_mesh, pack_texture, save_binary_file, CompressionMode, MeshInfo,
    TextureFormat, TextureInfo, Vertex, VertexFormat,
};

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        error!("cinder-baker must be called with the asset directory path");
        std::process::exit(1);
    }

    let directory = PathBuf::from(&args[1]);
    let entries = match std::fs::read_dir(&directory) {
        Ok(entries) => entries,
        Err(e) => {
            error!("cannot read directory {:?}: {}", directory, e);
            std::process::exit(1);
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };

        match extension {
            "png" => {
                let output = path.with_extension("tx");
                match convert_image(&path, &output) {
                    Ok(()) => info!("baked texture {:?} -> {:?}", path, output),
                    Err(e) => error!("failed to bake {:?}: {:#}", path, e),
                }
            }
            "obj" => {
                let output = path.with_extension("mesh");
                match convert_mesh(&path, &output) {
                    Ok(()) => info!("baked mesh {:?} -> {:?}", path, output),
                    Err(e) => error!("failed to bake {:?}: {:#}", path, e),
                }
            }
            _ => {}
        }
    }
}

/// Convert a PNG into an RGBA8, LZ4-compressed `.tx` asset.
fn convert_image(input: &Path, output: &Path) -> Result<()> {
    let start = Instant::now();

    let image = image::open(input).with_context(|| format!("decoding {:?}", input))?;
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let pixels = rgba.into_raw();

    let info = TextureInfo {
        format: TextureFormat::Rgba8,
        compression: CompressionMode::Lz4,
        width,
        height,
        size: pixels.len() as u64,
        original_file: input.to_string_lossy().into_owned(),
    };

    let file = pack_texture(&info, &pixels)?;
    save_binary_file(output, &file)?;

    info!(
        "texture {}x{} compressed {} -> {} bytes in {:?}",
        width,
        height,
        pixels.len(),
        file.blob.len(),
        start.elapsed()
    );
    Ok(())
}

/// Convert an OBJ into a PNCV_F32, LZ4-compressed `.mesh` asset.
fn convert_mesh(input: &Path, output: &Path) -> Result<()> {
    let start = Instant::now();

    let load_options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };
    let (models, _materials) = tobj::load_obj(input, &load_options)
        .with_context(|| format!("parsing {:?}", input))?;

    let mut vertices: Vec<Vertex> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();

    for model in &models {
        let mesh = &model.mesh;
        let vertex_count = mesh.positions.len() / 3;

        if mesh.normals.is_empty() {
            warn!("model '{}' in {:?} has no normals", model.name, input);
        }
        if mesh.texcoords.is_empty() {
            warn!("model '{}' in {:?} has no texture coordinates", model.name, input);
        }

        let base_vertex = vertices.len() as u32;
        for i in 0..vertex_count {
            let normal = if mesh.normals.is_empty() {
                [0.0, 0.0, 1.0]
            } else {
                [mesh.normals[3 * i], mesh.normals[3 * i + 1], mesh.normals[3 * i + 2]]
            };
            let uv = if mesh.texcoords.is_empty() {
                [0.0, 0.0]
            } else {
                // Flip v for Vulkan's texture coordinate origin.
                [mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1]]
            };

            vertices.push(Vertex {
                position: [
                    mesh.positions[3 * i],
                    mesh.positions[3 * i + 1],
                    mesh.positions[3 * i + 2],
                ],
                normal,
                // Display the normal as the vertex color until materials
                // carry real vertex colors.
                color: normal,
                uv,
            });
        }

        indices.extend(mesh.indices.iter().map(|&i| base_vertex + i));
    }

    let bounds = calculate_bounds(&vertices);

    let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
    let index_bytes: &[u8] = bytemuck::cast_slice(&indices);

    let info = MeshInfo {
        vertex_format: VertexFormat::PncvF32,
        compression: CompressionMode::Lz4,
        vertex_buffer_size: vertex_bytes.len() as u64,
        index_buffer_size: index_bytes.len() as u64,
        index_size: 4,
        original_file: input.to_string_lossy().into_owned(),
        bounds,
    };

    let file = pack_mesh(&info, vertex_bytes, index_bytes)?;
    save_binary_file(output, &file)?;

    info!(
        "mesh with {} vertices / {} indices compressed {} -> {} bytes in {:?}",
        vertices.len(),
        indices.len(),
        vertex_bytes.len() + index_bytes.len(),
        file.blob.len(),
        start.elapsed()
    );
    Ok(())
}
