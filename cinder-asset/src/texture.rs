//! Texture asset codec: RGBA8 pixel payloads with LZ4 compression.

use serde::{Deserialize, Serialize};
use crate::{AssetError, AssetFile, CompressionMode, ASSET_VERSION};

const TEXTURE_TAG: [u8; 4] = *b"TEXI";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Unknown,
    Rgba8,
}

impl TextureFormat {
    fn parse(s: &str) -> Self {
        if s == "RGBA8" {
            TextureFormat::Rgba8
        } else {
            TextureFormat::Unknown
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            TextureFormat::Rgba8 => "RGBA8",
            TextureFormat::Unknown => "Unknown",
        }
    }
}

/// Texture metadata carried in the asset's JSON block.
#[derive(Debug, Clone)]
pub struct TextureInfo {
    pub format: TextureFormat,
    pub compression: CompressionMode,
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub original_file: String,
}

/// Wire form of the metadata. Field names are the on-disk contract.
#[derive(Serialize, Deserialize)]
struct TextureMetadata {
    format: String,
    compression: String,
    width: u32,
    height: u32,
    buffer_size: u64,
    original_file: String,
}

/// Parse the texture metadata from an asset file.
pub fn read_texture_info(file: &AssetFile) -> Result<TextureInfo, AssetError> {
    file.expect_tag(TEXTURE_TAG)?;

    let metadata: TextureMetadata = serde_json::from_str(&file.json)?;

    Ok(TextureInfo {
        format: TextureFormat::parse(&metadata.format),
        compression: CompressionMode::parse(&metadata.compression),
        width: metadata.width,
        height: metadata.height,
        size: metadata.buffer_size,
        original_file: metadata.original_file,
    })
}

/// Pack pixel data into an asset file, LZ4-compressing the payload.
#[profiling::function]
pub fn pack_texture(info: &TextureInfo, pixels: &[u8]) -> Result<AssetFile, AssetError> {
    let blob = lz4_flex::block::compress(pixels);

    let metadata = TextureMetadata {
        format: info.format.as_str().to_owned(),
        compression: CompressionMode::Lz4.as_str().to_owned(),
        width: info.width,
        height: info.height,
        buffer_size: pixels.len() as u64,
        original_file: info.original_file.clone(),
    };

    Ok(AssetFile {
        tag: TEXTURE_TAG,
        version: ASSET_VERSION,
        json: serde_json::to_string(&metadata)?,
        blob,
    })
}

/// Unpack the blob into raw pixel data.
#[profiling::function]
pub fn unpack_texture(info: &TextureInfo, blob: &[u8]) -> Result<Vec<u8>, AssetError> {
    match info.compression {
        CompressionMode::Lz4 => lz4_flex::block::decompress(blob, info.size as usize)
            .map_err(|e| AssetError::Decompression(e.to_string())),
        CompressionMode::None => Ok(blob.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker_pixels(width: u32, height: u32) -> Vec<u8> {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                let on = (x + y) % 2 == 0;
                pixels.extend_from_slice(if on { &[255, 0, 255, 255] } else { &[0, 0, 0, 255] });
            }
        }
        pixels
    }

    #[test]
    fn pack_unpack_round_trip() {
        let pixels = checker_pixels(16, 16);
        let info = TextureInfo {
            format: TextureFormat::Rgba8,
            compression: CompressionMode::Lz4,
            width: 16,
            height: 16,
            size: pixels.len() as u64,
            original_file: "textures/grid.png".to_owned(),
        };

        let file = pack_texture(&info, &pixels).unwrap();
        assert_eq!(&file.tag, b"TEXI");

        let parsed = read_texture_info(&file).unwrap();
        assert_eq!(parsed.format, TextureFormat::Rgba8);
        assert_eq!(parsed.width, 16);
        assert_eq!(parsed.height, 16);
        assert_eq!(parsed.size, pixels.len() as u64);

        let unpacked = unpack_texture(&parsed, &file.blob).unwrap();
        assert_eq!(unpacked, pixels);
    }

    #[test]
    fn uncompressed_blob_passes_through() {
        let pixels = vec![9u8; 64];
        let info = TextureInfo {
            format: TextureFormat::Rgba8,
            compression: CompressionMode::None,
            width: 4,
            height: 4,
            size: 64,
            original_file: String::new(),
        };

        assert_eq!(unpack_texture(&info, &pixels).unwrap(), pixels);
    }

    #[test]
    fn mesh_tag_is_rejected() {
        let pixels = checker_pixels(2, 2);
        let info = TextureInfo {
            format: TextureFormat::Rgba8,
            compression: CompressionMode::Lz4,
            width: 2,
            height: 2,
            size: pixels.len() as u64,
            original_file: String::new(),
        };

        let mut file = pack_texture(&info, &pixels).unwrap();
        file.tag = *b"MESH";
        assert!(matches!(read_texture_info(&file), Err(AssetError::WrongType { .. })));
    }

    #[test]
    fn corrupt_blob_reports_decompression_error() {
        let pixels = checker_pixels(8, 8);
        let info = TextureInfo {
            format: TextureFormat::Rgba8,
            compression: CompressionMode::Lz4,
            width: 8,
            height: 8,
            size: pixels.len() as u64,
            original_file: String::new(),
        };

        let file = pack_texture(&info, &pixels).unwrap();
        let parsed = read_texture_info(&file).unwrap();

        let corrupt = &file.blob[..file.blob.len() / 2];
        assert!(matches!(unpack_texture(&parsed, corrupt), Err(AssetError::Decompression(_))));
    }
}
