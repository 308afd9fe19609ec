//! Baked asset container format.
//!
//! Every baked asset is one file with a fixed header:
//!
//! ```text
//! offset 0:  4 bytes   type tag ("TEXI" | "MESH"), not NUL-terminated
//! offset 4:  4 bytes   u32 version (little endian)
//! offset 8:  4 bytes   u32 json length
//! offset 12: 4 bytes   u32 blob length
//! offset 16: json, then the (possibly compressed) binary blob
//! ```
//!
//! The JSON block carries the typed metadata; the blob carries the
//! payload. Loaders must check the returned `Result` — a malformed file
//! is reported, never fatal.

use std::fs::File;
use std::io::Write;
use std::path::Path;

pub mod mesh;
pub mod texture;

pub use mesh::{calculate_bounds, pack_mesh, read_mesh_info, unpack_mesh, MeshBounds, MeshInfo, Vertex, VertexFormat};
pub use texture::{pack_texture, read_texture_info, unpack_texture, TextureFormat, TextureInfo};

/// Current container version.
pub const ASSET_VERSION: u32 = 1;

const HEADER_SIZE: usize = 16;

/// Errors from reading or writing baked assets.
#[derive(Debug)]
pub enum AssetError {
    Io(std::io::Error),
    /// File ends before the header (or the lengths it declares) are complete.
    Truncated,
    UnsupportedVersion(u32),
    WrongType { expected: [u8; 4], found: [u8; 4] },
    Json(serde_json::Error),
    Decompression(String),
}

impl From<std::io::Error> for AssetError {
    fn from(e: std::io::Error) -> Self {
        AssetError::Io(e)
    }
}

impl From<serde_json::Error> for AssetError {
    fn from(e: serde_json::Error) -> Self {
        AssetError::Json(e)
    }
}

impl std::fmt::Display for AssetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetError::Io(e) => write!(f, "IO error: {}", e),
            AssetError::Truncated => write!(f, "Asset file is truncated"),
            AssetError::UnsupportedVersion(v) => write!(f, "Unsupported asset version {}", v),
            AssetError::WrongType { expected, found } => write!(
                f,
                "Wrong asset type: expected {:?}, found {:?}",
                String::from_utf8_lossy(expected),
                String::from_utf8_lossy(found)
            ),
            AssetError::Json(e) => write!(f, "Malformed asset metadata: {}", e),
            AssetError::Decompression(msg) => write!(f, "Blob decompression failed: {}", msg),
        }
    }
}

impl std::error::Error for AssetError {}

/// Compression applied to an asset blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    None,
    Lz4,
}

impl CompressionMode {
    pub fn parse(s: &str) -> Self {
        if s == "LZ4" {
            CompressionMode::Lz4
        } else {
            CompressionMode::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionMode::None => "None",
            CompressionMode::Lz4 => "LZ4",
        }
    }
}

/// An in-memory baked asset: header fields, metadata JSON, payload blob.
#[derive(Debug, Clone)]
pub struct AssetFile {
    pub tag: [u8; 4],
    pub version: u32,
    pub json: String,
    pub blob: Vec<u8>,
}

impl AssetFile {
    /// Parse an asset from raw file bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        if bytes.len() < HEADER_SIZE {
            return Err(AssetError::Truncated);
        }

        let tag = [bytes[0], bytes[1], bytes[2], bytes[3]];
        let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let json_len = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let blob_len = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;

        if version != ASSET_VERSION {
            return Err(AssetError::UnsupportedVersion(version));
        }

        let json_end = HEADER_SIZE + json_len;
        let blob_end = json_end + blob_len;
        if bytes.len() < blob_end {
            return Err(AssetError::Truncated);
        }

        let json = String::from_utf8(bytes[HEADER_SIZE..json_end].to_vec())
            .map_err(|_| AssetError::Truncated)?;
        let blob = bytes[json_end..blob_end].to_vec();

        Ok(Self {
            tag,
            version,
            json,
            blob,
        })
    }

    /// Serialize the asset to its on-disk byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.json.len() + self.blob.len());
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&(self.json.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.blob.len() as u32).to_le_bytes());
        out.extend_from_slice(self.json.as_bytes());
        out.extend_from_slice(&self.blob);
        out
    }

    fn expect_tag(&self, expected: [u8; 4]) -> Result<(), AssetError> {
        if self.tag != expected {
            return Err(AssetError::WrongType {
                expected,
                found: self.tag,
            });
        }
        Ok(())
    }
}

/// Write a baked asset to disk.
pub fn save_binary_file(path: &Path, file: &AssetFile) -> Result<(), AssetError> {
    let mut out = File::create(path)?;
    out.write_all(&file.to_bytes())?;
    Ok(())
}

/// Read a baked asset from disk.
#[profiling::function]
pub fn load_binary_file(path: &Path) -> Result<AssetFile, AssetError> {
    let mmap = cinder_core::file::load_with_memory_mapping(path)
        .map_err(|e| match e.downcast::<std::io::Error>() {
            Ok(io) => AssetError::Io(io),
            Err(other) => AssetError::Io(std::io::Error::other(other.to_string())),
        })?;

    AssetFile::from_bytes(&mmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_byte_exact() {
        let file = AssetFile {
            tag: *b"MESH",
            version: ASSET_VERSION,
            json: "{}".to_owned(),
            blob: vec![0xAB, 0xCD],
        };

        let bytes = file.to_bytes();
        assert_eq!(&bytes[0..4], b"MESH");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(bytes[12..16].try_into().unwrap()), 2);
        assert_eq!(&bytes[16..18], b"{}");
        assert_eq!(&bytes[18..20], &[0xAB, 0xCD]);
    }

    #[test]
    fn round_trips_through_bytes() {
        let file = AssetFile {
            tag: *b"TEXI",
            version: ASSET_VERSION,
            json: r#"{"format":"RGBA8"}"#.to_owned(),
            blob: (0..255u8).collect(),
        };

        let parsed = AssetFile::from_bytes(&file.to_bytes()).unwrap();
        assert_eq!(parsed.tag, file.tag);
        assert_eq!(parsed.version, file.version);
        assert_eq!(parsed.json, file.json);
        assert_eq!(parsed.blob, file.blob);
    }

    #[test]
    fn truncated_input_is_rejected() {
        let file = AssetFile {
            tag: *b"MESH",
            version: ASSET_VERSION,
            json: "{}".to_owned(),
            blob: vec![1, 2, 3, 4],
        };

        let mut bytes = file.to_bytes();
        bytes.truncate(bytes.len() - 2);

        assert!(matches!(AssetFile::from_bytes(&bytes), Err(AssetError::Truncated)));
        assert!(matches!(AssetFile::from_bytes(&bytes[..10]), Err(AssetError::Truncated)));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut bytes = AssetFile {
            tag: *b"MESH",
            version: ASSET_VERSION,
            json: String::new(),
            blob: Vec::new(),
        }
        .to_bytes();
        bytes[4..8].copy_from_slice(&7u32.to_le_bytes());

        assert!(matches!(AssetFile::from_bytes(&bytes), Err(AssetError::UnsupportedVersion(7))));
    }

    #[test]
    fn compression_mode_parses_known_strings() {
        assert_eq!(CompressionMode::parse("LZ4"), CompressionMode::Lz4);
        assert_eq!(CompressionMode::parse("None"), CompressionMode::None);
        assert_eq!(CompressionMode::parse("gzip"), CompressionMode::None);
    }
}
