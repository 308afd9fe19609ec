//! File loading helpers.

use std::fs::File;
use std::path::Path;
use anyhow::Result;
use memmap2::Mmap;

/// Map a file into memory for reading.
///
/// The mapping stays valid as long as the returned value is alive; the
/// caller must not expect the file to be mutable underneath it.
pub fn load_with_memory_mapping(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}
