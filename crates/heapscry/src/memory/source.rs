//! Memory-mapped heap image file.
//!
//! The decoder works on one contiguous `&[u8]`; this maps the whole file
//! read-only so large images are not copied onto the heap.

use crate::error::DecodeResult;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A read-only heap image file.
///
/// # Example
///
/// ```rust,ignore
/// let file = ImageFile::open("mysterious_heap")?;
/// let report = heapscry::decode(file.bytes(), &DecodeConfig::default())?;
/// ```
pub struct ImageFile {
    path: PathBuf,
    /// None for empty files, which cannot be mapped.
    mmap: Option<Mmap>,
}

impl ImageFile {
    /// Open and map a heap image.
    pub fn open(path: impl AsRef<Path>) -> DecodeResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();

        let mmap = if size == 0 {
            None
        } else {
            // The image is only read; concurrent modification of the file is not supported.
            Some(unsafe { MmapOptions::new().map(&file)? })
        };

        debug!("mapped {} ({} bytes)", path.display(), size);
        Ok(ImageFile { path, mmap })
    }

    /// The whole file contents.
    pub fn bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
