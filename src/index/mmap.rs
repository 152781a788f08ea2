//! Shared read-only file mappings.

use crate::error::{IndexError, IoContext, Result};
use memmap2::Mmap;
use std::fs::File;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

/// A memory-mapped index file.
///
/// Cloning is cheap and shares the mapping; it is unmapped when the last
/// clone is dropped. Contents are only reachable through bounds-checked
/// accessors.
#[derive(Clone, Debug)]
pub struct MappedFile {
    name: Arc<str>,
    map: Option<Arc<Mmap>>,
}

impl MappedFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_path(path)?;
        let len = file.metadata().with_path(path)?.len();
        let name: Arc<str> = path
            .file_name()
            .map(|n| n.to_string_lossy().into())
            .unwrap_or_else(|| path.to_string_lossy().into());

        // Zero-length files cannot be mapped on every platform
        let map = if len == 0 {
            None
        } else {
            // Index files are immutable once written
            Some(Arc::new(unsafe { Mmap::map(&file) }.with_path(path)?))
        };
        Ok(Self { name, map })
    }

    /// File name, for error messages
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.map.as_ref().map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.map {
            Some(m) => &m[..],
            None => &[],
        }
    }

    /// The bytes in `range`, or `Corrupt` if it runs past the end.
    pub fn slice(&self, range: Range<usize>) -> Result<&[u8]> {
        let (start, end) = (range.start, range.end);
        self.bytes().get(range).ok_or_else(|| {
            IndexError::corrupt(
                self.name(),
                format!("range {start}..{end} outside of {} bytes", self.len()),
            )
        })
    }

    /// The little-endian u32 at `offset`.
    pub fn u32_at(&self, offset: usize) -> Result<u32> {
        crate::utils::read_u32_le(self.bytes(), offset).ok_or_else(|| {
            IndexError::corrupt(
                self.name(),
                format!("u32 at {offset} outside of {} bytes", self.len()),
            )
        })
    }

    pub fn corrupt(&self, reason: impl Into<String>) -> IndexError {
        IndexError::corrupt(self.name(), reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_bounds_checked_access() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, [1, 0, 0, 0, 2]).unwrap();

        let file = MappedFile::open(&path).unwrap();
        assert_eq!(file.name(), "data");
        assert_eq!(file.len(), 5);
        assert_eq!(file.u32_at(0).unwrap(), 1);
        assert!(file.u32_at(2).unwrap_err().is_corrupt());
        assert_eq!(file.slice(4..5).unwrap(), &[2]);
        assert!(file.slice(4..6).is_err());

        let shared = file.clone();
        drop(file);
        assert_eq!(shared.bytes()[4], 2);
    }

    #[test]
    fn test_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();

        let file = MappedFile::open(&path).unwrap();
        assert!(file.is_empty());
        assert_eq!(file.bytes(), &[] as &[u8]);
        assert!(file.slice(0..0).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = MappedFile::open(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, IndexError::Io { .. }));
    }
}
