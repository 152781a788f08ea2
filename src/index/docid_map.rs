//! The docid → file name table (`docid.map`).
//!
//! Layout: newline-terminated names in docid order, then one little-endian
//! u32 byte offset per name, then a trailing u32 holding the offset at which
//! that offset array starts.

use crate::error::{IndexError, Result};
use crate::index::mmap::MappedFile;
use crate::index::types::{DocId, DOCID_MAP_FILE};
use memchr::memchr_iter;
use std::io::Write;
use std::ops::Range;
use std::path::Path;

/// Appends names and writes the offset index on `finish`.
pub struct DocidMapWriter<W: Write> {
    inner: W,
    offsets: Vec<u32>,
    pos: u64,
}

fn too_large(pos: u64) -> IndexError {
    IndexError::corrupt(DOCID_MAP_FILE, format!("offset {pos} does not fit in 32 bits"))
}

impl<W: Write> DocidMapWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            offsets: Vec::new(),
            pos: 0,
        }
    }

    /// Append `name` and return the docid it was assigned.
    pub fn add(&mut self, name: &str) -> Result<DocId> {
        let offset = u32::try_from(self.pos).map_err(|_| too_large(self.pos))?;
        self.inner.write_all(name.as_bytes())?;
        self.inner.write_all(b"\n")?;
        let docid = self.offsets.len() as DocId;
        self.offsets.push(offset);
        self.pos += name.len() as u64 + 1;
        Ok(docid)
    }

    /// Append raw newline-terminated name records whose offsets are
    /// `offsets` relative to the start of `names`.
    pub fn append_raw(&mut self, names: &[u8], offsets: impl IntoIterator<Item = u32>) -> Result<()> {
        let base = self.pos;
        for offset in offsets {
            let abs = base + offset as u64;
            self.offsets
                .push(u32::try_from(abs).map_err(|_| too_large(abs))?);
        }
        self.inner.write_all(names)?;
        self.pos += names.len() as u64;
        Ok(())
    }

    /// Number of names written
    pub fn count(&self) -> u32 {
        self.offsets.len() as u32
    }

    /// Write the offset index and the trailer, returning the inner writer.
    pub fn finish(mut self) -> Result<W> {
        let index_start = u32::try_from(self.pos).map_err(|_| too_large(self.pos))?;
        let mut buf = Vec::with_capacity(self.offsets.len() * 4 + 4);
        for offset in &self.offsets {
            buf.extend_from_slice(&offset.to_le_bytes());
        }
        buf.extend_from_slice(&index_start.to_le_bytes());
        self.inner.write_all(&buf)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Read access to a `docid.map`.
///
/// Consecutive lookups of the same docid (the common case when walking a
/// posting list) are answered from a one-entry memo kept per instance.
#[derive(Clone, Debug)]
pub struct DocidMap {
    file: MappedFile,
    index_start: usize,
    count: u32,
    last: Option<(DocId, Range<usize>)>,
}

impl DocidMap {
    pub fn open(dir: &Path) -> Result<Self> {
        Self::from_mapped(MappedFile::open(&dir.join(DOCID_MAP_FILE))?)
    }

    pub(crate) fn from_mapped(file: MappedFile) -> Result<Self> {
        let len = file.len();
        if len < 4 {
            return Err(file.corrupt(format!("{len} bytes, too short for trailer")));
        }
        let index_start = file.u32_at(len - 4)? as usize;
        if index_start > len - 4 || (len - 4 - index_start) % 4 != 0 {
            return Err(file.corrupt(format!("bad index offset {index_start}")));
        }
        let count = ((len - 4 - index_start) / 4) as u32;
        Ok(Self {
            file,
            index_start,
            count,
            last: None,
        })
    }

    /// Number of documents
    pub fn count(&self) -> u32 {
        self.count
    }

    fn offset(&self, docid: DocId) -> Result<usize> {
        Ok(self.file.u32_at(self.index_start + 4 * docid as usize)? as usize)
    }

    fn name_range(&self, docid: DocId) -> Result<Range<usize>> {
        if docid >= self.count {
            return Err(IndexError::DocidOutOfRange {
                docid,
                count: self.count,
            });
        }
        let start = self.offset(docid)?;
        let next = if docid + 1 < self.count {
            self.offset(docid + 1)?
        } else {
            self.index_start
        };
        if start >= next || next > self.index_start {
            return Err(self.file.corrupt(format!(
                "docid {docid}: bad name range {start}..{next}"
            )));
        }
        Ok(start..next - 1)
    }

    /// The file name of `docid`.
    pub fn lookup(&mut self, docid: DocId) -> Result<&str> {
        let cached = self
            .last
            .as_ref()
            .filter(|(last, _)| *last == docid)
            .map(|(_, range)| range.clone());
        let range = match cached {
            Some(range) => range,
            None => {
                let range = self.name_range(docid)?;
                self.last = Some((docid, range.clone()));
                range
            }
        };
        let bytes = self.file.slice(range)?;
        std::str::from_utf8(bytes)
            .map_err(|_| self.file.corrupt(format!("docid {docid}: name is not UTF-8")))
    }

    /// Raw newline-terminated name records
    pub fn names_bytes(&self) -> &[u8] {
        &self.file.bytes()[..self.index_start]
    }

    /// Name offsets in docid order
    pub fn offsets(&self) -> impl Iterator<Item = Result<u32>> + '_ {
        (0..self.count).map(move |d| self.offset(d).map(|o| o as u32))
    }

    /// Iterate over every raw name record (without its newline).
    pub fn all(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let names = self.names_bytes();
        let mut start = 0;
        memchr_iter(b'\n', names).map(move |end| {
            let name = &names[start..end];
            start = end + 1;
            name
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn write_map(dir: &Path, names: &[&str]) {
        let file = File::create(dir.join(DOCID_MAP_FILE)).unwrap();
        let mut w = DocidMapWriter::new(file);
        for (i, name) in names.iter().enumerate() {
            assert_eq!(w.add(name).unwrap(), i as DocId);
        }
        w.finish().unwrap();
    }

    #[test]
    fn test_layout() {
        let mut w = DocidMapWriter::new(Vec::new());
        w.add("a").unwrap();
        w.add("bc").unwrap();
        let bytes = w.finish().unwrap();
        assert_eq!(
            bytes,
            [b"a\nbc\n".as_slice(), &[0, 0, 0, 0], &[2, 0, 0, 0], &[5, 0, 0, 0]].concat()
        );
    }

    #[test]
    fn test_lookup() {
        let dir = tempdir().unwrap();
        write_map(dir.path(), &["src/main.rs", "", "README.md"]);

        let mut map = DocidMap::open(dir.path()).unwrap();
        assert_eq!(map.count(), 3);
        assert_eq!(map.lookup(0).unwrap(), "src/main.rs");
        assert_eq!(map.lookup(0).unwrap(), "src/main.rs");
        assert_eq!(map.lookup(1).unwrap(), "");
        assert_eq!(map.lookup(2).unwrap(), "README.md");

        let err = map.lookup(3).unwrap_err();
        assert!(matches!(err, IndexError::DocidOutOfRange { docid: 3, count: 3 }));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_all() {
        let dir = tempdir().unwrap();
        write_map(dir.path(), &["a", "b/c", "d"]);
        let map = DocidMap::open(dir.path()).unwrap();
        let names: Vec<&[u8]> = map.all().collect();
        assert_eq!(names, vec![b"a".as_slice(), b"b/c", b"d"]);
        // restartable
        assert_eq!(map.all().count(), 3);
    }

    #[test]
    fn test_empty_map() {
        let dir = tempdir().unwrap();
        write_map(dir.path(), &[]);
        let mut map = DocidMap::open(dir.path()).unwrap();
        assert_eq!(map.count(), 0);
        assert!(map.lookup(0).unwrap_err().is_not_found());
        assert_eq!(map.all().count(), 0);
    }

    #[test]
    fn test_append_raw() {
        let mut w = DocidMapWriter::new(Vec::new());
        w.add("x").unwrap();
        w.append_raw(b"ab\ncd\n", [0, 3]).unwrap();
        assert_eq!(w.count(), 3);
        let bytes = w.finish().unwrap();

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(DOCID_MAP_FILE), bytes).unwrap();
        let mut map = DocidMap::open(dir.path()).unwrap();
        assert_eq!(map.lookup(1).unwrap(), "ab");
        assert_eq!(map.lookup(2).unwrap(), "cd");
    }

    #[test]
    fn test_corrupt_trailer() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(DOCID_MAP_FILE), [1, 0]).unwrap();
        assert!(DocidMap::open(dir.path()).unwrap_err().is_corrupt());

        std::fs::write(dir.path().join(DOCID_MAP_FILE), [0xff, 0, 0, 0]).unwrap();
        assert!(DocidMap::open(dir.path()).unwrap_err().is_corrupt());
    }
}
