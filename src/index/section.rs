//! Posting stores: a sorted meta file plus a data blob.
//!
//! Each meta record locates one trigram's data. A trigram's data runs from
//! its offset to the next record's offset (or the end of the blob for the
//! last record), so records carry no length.

use crate::error::{IndexError, IoContext, Result};
use crate::index::mmap::MappedFile;
use crate::index::pfor::{self, BLOCK_SIZE};
use crate::index::types::{MetaEntry, Section, Trigram};
use crate::utils::encoding::CountingWriter;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Writes sorted meta records.
pub struct MetaWriter<W: Write> {
    inner: W,
    last: Option<Trigram>,
    count: u64,
}

impl<W: Write> MetaWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            last: None,
            count: 0,
        }
    }

    pub fn push(&mut self, entry: MetaEntry) -> std::io::Result<()> {
        debug_assert!(
            self.last.is_none_or(|last| last < entry.trigram),
            "meta records must be strictly ascending"
        );
        self.last = Some(entry.trigram);
        self.count += 1;
        self.inner.write_all(&entry.to_bytes())
    }

    /// Number of records written
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn create_buffered(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_path(path)?;
    Ok(BufWriter::with_capacity(1 << 20, file))
}

/// Streams the codec-encoded integers of one posting store.
///
/// Call [`begin`](Self::begin) for each trigram in ascending order, feed its
/// integers with [`put`](Self::put), and close it with
/// [`end`](Self::end). Full blocks are encoded as soon as they fill up, so
/// memory use is bounded by one block.
pub struct SectionWriter<W: Write = BufWriter<File>> {
    meta: MetaWriter<W>,
    data: CountingWriter<W>,
    pending: Vec<u32>,
    scratch: Vec<u8>,
    current: Option<MetaEntry>,
    name: String,
}

impl SectionWriter<BufWriter<File>> {
    /// Create the meta and data files of `section` in `dir`.
    pub fn create(dir: &Path, section: Section) -> Result<Self> {
        let (meta, data) = section_paths(dir, section);
        let meta = create_buffered(&meta)?;
        let data = create_buffered(&data)?;
        Ok(Self::new(meta, data, section.data_file()))
    }
}

impl<W: Write> SectionWriter<W> {
    pub fn new(meta: W, data: W, name: &str) -> Self {
        Self {
            meta: MetaWriter::new(meta),
            data: CountingWriter::new(data),
            pending: Vec::with_capacity(BLOCK_SIZE),
            scratch: Vec::with_capacity(4 * BLOCK_SIZE + 8),
            current: None,
            name: name.to_string(),
        }
    }

    /// Start the integer run of `trigram`.
    pub fn begin(&mut self, trigram: Trigram) {
        debug_assert!(self.current.is_none(), "begin without end");
        self.current = Some(MetaEntry {
            trigram,
            entries: 0,
            offset: self.data.offset() as i64,
        });
    }

    #[inline]
    pub fn put(&mut self, value: u32) -> Result<()> {
        self.pending.push(value);
        if self.pending.len() == BLOCK_SIZE {
            self.write_pending()?;
        }
        Ok(())
    }

    pub fn put_all(&mut self, values: &[u32]) -> Result<()> {
        for &v in values {
            self.put(v)?;
        }
        Ok(())
    }

    fn write_pending(&mut self) -> Result<()> {
        self.scratch.clear();
        pfor::encode(&self.pending, &mut self.scratch);
        self.data.write_all(&self.scratch)?;
        if let Some(current) = self.current.as_mut() {
            current.entries += self.pending.len() as u32;
        }
        self.pending.clear();
        Ok(())
    }

    /// Encode the partial block of the current trigram and record its meta entry.
    /// Returns the number of integers written for it.
    pub fn end(&mut self) -> Result<u32> {
        self.write_pending()?;
        let Some(entry) = self.current.take() else {
            return Err(IndexError::corrupt(&self.name, "end without begin"));
        };
        self.meta.push(entry)?;
        Ok(entry.entries)
    }

    /// Write a whole trigram in one call.
    pub fn write_trigram(&mut self, trigram: Trigram, values: &[u32]) -> Result<()> {
        self.begin(trigram);
        self.put_all(values)?;
        self.end()?;
        Ok(())
    }

    /// Number of trigrams written
    pub fn trigrams(&self) -> u64 {
        self.meta.count()
    }

    /// Flush both files and return the underlying writers (meta, data).
    pub fn finish(self) -> Result<(W, W)> {
        let mut meta = self.meta.into_inner();
        let mut data = self.data.into_inner();
        meta.flush()?;
        data.flush()?;
        Ok((meta, data))
    }
}

/// Read side of a meta file + data blob pair.
///
/// Used for the two codec-encoded stores and for the relation store, whose
/// meta records have `entries == 0`.
#[derive(Clone, Debug)]
pub struct SectionReader {
    meta: MappedFile,
    data: MappedFile,
}

impl SectionReader {
    pub fn open(dir: &Path, section: Section) -> Result<Self> {
        Self::open_files(dir, section.meta_file(), section.data_file())
    }

    pub fn open_files(dir: &Path, meta_file: &str, data_file: &str) -> Result<Self> {
        let meta = MappedFile::open(&dir.join(meta_file))?;
        if meta.len() % MetaEntry::SIZE != 0 {
            return Err(meta.corrupt(format!(
                "length {} is not a multiple of {}",
                meta.len(),
                MetaEntry::SIZE
            )));
        }
        let data = MappedFile::open(&dir.join(data_file))?;
        Ok(Self { meta, data })
    }

    /// Number of trigrams in the store
    pub fn len(&self) -> usize {
        self.meta.len() / MetaEntry::SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_name(&self) -> &str {
        self.data.name()
    }

    pub fn meta_name(&self) -> &str {
        self.meta.name()
    }

    /// The meta record at position `i`.
    pub fn meta_at(&self, i: usize) -> Result<MetaEntry> {
        let start = i * MetaEntry::SIZE;
        let bytes = self.meta.slice(start..start + MetaEntry::SIZE)?;
        let record: &[u8; MetaEntry::SIZE] = bytes
            .try_into()
            .map_err(|_| self.meta.corrupt(format!("short record {i}")))?;
        Ok(MetaEntry::from_bytes(record))
    }

    fn trigram_at(&self, i: usize) -> Result<Trigram> {
        self.meta.u32_at(i * MetaEntry::SIZE)
    }

    /// Position of `trigram` in the meta array, by binary search.
    pub fn find(&self, trigram: Trigram) -> Result<Option<usize>> {
        let (mut lo, mut hi) = (0, self.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let t = self.trigram_at(mid)?;
            if t == trigram {
                return Ok(Some(mid));
            } else if t < trigram {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(None)
    }

    /// The meta record of `trigram`, or `None` if this shard does not contain it.
    pub fn meta_entry(&self, trigram: Trigram) -> Result<Option<MetaEntry>> {
        match self.find(trigram)? {
            Some(i) => self.meta_at(i).map(Some),
            None => Ok(None),
        }
    }

    /// Byte range of the data of record `i`.
    pub fn range_at(&self, i: usize) -> Result<(MetaEntry, Range<usize>)> {
        let entry = self.meta_at(i)?;
        let end = if i + 1 < self.len() {
            self.meta_at(i + 1)?.offset
        } else {
            self.data.len() as i64
        };
        if entry.offset < 0 || entry.offset > end || end > self.data.len() as i64 {
            return Err(self.meta.corrupt(format!(
                "trigram {:#08x}: data range {}..{} outside of {} bytes",
                entry.trigram,
                entry.offset,
                end,
                self.data.len()
            )));
        }
        Ok((entry, entry.offset as usize..end as usize))
    }

    /// Encoded data and meta record of record `i`.
    pub fn data_at(&self, i: usize) -> Result<(&[u8], MetaEntry)> {
        let (entry, range) = self.range_at(i)?;
        Ok((self.data.slice(range)?, entry))
    }

    /// Encoded data and meta record of `trigram`.
    pub fn data(&self, trigram: Trigram) -> Result<(&[u8], MetaEntry)> {
        match self.find(trigram)? {
            Some(i) => self.data_at(i),
            None => Err(IndexError::NotFound { trigram }),
        }
    }

    /// Decode the integers of record `i` exactly as stored.
    pub fn deltas_at(&self, i: usize) -> Result<Vec<u32>> {
        let (data, entry) = self.data_at(i)?;
        self.decode(data, entry)
    }

    fn decode(&self, data: &[u8], entry: MetaEntry) -> Result<Vec<u32>> {
        let (values, consumed) = pfor::decode_to_vec(data, entry.entries as usize)
            .map_err(|e| self.data.corrupt(format!("trigram {:#08x}: {e}", entry.trigram)))?;
        if consumed != data.len() {
            return Err(self.data.corrupt(format!(
                "trigram {:#08x}: {} trailing bytes",
                entry.trigram,
                data.len() - consumed
            )));
        }
        Ok(values)
    }

    /// Decode the integers of `trigram` exactly as stored (deltas).
    pub fn deltas(&self, trigram: Trigram) -> Result<Vec<u32>> {
        let (data, entry) = self.data(trigram)?;
        self.decode(data, entry)
    }

    /// Decode the integers of `trigram` and undo the delta encoding.
    pub fn postings(&self, trigram: Trigram) -> Result<Vec<u32>> {
        let mut values = self.deltas(trigram)?;
        pfor::accumulate(&mut values);
        Ok(values)
    }

    /// Iterate over all meta records in order.
    pub fn entries(&self) -> impl Iterator<Item = Result<MetaEntry>> + '_ {
        (0..self.len()).map(move |i| self.meta_at(i))
    }
}

/// Paths of the meta and data files of `section`.
pub fn section_paths(dir: &Path, section: Section) -> (PathBuf, PathBuf) {
    (dir.join(section.meta_file()), dir.join(section.data_file()))
}
