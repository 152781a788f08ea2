//! Merging shards without re-reading source text.
//!
//! The merged docid space is the concatenation of the inputs' docid spaces
//! in input order. Posting data is decoded and re-encoded, never re-derived:
//! docid runs are rebased onto their input's base docid, position runs are
//! copied unchanged and relation bits are stitched end to end.

use crate::error::{IndexError, IoContext, Result};
use crate::index::docid_map::DocidMapWriter;
use crate::index::posrel::{PosrelBits, PosrelWriter};
use crate::index::reader::Index;
use crate::index::section::{MetaWriter, SectionReader, SectionWriter};
use crate::index::types::*;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

/// What a merge produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub documents: u32,
    pub trigrams: u64,
}

/// Read position within one input's three stores.
///
/// The stores of a shard list the same trigrams in the same order, so one
/// record index addresses all three.
struct Cursor<'a> {
    docids: &'a SectionReader,
    pos: &'a SectionReader,
    posrel: &'a SectionReader,
    base: DocId,
    next: usize,
}

impl<'a> Cursor<'a> {
    fn new(index: &'a Index, base: DocId) -> Result<Self> {
        let cursor = Self {
            docids: index.docids()?,
            pos: index.positions()?,
            posrel: index.posrel()?,
            base,
            next: 0,
        };
        let n = cursor.docids.len();
        if cursor.pos.len() != n || cursor.posrel.len() != n {
            return Err(IndexError::corrupt(
                cursor.pos.meta_name(),
                format!(
                    "{} docid, {} pos and {} posrel trigrams",
                    n,
                    cursor.pos.len(),
                    cursor.posrel.len()
                ),
            ));
        }
        Ok(cursor)
    }

    /// Trigram at the cursor, checked to agree across the three stores.
    fn peek(&self) -> Result<Option<Trigram>> {
        if self.next >= self.docids.len() {
            return Ok(None);
        }
        let t = self.docids.meta_at(self.next)?.trigram;
        for store in [self.pos, self.posrel] {
            let other = store.meta_at(self.next)?.trigram;
            if other != t {
                return Err(IndexError::corrupt(
                    store.meta_name(),
                    format!("record {}: trigram {other:#08x}, expected {t:#08x}", self.next),
                ));
            }
        }
        Ok(Some(t))
    }
}

/// Output side of a merge.
struct Output {
    docids: SectionWriter,
    pos: SectionWriter,
    rel_meta: MetaWriter<BufWriter<File>>,
    rel: PosrelWriter<BufWriter<File>>,
}

impl Output {
    fn create(dir: &Path) -> Result<Self> {
        let meta_path = dir.join(POSREL_META_FILE);
        let data_path = dir.join(POSREL_DATA_FILE);
        Ok(Self {
            docids: SectionWriter::create(dir, Section::Docid)?,
            pos: SectionWriter::create(dir, Section::Pos)?,
            rel_meta: MetaWriter::new(BufWriter::new(
                File::create(&meta_path).with_path(&meta_path)?,
            )),
            rel: PosrelWriter::new(BufWriter::new(
                File::create(&data_path).with_path(&data_path)?,
            )),
        })
    }

    fn begin(&mut self, trigram: Trigram) -> Result<()> {
        self.docids.begin(trigram);
        self.pos.begin(trigram);
        self.rel_meta.push(MetaEntry {
            trigram,
            entries: 0,
            offset: self.rel.offset() as i64,
        })?;
        Ok(())
    }

    /// Append one input's postings for the current trigram.
    ///
    /// `last` is the last docid written for this trigram so far.
    fn append(&mut self, cursor: &Cursor<'_>, last: &mut Option<DocId>) -> Result<()> {
        let i = cursor.next;
        let mut docids = cursor.docids.deltas_at(i)?;
        let positions = cursor.pos.deltas_at(i)?;
        let (rel, _) = cursor.posrel.data_at(i)?;
        let bits = PosrelBits::new(rel);

        let n = positions.len();
        let starts = bits.count_ones(n);
        if starts != Some(docids.len()) {
            return Err(IndexError::corrupt(
                cursor.posrel.data_name(),
                format!(
                    "record {i}: {} docids but {starts:?} document starts",
                    docids.len()
                ),
            ));
        }

        if let Some(first) = docids.first_mut() {
            let rebased = cursor.base.checked_add(*first).and_then(|abs| match *last {
                Some(prev) => abs.checked_sub(prev).filter(|&d| d > 0),
                None => Some(abs),
            });
            let Some(rebased) = rebased else {
                return Err(IndexError::corrupt(
                    cursor.docids.data_name(),
                    format!("record {i}: docid {} out of order after rebasing", *first),
                ));
            };
            *first = rebased;
            let sum: u32 = docids.iter().fold(0u32, |acc, &d| acc.wrapping_add(d));
            *last = Some(last.unwrap_or(0).wrapping_add(sum));
        }
        self.docids.put_all(&docids)?;
        self.pos.put_all(&positions)?;
        if let Some(prefix) = bits.prefix(n) {
            self.rel.write(prefix, n)?;
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.docids.end()?;
        self.pos.end()?;
        self.rel.flush()?;
        Ok(())
    }

    fn finish(self, dir: &Path) -> Result<()> {
        self.docids.finish()?;
        self.pos.finish()?;
        self.rel_meta
            .into_inner()
            .flush()
            .with_path(dir.join(POSREL_META_FILE))?;
        self.rel
            .into_inner()?
            .flush()
            .with_path(dir.join(POSREL_DATA_FILE))?;
        Ok(())
    }
}

/// Merge the shards in `srcs` into a new shard in `dest`.
///
/// Input `k`'s docids are shifted by the total document count of inputs
/// `0..k`. `dest` is created if needed; on failure it may hold a partial
/// shard.
pub fn concat_n<P: AsRef<Path>>(dest: &Path, srcs: &[P]) -> Result<MergeStats> {
    let indexes: Vec<Index> = srcs
        .iter()
        .map(|p| Index::open(p.as_ref()))
        .collect::<Result<_>>()?;

    fs::create_dir_all(dest).with_path(dest)?;

    // Document maps: bulk-copy the names, rebase the offsets
    let map_path = dest.join(DOCID_MAP_FILE);
    let mut map = DocidMapWriter::new(BufWriter::new(
        File::create(&map_path).with_path(&map_path)?,
    ));
    let mut bases = Vec::with_capacity(indexes.len());
    for (src, index) in srcs.iter().zip(&indexes) {
        let names = index.docid_map()?;
        bases.push(map.count());
        let offsets: Vec<u32> = names.offsets().collect::<Result<_>>()?;
        map.append_raw(names.names_bytes(), offsets)?;
        info!(src = %src.as_ref().display(), docids = names.count(), "docids in shard");
    }
    let documents = map.count();
    map.finish()?;

    let mut cursors = indexes
        .iter()
        .zip(&bases)
        .map(|(index, &base)| Cursor::new(index, base))
        .collect::<Result<Vec<_>>>()?;

    // Min-heap of (trigram, input); ties resolve in input order
    let mut heap = BinaryHeap::with_capacity(cursors.len());
    for (i, cursor) in cursors.iter().enumerate() {
        if let Some(t) = cursor.peek()? {
            heap.push(Reverse((t, i)));
        }
    }

    let mut out = Output::create(dest)?;
    let mut trigrams = 0u64;
    while let Some(Reverse((trigram, first))) = heap.pop() {
        let mut inputs = vec![first];
        while let Some(&Reverse((t, i))) = heap.peek() {
            if t != trigram {
                break;
            }
            heap.pop();
            inputs.push(i);
        }

        out.begin(trigram)?;
        let mut last = None;
        for &i in &inputs {
            out.append(&cursors[i], &mut last)?;
        }
        out.end()?;
        trigrams += 1;

        for i in inputs {
            let cursor = &mut cursors[i];
            cursor.next += 1;
            if let Some(t) = cursor.peek()? {
                if t <= trigram {
                    return Err(IndexError::corrupt(
                        cursor.docids.meta_name(),
                        format!("trigram {t:#08x} after {trigram:#08x}: not sorted"),
                    ));
                }
                heap.push(Reverse((t, i)));
            }
        }
    }
    out.finish(dest)?;

    debug!(dest = %dest.display(), documents, trigrams, "merged shards");
    Ok(MergeStats {
        documents,
        trigrams,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::writer::Writer;
    use tempfile::tempdir;

    fn write_shard(dir: &Path, docs: &[(&str, &str)]) {
        let mut w = Writer::create(dir, IndexConfig::default()).unwrap();
        for (name, content) in docs {
            w.add_bytes(name, content.as_bytes()).unwrap();
        }
        w.flush().unwrap();
    }

    #[test]
    fn test_merge_two_shards() {
        let tmp = tempdir().unwrap();
        let (a, b, out) = (tmp.path().join("a"), tmp.path().join("b"), tmp.path().join("out"));
        write_shard(&a, &[("a1", "abc def"), ("a2", "xyz")]);
        write_shard(&b, &[("b1", "abc"), ("b2", "def abc")]);

        let stats = concat_n(&out, &[&a, &b]).unwrap();
        assert_eq!(stats.documents, 4);

        let index = Index::open(&out).unwrap();
        let abc = bytes_to_trigram(b'a', b'b', b'c');
        assert_eq!(index.posting_list(abc).unwrap(), vec![0, 2, 3]);
        let matches = index.matches(abc).unwrap();
        assert_eq!(
            matches,
            vec![
                Match { docid: 0, position: 0 },
                Match { docid: 2, position: 0 },
                Match { docid: 3, position: 4 },
            ]
        );

        let mut map = index.docid_map().unwrap();
        assert_eq!(map.lookup(0).unwrap(), "a1");
        assert_eq!(map.lookup(2).unwrap(), "b1");
        assert_eq!(map.lookup(3).unwrap(), "b2");
    }

    #[test]
    fn test_merge_rebases_first_docid_zero() {
        // Second input's only document is its docid 0
        let tmp = tempdir().unwrap();
        let (a, b, out) = (tmp.path().join("a"), tmp.path().join("b"), tmp.path().join("out"));
        write_shard(&a, &[("x", "qqq"), ("y", "abc")]);
        write_shard(&b, &[("z", "abc")]);
        concat_n(&out, &[&a, &b]).unwrap();

        let index = Index::open(&out).unwrap();
        let abc = bytes_to_trigram(b'a', b'b', b'c');
        // delta 1 then 1: docids 1, 2
        assert_eq!(index.docids().unwrap().deltas(abc).unwrap(), vec![1, 1]);
        assert_eq!(index.posting_list(abc).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_merge_no_inputs() {
        let tmp = tempdir().unwrap();
        let out = tmp.path().join("out");
        let stats = concat_n::<&Path>(&out, &[]).unwrap();
        assert_eq!(stats, MergeStats::default());
        let index = Index::open(&out).unwrap();
        assert_eq!(index.docid_count().unwrap(), 0);
        assert!(index.docids().unwrap().is_empty());
    }

    #[test]
    fn test_merge_rejects_mismatched_stores() {
        let tmp = tempdir().unwrap();
        let (a, out) = (tmp.path().join("a"), tmp.path().join("out"));
        write_shard(&a, &[("a", "abcd")]);
        // Drop the last pos meta record
        let meta = a.join(POS_META_FILE);
        let bytes = fs::read(&meta).unwrap();
        fs::write(&meta, &bytes[..bytes.len() - MetaEntry::SIZE]).unwrap();

        let err = concat_n(&out, &[&a]).unwrap_err();
        assert!(err.is_corrupt());
    }
}
