use crate::error::{IndexError, Result};
use crate::index::docid_map::DocidMap;
use crate::index::posrel::PosrelBits;
use crate::index::section::SectionReader;
use crate::index::types::*;
use crate::query::{Query, QueryExecutor};
use crate::utils::trigram::trigrams_with_offsets;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The memory-mapped files of one shard.
struct Shard {
    dir: PathBuf,
    docid_map: DocidMap,
    docids: SectionReader,
    pos: SectionReader,
    posrel: SectionReader,
}

/// Read-only view of an on-disk shard.
///
/// All files are memory-mapped on [`open`](Index::open) and released on
/// [`close`](Index::close), after which every other method returns
/// [`IndexError::Closed`]. Queries take `&self` and never lock, so an
/// `Arc<Index>` can serve any number of threads.
pub struct Index {
    shard: Option<Shard>,
    query_config: QueryConfig,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("dir", &self.shard.as_ref().map(|s| &s.dir))
            .field("query_config", &self.query_config)
            .finish_non_exhaustive()
    }
}

impl Index {
    /// Map every file of the shard in `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        let shard = Shard {
            dir: dir.to_path_buf(),
            docid_map: DocidMap::open(dir)?,
            docids: SectionReader::open(dir, Section::Docid)?,
            pos: SectionReader::open(dir, Section::Pos)?,
            posrel: SectionReader::open(dir, Section::Posrel)?,
        };
        debug!(
            dir = %dir.display(),
            documents = shard.docid_map.count(),
            trigrams = shard.docids.len(),
            "opened shard"
        );
        Ok(Self {
            shard: Some(shard),
            query_config: QueryConfig::default(),
        })
    }

    pub fn with_query_config(mut self, config: QueryConfig) -> Self {
        self.query_config = config;
        self
    }

    pub fn query_config(&self) -> &QueryConfig {
        &self.query_config
    }

    /// Release the mappings. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.shard = None;
    }

    pub fn is_closed(&self) -> bool {
        self.shard.is_none()
    }

    fn shard(&self) -> Result<&Shard> {
        self.shard.as_ref().ok_or(IndexError::Closed)
    }

    pub fn dir(&self) -> Result<&Path> {
        Ok(&self.shard()?.dir)
    }

    /// A docid map handle with its own lookup memo.
    ///
    /// The handle shares the underlying mapping, so it stays valid after
    /// [`close`](Index::close); closing only detaches this `Index`.
    pub fn docid_map(&self) -> Result<DocidMap> {
        Ok(self.shard()?.docid_map.clone())
    }

    /// Number of documents in the shard
    pub fn docid_count(&self) -> Result<u32> {
        Ok(self.shard()?.docid_map.count())
    }

    /// The docid posting store
    pub fn docids(&self) -> Result<&SectionReader> {
        Ok(&self.shard()?.docids)
    }

    /// The position posting store
    pub fn positions(&self) -> Result<&SectionReader> {
        Ok(&self.shard()?.pos)
    }

    /// The relation stream
    pub fn posrel(&self) -> Result<&SectionReader> {
        Ok(&self.shard()?.posrel)
    }

    fn section(&self, section: Section) -> Result<&SectionReader> {
        match section {
            Section::Docid => self.docids(),
            Section::Pos => self.positions(),
            Section::Posrel => self.posrel(),
        }
    }

    /// Meta record of `trigram` in `section`; `None` if the shard lacks it.
    pub fn meta_entry(&self, section: Section, trigram: Trigram) -> Result<Option<MetaEntry>> {
        self.section(section)?.meta_entry(trigram)
    }

    /// Encoded bytes and meta record of `trigram` in `section`.
    pub fn data(&self, section: Section, trigram: Trigram) -> Result<(&[u8], MetaEntry)> {
        self.section(section)?.data(trigram)
    }

    /// Decoded, re-accumulated integers of `trigram` in `section`.
    ///
    /// - `Docid`: ascending docids.
    /// - `Pos`: byte positions, restarting at each new document.
    /// - `Posrel`: the relation bits as 0 or 1, one per position entry.
    pub fn deltas(&self, section: Section, trigram: Trigram) -> Result<Vec<u32>> {
        match section {
            Section::Docid => self.docids()?.postings(trigram),
            Section::Pos => Ok(self.matches(trigram)?.into_iter().map(|m| m.position).collect()),
            Section::Posrel => {
                let shard = self.shard()?;
                let entries = match shard.pos.meta_entry(trigram)? {
                    Some(me) => me.entries as usize,
                    None => return Err(IndexError::NotFound { trigram }),
                };
                let (rel, _) = shard.posrel.data(trigram)?;
                let bits = PosrelBits::new(rel);
                if bits.capacity() < entries {
                    return Err(IndexError::corrupt(
                        shard.posrel.data_name(),
                        format!(
                            "trigram {trigram:#08x}: {} relation bits for {entries} positions",
                            bits.capacity()
                        ),
                    ));
                }
                Ok(bits.iter(entries).map(u32::from).collect())
            }
        }
    }

    /// Ascending docids of the documents containing `trigram`.
    pub fn posting_list(&self, trigram: Trigram) -> Result<Vec<DocId>> {
        self.docids()?.postings(trigram)
    }

    /// Every occurrence of `trigram`, ordered by docid then position.
    pub fn matches(&self, trigram: Trigram) -> Result<Vec<Match>> {
        let shard = self.shard()?;
        let docid_deltas = shard.docids.deltas(trigram)?;

        // Present in the docid store means present in the other two
        let missing = |e: IndexError, file: &str| {
            if e.is_not_found() {
                IndexError::corrupt(file, format!("trigram {trigram:#08x} missing"))
            } else {
                e
            }
        };
        let pos_deltas = shard
            .pos
            .deltas(trigram)
            .map_err(|e| missing(e, shard.pos.meta_name()))?;
        let (rel, _) = shard
            .posrel
            .data(trigram)
            .map_err(|e| missing(e, shard.posrel.meta_name()))?;

        decode_matches(trigram, &docid_deltas, &pos_deltas, PosrelBits::new(rel))
            .map_err(|reason| IndexError::corrupt(shard.posrel.data_name(), reason))
    }

    /// Docids that may match `query`, evaluated with this index's query config.
    pub fn posting_query(&self, query: &Query) -> Result<Vec<DocId>> {
        QueryExecutor::new(self).execute(query)
    }

    /// Every `(docid, position)` at which `literal` occurs as a whole.
    ///
    /// Each trigram of the literal is looked up in the position store,
    /// shifted back by its offset within the literal and intersected with
    /// the running result, rarest trigram first.
    pub fn query_positional(&self, literal: &str) -> Result<Vec<Match>> {
        let mut leaves = trigrams_with_offsets(literal.as_bytes());
        if leaves.is_empty() {
            return Err(IndexError::InvalidQuery(format!(
                "{literal:?} is shorter than a trigram"
            )));
        }

        let pos = self.positions()?;
        let mut counts = Vec::with_capacity(leaves.len());
        for &(trigram, _) in &leaves {
            match pos.meta_entry(trigram)? {
                Some(me) => counts.push((trigram, me.entries)),
                None => return Err(IndexError::NotFound { trigram }),
            }
        }
        leaves.sort_by_key(|&(trigram, offset)| {
            let entries = counts
                .iter()
                .find(|(t, _)| *t == trigram)
                .map_or(0, |&(_, n)| n);
            (entries, offset)
        });

        let mut result: Option<Vec<Match>> = None;
        for (trigram, offset) in leaves {
            let shifted: Vec<Match> = self
                .matches(trigram)?
                .into_iter()
                .filter(|m| m.position >= offset)
                .map(|m| Match {
                    docid: m.docid,
                    position: m.position - offset,
                })
                .collect();
            let next = match result {
                None => shifted,
                Some(current) => intersect_matches(&current, &shifted),
            };
            if next.is_empty() {
                return Ok(next);
            }
            result = Some(next);
        }
        Ok(result.unwrap_or_default())
    }

    /// Check the whole shard for format violations.
    ///
    /// The three stores must list the same trigrams in strictly ascending
    /// order, every run must decode to exactly its entry count, relation
    /// bits must agree with the docid store and docids must stay inside the
    /// docid map.
    pub fn verify(&self) -> Result<VerifyReport> {
        let shard = self.shard()?;
        let documents = shard.docid_map.count();
        let n = shard.docids.len();
        for store in [&shard.pos, &shard.posrel] {
            if store.len() != n {
                return Err(IndexError::corrupt(
                    store.meta_name(),
                    format!("{} trigrams, docid store has {n}", store.len()),
                ));
            }
        }

        let mut report = VerifyReport {
            documents,
            ..VerifyReport::default()
        };
        let mut prev: Option<Trigram> = None;
        for i in 0..n {
            let trigram = shard.docids.meta_at(i)?.trigram;
            if prev.is_some_and(|p| p >= trigram) {
                return Err(IndexError::corrupt(
                    shard.docids.meta_name(),
                    format!("record {i}: trigram {trigram:#08x} not ascending"),
                ));
            }
            prev = Some(trigram);
            for store in [&shard.pos, &shard.posrel] {
                let other = store.meta_at(i)?.trigram;
                if other != trigram {
                    return Err(IndexError::corrupt(
                        store.meta_name(),
                        format!("record {i}: trigram {other:#08x}, expected {trigram:#08x}"),
                    ));
                }
            }

            let docid_deltas = shard.docids.deltas_at(i)?;
            let pos_deltas = shard.pos.deltas_at(i)?;
            let (rel, _) = shard.posrel.data_at(i)?;
            let matches =
                decode_matches(trigram, &docid_deltas, &pos_deltas, PosrelBits::new(rel))
                    .map_err(|reason| IndexError::corrupt(shard.posrel.data_name(), reason))?;
            if let Some(last) = matches.last().filter(|m| m.docid >= documents) {
                return Err(IndexError::corrupt(
                    shard.docids.data_name(),
                    format!("trigram {trigram:#08x}: docid {} of {documents}", last.docid),
                ));
            }

            report.trigrams += 1;
            report.docid_entries += docid_deltas.len() as u64;
            report.pos_entries += pos_deltas.len() as u64;
        }
        Ok(report)
    }
}

/// What [`Index::verify`] checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub documents: u32,
    pub trigrams: u64,
    pub docid_entries: u64,
    pub pos_entries: u64,
}

/// Walk the docid deltas, position deltas and relation bits in lock-step.
///
/// Relation bit `i` set means position entry `i` starts a new document: the
/// next docid delta is applied and the running position restarts at zero.
pub(crate) fn decode_matches(
    trigram: Trigram,
    docid_deltas: &[u32],
    pos_deltas: &[u32],
    rel: PosrelBits<'_>,
) -> std::result::Result<Vec<Match>, String> {
    let n = pos_deltas.len();
    let ones = rel.count_ones(n).ok_or_else(|| {
        format!(
            "trigram {trigram:#08x}: {} relation bits for {n} positions",
            rel.capacity()
        )
    })?;
    if ones != docid_deltas.len() {
        return Err(format!(
            "trigram {trigram:#08x}: {ones} document starts but {} docids",
            docid_deltas.len()
        ));
    }
    if n > 0 && rel.get(0) != Some(true) {
        return Err(format!("trigram {trigram:#08x}: first position has no document"));
    }

    let mut out = Vec::with_capacity(n);
    let mut next_docid = docid_deltas.iter();
    let mut docid: DocId = 0;
    let mut position = 0u32;
    for (new_doc, &delta) in rel.iter(n).zip(pos_deltas) {
        if new_doc {
            // count_ones matched docid_deltas.len()
            docid = docid.wrapping_add(*next_docid.next().unwrap_or(&0));
            position = 0;
        }
        position = position.wrapping_add(delta);
        out.push(Match { docid, position });
    }
    Ok(out)
}

/// Intersection of two sorted match lists.
fn intersect_matches(a: &[Match], b: &[Match]) -> Vec<Match> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::writer::Writer;
    use tempfile::{tempdir, TempDir};

    fn tri(s: &[u8]) -> Trigram {
        bytes_to_trigram(s[0], s[1], s[2])
    }

    fn m(docid: DocId, position: u32) -> Match {
        Match { docid, position }
    }

    fn build(docs: &[&str]) -> (TempDir, Index) {
        let dir = tempdir().unwrap();
        let mut w = Writer::create(dir.path(), IndexConfig::default()).unwrap();
        for (i, doc) in docs.iter().enumerate() {
            w.add_bytes(&format!("file{i}.txt"), doc.as_bytes()).unwrap();
        }
        w.flush().unwrap();
        let index = Index::open(dir.path()).unwrap();
        (dir, index)
    }

    #[test]
    fn test_posting_lists() {
        let (_dir, index) = build(&["abc def ghi", "abc jkl mno"]);
        assert_eq!(index.posting_list(tri(b"abc")).unwrap(), vec![0, 1]);
        assert_eq!(index.posting_list(tri(b"def")).unwrap(), vec![0]);
        assert!(index.posting_list(tri(b"zzz")).unwrap_err().is_not_found());

        let mut map = index.docid_map().unwrap();
        assert_eq!(map.lookup(1).unwrap(), "file1.txt");
        assert_eq!(index.docid_count().unwrap(), 2);
    }

    #[test]
    fn test_matches_every_occurrence() {
        let docs = ["abcabcabc", "xxabc", "nothing", "abc abc"];
        let (_dir, index) = build(&docs);

        assert_eq!(
            index.matches(tri(b"abc")).unwrap(),
            vec![m(0, 0), m(0, 3), m(0, 6), m(1, 2), m(3, 0), m(3, 4)]
        );

        // Every trigram of every document is found at exactly its offsets
        for (docid, doc) in docs.iter().enumerate() {
            for (pos, w) in doc.as_bytes().windows(3).enumerate() {
                let found = index.matches(tri(w)).unwrap();
                assert!(found.contains(&m(docid as DocId, pos as u32)));
            }
        }
    }

    #[test]
    fn test_deltas_are_reaccumulated() {
        let (_dir, index) = build(&["abc", "x", "abc"]);
        assert_eq!(index.deltas(Section::Docid, tri(b"abc")).unwrap(), vec![0, 2]);
        let (_, me) = index.data(Section::Pos, tri(b"abc")).unwrap();
        assert_eq!(me.entries, 2);
    }

    #[test]
    fn test_pos_deltas_restart_per_document() {
        let (_dir, index) = build(&["abc abc", "xx abc abc"]);
        let abc = tri(b"abc");
        // Stored: 0, 4 | 3, 4
        assert_eq!(index.positions().unwrap().deltas(abc).unwrap(), vec![0, 4, 3, 4]);
        assert_eq!(index.deltas(Section::Pos, abc).unwrap(), vec![0, 4, 3, 7]);
        assert_eq!(index.deltas(Section::Posrel, abc).unwrap(), vec![1, 0, 1, 0]);

        let me = index.meta_entry(Section::Posrel, abc).unwrap().unwrap();
        assert_eq!(me.entries, 0);
        let (raw, _) = index.data(Section::Posrel, abc).unwrap();
        assert_eq!(raw, &[0b0101]);
        assert!(index.deltas(Section::Posrel, tri(b"zzz")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_docid_map_outlives_close() {
        let (_dir, mut index) = build(&["abc"]);
        let mut map = index.docid_map().unwrap();
        index.close();
        assert!(matches!(index.docid_map(), Err(IndexError::Closed)));
        assert_eq!(map.lookup(0).unwrap(), "file0.txt");
    }

    #[test]
    fn test_query_positional() {
        let (_dir, index) = build(&["abc def ghi", "abc jkl mno", "xx abc def"]);
        assert_eq!(
            index.query_positional("abc ").unwrap(),
            vec![m(0, 0), m(1, 0), m(2, 3)]
        );
        assert_eq!(
            index.query_positional("abc def").unwrap(),
            vec![m(0, 0), m(2, 3)]
        );
        assert_eq!(index.query_positional("jkl mno").unwrap(), vec![m(1, 4)]);
        assert!(index.query_positional("zzz").unwrap_err().is_not_found());
        assert!(matches!(
            index.query_positional("ab"),
            Err(IndexError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_query_positional_needs_consecutive_trigrams() {
        // "abc", "bc " and "c d" all occur, but not in a row
        let (_dir, index) = build(&["abc xbc d"]);
        assert!(index.query_positional("abc d").unwrap().is_empty());
        assert_eq!(index.query_positional("xbc d").unwrap(), vec![m(0, 4)]);
    }

    #[test]
    fn test_verify() {
        let (dir, index) = build(&["abc def", "def abc abc"]);
        let report = index.verify().unwrap();
        assert_eq!(report.documents, 2);
        assert_eq!(report.trigrams, index.docids().unwrap().len() as u64);
        drop(index);

        // Flip every relation bit off: document starts no longer match
        let rel = dir.path().join(POSREL_DATA_FILE);
        let zeros = vec![0u8; std::fs::metadata(&rel).unwrap().len() as usize];
        std::fs::write(&rel, zeros).unwrap();
        let index = Index::open(dir.path()).unwrap();
        assert!(index.verify().unwrap_err().is_corrupt());
    }

    #[test]
    fn test_closed_index() {
        let (_dir, mut index) = build(&["abc"]);
        index.close();
        assert!(index.is_closed());
        assert!(matches!(index.posting_list(0x616263), Err(IndexError::Closed)));
        assert!(matches!(index.matches(0x616263), Err(IndexError::Closed)));
        assert!(matches!(index.docid_map(), Err(IndexError::Closed)));
        index.close();
    }

    #[test]
    fn test_concurrent_readers() {
        let (_dir, index) = build(&["abc def", "def ghi"]);
        let index = std::sync::Arc::new(index);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let index = index.clone();
                std::thread::spawn(move || index.posting_list(tri(b"def")).unwrap())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), vec![0, 1]);
        }
    }

    #[test]
    fn test_decode_matches_rejects_mismatch() {
        // Two document starts, one docid
        let err = decode_matches(1, &[0], &[0, 1], PosrelBits::new(&[0b11])).unwrap_err();
        assert!(err.contains("2 document starts"));
        // Not enough relation bytes
        assert!(decode_matches(1, &[0], &[0; 9], PosrelBits::new(&[1])).is_err());
        // First entry without a document
        assert!(decode_matches(1, &[0], &[0, 1], PosrelBits::new(&[0b10])).is_err());
        assert_eq!(
            decode_matches(1, &[4, 3], &[1, 2, 5], PosrelBits::new(&[0b101])).unwrap(),
            vec![m(4, 1), m(4, 3), m(7, 5)]
        );
    }
}
