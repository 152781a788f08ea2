use crate::error::{IndexError, IoContext, RejectReason, Result};
use crate::index::docid_map::DocidMapWriter;
use crate::index::posrel::PosrelWriter;
use crate::index::section::{MetaWriter, SectionWriter};
use crate::index::types::*;
use crate::utils::trigram::{valid_utf8_pair, TrigramSet};
use ignore::WalkBuilder;
use rustc_hash::FxHashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One occurrence of a trigram: (docid, byte position)
type Occurrence = (DocId, u32);

/// Builds one index shard in memory and writes it to disk on [`flush`](Writer::flush).
///
/// A writer is single-use and not meant to be shared between threads; to
/// index in parallel, run one writer per chunk of files and merge the
/// resulting shards with [`concat_n`](crate::index::merge::concat_n).
pub struct Writer {
    dir: PathBuf,
    config: IndexConfig,
    docids: DocidMapWriter<BufWriter<File>>,
    /// Trigram -> occurrences in insertion order
    postings: FxHashMap<Trigram, Vec<Occurrence>>,
    /// Distinct trigrams of the file being added
    seen: TrigramSet,
    scratch: Vec<(Trigram, u32)>,
}

impl Writer {
    /// Create a writer for a new shard in `dir`, creating the directory if needed.
    pub fn create(dir: &Path, config: IndexConfig) -> Result<Self> {
        fs::create_dir_all(dir).with_path(dir)?;
        let map_path = dir.join(DOCID_MAP_FILE);
        let file = File::create(&map_path).with_path(&map_path)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            docids: DocidMapWriter::new(BufWriter::new(file)),
            postings: FxHashMap::default(),
            seen: TrigramSet::new(),
            scratch: Vec::new(),
        })
    }

    /// Number of documents added so far
    pub fn docid_count(&self) -> u32 {
        self.docids.count()
    }

    /// Read the file at `path` and index it as `name`.
    ///
    /// A file that fails the text heuristics is not added and yields
    /// [`IndexError::Rejected`]; the writer stays usable.
    pub fn add_file(&mut self, path: &Path, name: &str) -> Result<DocId> {
        let len = fs::metadata(path).with_path(path)?.len();
        if len > self.config.max_file_len {
            debug!(path = %path.display(), len, "rejected: too long");
            return Err(IndexError::rejected(RejectReason::TooLong));
        }
        let content = fs::read(path).with_path(path)?;
        self.add_bytes(name, &content)
    }

    /// Index `content` as `name`.
    pub fn add_bytes(&mut self, name: &str, content: &[u8]) -> Result<DocId> {
        if let Err(reason) = self.scan(name, content) {
            debug!(name, %reason, "rejected");
            return Err(IndexError::rejected(reason));
        }

        let docid = self.docids.add(name)?;
        for &(trigram, pos) in &self.scratch {
            self.postings.entry(trigram).or_default().push((docid, pos));
        }
        Ok(docid)
    }

    /// Collect the trigrams of `content` into `scratch`, applying the text
    /// heuristics.
    fn scan(&mut self, name: &str, content: &[u8]) -> std::result::Result<(), RejectReason> {
        if name.contains('\n') {
            return Err(RejectReason::InvalidName);
        }
        if content.len() as u64 > self.config.max_file_len {
            return Err(RejectReason::TooLong);
        }

        self.scratch.clear();
        self.seen.clear();

        let mut tv: u32 = 0;
        let mut line_len = 0usize;
        for (i, &c) in content.iter().enumerate() {
            let prev = tv as u8;
            tv = ((tv << 8) & 0xff_ffff) | c as u32;

            if i >= 2 {
                self.scratch.push((tv, (i - 2) as u32));
                if self.seen.insert(tv) && self.seen.len() > self.config.max_text_trigrams {
                    return Err(RejectReason::TooManyTrigrams);
                }
            }
            if !valid_utf8_pair(prev, c) {
                return Err(RejectReason::InvalidUtf8);
            }
            line_len += 1;
            if line_len > self.config.max_line_len {
                return Err(RejectReason::LineTooLong);
            }
            if c == b'\n' {
                line_len = 0;
            }
        }
        Ok(())
    }

    /// Add every regular file below `dir`, in file-name order.
    ///
    /// Files are indexed under their path with `trim_prefix` removed.
    /// Per-file failures (rejections, unreadable files) are handed to
    /// `on_error`; returning an error from it aborts the walk.
    pub fn add_dir<F>(&mut self, dir: &Path, trim_prefix: &Path, mut on_error: F) -> Result<u32>
    where
        F: FnMut(&Path, IndexError) -> Result<()>,
    {
        let mut added = 0;
        let walker = WalkBuilder::new(dir)
            .standard_filters(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = walk_error_path(&err).unwrap_or(dir).to_path_buf();
                    on_error(&path, walk_error(&path, err))?;
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let path = entry.path();
            let name = path.strip_prefix(trim_prefix).unwrap_or(path);
            let result = match name.to_str() {
                Some(name) => self.add_file(path, name),
                None => Err(IndexError::rejected(RejectReason::InvalidName)),
            };
            match result {
                Ok(_) => added += 1,
                Err(err) => on_error(path, err)?,
            }
        }
        Ok(added)
    }

    /// Write the shard to disk: the docid map, then the docid store, the
    /// position store and the relation stream.
    pub fn flush(self) -> Result<()> {
        let Writer {
            dir,
            docids,
            postings,
            ..
        } = self;

        let documents = docids.count();
        docids.finish()?;

        let mut trigrams: Vec<Trigram> = postings.keys().copied().collect();
        trigrams.sort_unstable();

        let (docid_result, pos_result) = rayon::join(
            || write_docid_store(&dir, &trigrams, &postings),
            || write_pos_store(&dir, &trigrams, &postings),
        );
        docid_result?;
        let occurrences = pos_result?;

        info!(
            dir = %dir.display(),
            documents,
            trigrams = trigrams.len(),
            occurrences,
            "flushed shard"
        );
        Ok(())
    }
}

fn walk_error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            walk_error_path(err)
        }
        _ => None,
    }
}

fn walk_error(path: &Path, err: ignore::Error) -> IndexError {
    let source = match err.into_io_error() {
        Some(io) => io,
        None => std::io::Error::other("directory walk failed"),
    };
    IndexError::io(path, source)
}

/// Per trigram: the first docid, then the non-zero docid deltas.
fn write_docid_store(
    dir: &Path,
    trigrams: &[Trigram],
    postings: &FxHashMap<Trigram, Vec<Occurrence>>,
) -> Result<()> {
    let mut w = SectionWriter::create(dir, Section::Docid)?;
    for &trigram in trigrams {
        w.begin(trigram);
        let mut last: Option<DocId> = None;
        for &(docid, _) in postings.get(&trigram).map_or(&[][..], Vec::as_slice) {
            match last {
                None => w.put(docid)?,
                Some(prev) if docid != prev => w.put(docid - prev)?,
                Some(_) => continue,
            }
            last = Some(docid);
        }
        w.end()?;
    }
    w.finish()?;
    Ok(())
}

/// Per trigram: positions delta-encoded within each document, plus one
/// relation bit per position marking the start of a new document.
fn write_pos_store(
    dir: &Path,
    trigrams: &[Trigram],
    postings: &FxHashMap<Trigram, Vec<Occurrence>>,
) -> Result<u64> {
    let mut w = SectionWriter::create(dir, Section::Pos)?;
    let meta_path = dir.join(POSREL_META_FILE);
    let data_path = dir.join(POSREL_DATA_FILE);
    let mut rel_meta = MetaWriter::new(BufWriter::new(
        File::create(&meta_path).with_path(&meta_path)?,
    ));
    let mut rel = PosrelWriter::new(BufWriter::new(
        File::create(&data_path).with_path(&data_path)?,
    ));

    let mut occurrences = 0u64;
    for &trigram in trigrams {
        rel_meta.push(MetaEntry {
            trigram,
            entries: 0,
            offset: rel.offset() as i64,
        })?;
        w.begin(trigram);

        let mut last: Option<DocId> = None;
        let mut prev_pos = 0u32;
        for &(docid, pos) in postings.get(&trigram).map_or(&[][..], Vec::as_slice) {
            let new_doc = last != Some(docid);
            if new_doc {
                prev_pos = 0;
                last = Some(docid);
            }
            rel.push(new_doc)?;
            w.put(pos - prev_pos)?;
            prev_pos = pos;
        }

        occurrences += w.end()? as u64;
        rel.flush()?;
    }

    w.finish()?;
    rel_meta.into_inner().flush().with_path(&meta_path)?;
    rel.into_inner()?.flush().with_path(&data_path)?;
    Ok(occurrences)
}
