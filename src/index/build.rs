use crate::index::merge::concat_n;
use crate::index::types::IndexConfig;
use crate::index::writer::Writer;
use crate::utils::progress::{self, ProgressBar};
use anyhow::{bail, Context, Result};
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{info, warn};

/// Directory inside the output that holds the per-chunk shards while building
const PARTS_DIR: &str = ".parts";

/// Outcome of [`build_shard`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Regular files found by the walk
    pub files: u32,
    /// Files indexed (the document count of the shard)
    pub indexed: u32,
    /// Files that failed the text heuristics
    pub rejected: u32,
    /// Files that could not be read
    pub failed: u32,
    pub trigrams: u64,
}

#[derive(Default)]
struct Counters {
    indexed: AtomicU32,
    rejected: AtomicU32,
    failed: AtomicU32,
}

/// Collect every regular file below `root` in file-name order, paired with
/// its name relative to `root`.
fn collect_files(root: &Path) -> Vec<(PathBuf, String)> {
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    walker
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(%err, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter_map(|entry| {
            let path = entry.path();
            let rel = path.strip_prefix(root).ok()?;
            match rel.to_str() {
                Some(name) => Some((path.to_path_buf(), name.to_string())),
                None => {
                    warn!(path = %path.display(), "skipping non-UTF-8 path");
                    None
                }
            }
        })
        .collect()
}

/// Index one chunk of files into its own shard.
fn write_part(
    dir: &Path,
    files: &[(PathBuf, String)],
    config: &IndexConfig,
    counters: &Counters,
    pb: &ProgressBar,
) -> Result<()> {
    let mut writer = Writer::create(dir, config.clone())
        .with_context(|| format!("Failed to create shard {}", dir.display()))?;

    for (path, name) in files {
        match writer.add_file(path, name) {
            Ok(_) => {
                counters.indexed.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) if err.is_rejected() => {
                info!(path = %path.display(), %err, "not indexed");
                counters.rejected.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "could not index");
                counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        pb.inc(1);
    }

    writer
        .flush()
        .with_context(|| format!("Failed to write shard {}", dir.display()))
}

/// Index every file below `root` into a new shard at `out`.
///
/// Files are split into chunks of `config.chunk_size`; each chunk is
/// indexed by its own [`Writer`] on the rayon pool and the chunk shards are
/// then merged. Docids follow the walk order.
pub fn build_shard(root: &Path, out: &Path, config: &IndexConfig) -> Result<BuildStats> {
    if config.chunk_size == 0 {
        bail!("chunk_size must be positive");
    }
    let root = root
        .canonicalize()
        .with_context(|| format!("Invalid path {}", root.display()))?;

    let spinner = progress::spinner("Discovering files...");
    let files = collect_files(&root);
    spinner.finish_with_message(format!("Found {} files", files.len()));

    let parts_root = out.join(PARTS_DIR);
    if parts_root.exists() {
        fs::remove_dir_all(&parts_root)
            .with_context(|| format!("Failed to clear {}", parts_root.display()))?;
    }

    let chunks: Vec<&[(PathBuf, String)]> = files.chunks(config.chunk_size).collect();
    let parts: Vec<PathBuf> = (0..chunks.len())
        .map(|i| parts_root.join(format!("part_{i:04}")))
        .collect();
    info!(files = files.len(), chunks = chunks.len(), "indexing");

    let counters = Counters::default();
    let pb = progress::bar(files.len() as u64, "Indexing");
    chunks
        .par_iter()
        .zip(parts.par_iter())
        .try_for_each(|(chunk, dir)| write_part(dir, chunk, config, &counters, &pb))?;
    pb.finish_and_clear();

    let spinner = progress::spinner("Merging shards...");
    let merged = concat_n(out, &parts)
        .with_context(|| format!("Failed to merge into {}", out.display()))?;
    spinner.finish_and_clear();

    if parts_root.exists() {
        fs::remove_dir_all(&parts_root)
            .with_context(|| format!("Failed to remove {}", parts_root.display()))?;
    }

    let stats = BuildStats {
        files: files.len() as u32,
        indexed: counters.indexed.load(Ordering::Relaxed),
        rejected: counters.rejected.load(Ordering::Relaxed),
        failed: counters.failed.load(Ordering::Relaxed),
        trigrams: merged.trigrams,
    };
    info!(?stats, "built shard");
    Ok(stats)
}
