use crate::index::reader::Index;
use crate::index::types::*;
use anyhow::{Context, Result};
use std::path::Path;

/// On-disk size of one shard, per file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub files: Vec<(&'static str, u64)>,
}

impl DiskUsage {
    pub fn total(&self) -> u64 {
        self.files.iter().map(|(_, size)| size).sum()
    }
}

/// Sizes of the files of the shard in `dir`. The position store and the
/// relation stream are only counted with `include_positional`.
pub fn disk_usage(dir: &Path, include_positional: bool) -> Result<DiskUsage> {
    let names: &[&'static str] = if include_positional {
        &SHARD_FILES
    } else {
        &[DOCID_MAP_FILE, DOCID_META_FILE, DOCID_DATA_FILE]
    };

    let mut usage = DiskUsage::default();
    for &name in names {
        let path = dir.join(name);
        let size = std::fs::metadata(&path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();
        usage.files.push((name, size));
    }
    Ok(usage)
}

/// Summary counts of a shard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub documents: u32,
    pub trigrams: u64,
    /// Sum of entry counts in the docid store
    pub docid_entries: u64,
    /// Sum of entry counts in the position store (total trigram occurrences)
    pub pos_entries: u64,
}

impl Index {
    /// Count documents, trigrams and posting entries from the meta files.
    pub fn stats(&self) -> crate::Result<IndexStats> {
        let mut stats = IndexStats {
            documents: self.docid_count()?,
            trigrams: self.docids()?.len() as u64,
            ..IndexStats::default()
        };
        for entry in self.docids()?.entries() {
            stats.docid_entries += entry?.entries as u64;
        }
        for entry in self.positions()?.entries() {
            stats.pos_entries += entry?.entries as u64;
        }
        Ok(stats)
    }
}

/// Format a byte count for display
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GiB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MiB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KiB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Print shard statistics and disk usage to stdout
pub fn show_stats(dir: &Path) -> Result<()> {
    let index = Index::open(dir).with_context(|| format!("Failed to open {}", dir.display()))?;
    let stats = index.stats()?;
    let usage = disk_usage(dir, true)?;

    println!("Index Statistics");
    println!("================");
    println!();
    println!("Location:         {}", dir.display());
    println!("Documents:        {}", stats.documents);
    println!("Trigrams:         {}", stats.trigrams);
    println!("Docid entries:    {}", stats.docid_entries);
    println!("Occurrences:      {}", stats.pos_entries);
    if stats.trigrams > 0 {
        println!(
            "Avg docs/trigram: {:.1}",
            stats.docid_entries as f64 / stats.trigrams as f64
        );
    }
    println!();
    println!("Disk usage:");
    for (name, size) in &usage.files {
        println!("  {:<26} {}", name, format_size(*size));
    }
    println!("  {:<26} {}", "total", format_size(usage.total()));
    Ok(())
}
