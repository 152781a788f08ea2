use crate::error::{IndexError, IoContext, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// Unique identifier for a document in one shard
pub type DocId = u32;

/// A trigram is a 3-byte sequence stored as u32 (only lower 24 bits used)
pub type Trigram = u32;

/// Number of distinct trigram values
pub const TRIGRAM_SPACE: usize = 1 << 24;

/// File names of one shard directory.
pub const DOCID_MAP_FILE: &str = "docid.map";
pub const DOCID_META_FILE: &str = "posting.docid.meta";
pub const DOCID_DATA_FILE: &str = "posting.docid.turbopfor";
pub const POS_META_FILE: &str = "posting.pos.meta";
pub const POS_DATA_FILE: &str = "posting.pos.turbopfor";
pub const POSREL_META_FILE: &str = "posting.posrel.meta";
pub const POSREL_DATA_FILE: &str = "posting.posrel.data";

/// Every file that makes up a shard.
pub const SHARD_FILES: [&str; 7] = [
    DOCID_MAP_FILE,
    DOCID_META_FILE,
    DOCID_DATA_FILE,
    POS_META_FILE,
    POS_DATA_FILE,
    POSREL_META_FILE,
    POSREL_DATA_FILE,
];

/// The per-trigram stores of a shard. `Docid` and `Pos` hold codec data;
/// `Posrel` holds raw relation bits and its meta records carry no count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// Ascending docids, one entry per document containing the trigram.
    Docid,
    /// Byte positions, one entry per occurrence, delta-encoded per document.
    Pos,
    /// One bit per position entry, set where a new document starts.
    Posrel,
}

impl Section {
    pub fn meta_file(self) -> &'static str {
        match self {
            Section::Docid => DOCID_META_FILE,
            Section::Pos => POS_META_FILE,
            Section::Posrel => POSREL_META_FILE,
        }
    }

    pub fn data_file(self) -> &'static str {
        match self {
            Section::Docid => DOCID_DATA_FILE,
            Section::Pos => POS_DATA_FILE,
            Section::Posrel => POSREL_DATA_FILE,
        }
    }
}

/// Locates the data of one trigram within a posting store.
///
/// Persisted as 16 little-endian bytes: trigram, entry count, data offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetaEntry {
    pub trigram: Trigram,
    /// Number of encoded integers (zero in the posrel meta file)
    pub entries: u32,
    pub offset: i64,
}

impl MetaEntry {
    /// Size of a meta record in bytes (fixed-size for mmap)
    pub const SIZE: usize = 4 + 4 + 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.trigram.to_le_bytes());
        buf[4..8].copy_from_slice(&self.entries.to_le_bytes());
        buf[8..16].copy_from_slice(&self.offset.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; Self::SIZE]) -> Self {
        let [t0, t1, t2, t3, e0, e1, e2, e3, o0, o1, o2, o3, o4, o5, o6, o7] = *buf;
        Self {
            trigram: u32::from_le_bytes([t0, t1, t2, t3]),
            entries: u32::from_le_bytes([e0, e1, e2, e3]),
            offset: i64::from_le_bytes([o0, o1, o2, o3, o4, o5, o6, o7]),
        }
    }
}

/// One occurrence of a trigram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Match {
    pub docid: DocId,
    /// Byte offset of the trigram within the document
    pub position: u32,
}

/// Tuning constants for detecting text files.
///
/// A file is assumed not to be text (and is not indexed) if it contains an
/// invalid UTF-8 sequence, is longer than `max_file_len` bytes, contains a
/// line longer than `max_line_len` bytes, or contains more than
/// `max_text_trigrams` distinct trigrams.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub max_file_len: u64,
    pub max_line_len: usize,
    pub max_text_trigrams: usize,
    /// Number of files per independently written shard in `build_shard`
    pub chunk_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_file_len: 1 << 30,
            max_line_len: 2000,
            max_text_trigrams: 20000,
            chunk_size: 10000,
        }
    }
}

impl IndexConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_path(path)?;
        serde_json::from_reader(file).map_err(|source| IndexError::Config {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Knobs for the AND query planner.
///
/// The planner intersects leaves from most to least selective. Once it is in
/// the last `tail_fraction` of leaves and an intersection removes fewer than
/// `min_improvement` docids, the remaining leaves are skipped: the candidate
/// set is treated as good enough and the caller's matcher filters the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub early_exit: bool,
    pub tail_fraction: f32,
    pub min_improvement: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            early_exit: true,
            tail_fraction: 0.3,
            min_improvement: 10,
        }
    }
}

impl QueryConfig {
    /// Evaluate every leaf: results are exact set algebra.
    pub fn exact() -> Self {
        Self {
            early_exit: false,
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_path(path)?;
        serde_json::from_reader(file).map_err(|source| IndexError::Config {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Convert 3 bytes to a trigram
#[inline]
pub fn bytes_to_trigram(b0: u8, b1: u8, b2: u8) -> Trigram {
    ((b0 as u32) << 16) | ((b1 as u32) << 8) | (b2 as u32)
}

/// Convert trigram back to bytes
#[inline]
pub fn trigram_to_bytes(t: Trigram) -> [u8; 3] {
    [
        ((t >> 16) & 0xFF) as u8,
        ((t >> 8) & 0xFF) as u8,
        (t & 0xFF) as u8,
    ]
}
