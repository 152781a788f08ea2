//! # trindex - trigram search index engine
//!
//! trindex builds and serves trigram indexes over source code. Given a
//! boolean formula over trigrams (typically compiled from a regular
//! expression) it returns the documents that may match, and for literals it
//! returns the exact byte offsets at which they occur.
//!
//! ## Architecture
//!
//! - [`index`] - On-disk shards: codec, posting stores, writer, reader, merge
//! - [`query`] - Boolean query trees and their selectivity-ordered evaluation
//! - [`error`] - The [`IndexError`] taxonomy
//! - [`utils`] - Trigram helpers, varints, progress bars
//!
//! A shard is a directory of seven files: the docid map, the docid and
//! position posting stores (meta + codec data each) and the relation
//! stream that ties positions to documents.
//!
//! ## Quick Start
//!
//! ```no_run
//! use trindex::index::{Index, IndexConfig, Writer};
//! use trindex::query::Query;
//! use std::path::Path;
//!
//! # fn main() -> trindex::Result<()> {
//! let mut writer = Writer::create(Path::new("/tmp/shard"), IndexConfig::default())?;
//! writer.add_bytes("hello.txt", b"hello world")?;
//! writer.flush()?;
//!
//! let index = Index::open(Path::new("/tmp/shard"))?;
//! let docids = index.posting_query(&Query::literal("world"))?;
//! let hits = index.query_positional("lo wo")?;
//! # Ok(())
//! # }
//! ```
//!
//! Shards built independently (for example one per chunk of files, in
//! parallel) are combined with [`index::concat_n`], which never re-reads
//! source text.

pub mod error;
pub mod index;
pub mod query;
pub mod utils;

pub use error::{IndexError, RejectReason, Result};
