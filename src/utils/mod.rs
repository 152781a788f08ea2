//! Utility functions and data structures.
//!
//! - [`encoding`] - Little-endian helpers, varints and a counting writer
//! - [`trigram`] - Trigram extraction helpers and the reusable [`TrigramSet`]
//! - [`progress`] - Progress bars that compile away without the `progress` feature

pub mod encoding;
pub mod progress;
pub mod trigram;

pub use encoding::*;
pub use trigram::*;
