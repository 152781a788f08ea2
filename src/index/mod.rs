pub mod build;
pub mod docid_map;
pub mod merge;
pub mod mmap;
pub mod pfor;
pub mod posrel;
pub mod reader;
pub mod section;
pub mod stats;
pub mod types;
pub mod writer;

pub use docid_map::DocidMap;
pub use merge::{concat_n, MergeStats};
pub use reader::{Index, VerifyReport};
pub use types::*;
pub use writer::Writer;
