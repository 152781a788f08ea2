use crate::error::Result;
use crate::index::section::SectionReader;
use crate::index::types::{QueryConfig, Trigram};

/// Evaluation order for the trigram leaves of an AND node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndPlan {
    /// (trigram, docid entry count), most selective first
    pub leaves: Vec<(Trigram, u32)>,
}

impl AndPlan {
    /// Order `trigrams` by their entry count in the docid store.
    ///
    /// Returns `None` when a trigram is absent from the shard: the
    /// intersection is then empty without reading any posting list.
    pub fn new(docids: &SectionReader, trigrams: &[Trigram]) -> Result<Option<Self>> {
        let mut leaves = Vec::with_capacity(trigrams.len());
        for &t in trigrams {
            match docids.meta_entry(t)? {
                Some(me) => leaves.push((t, me.entries)),
                None => return Ok(None),
            }
        }
        leaves.sort_by_key(|&(t, entries)| (entries, t));
        leaves.dedup_by_key(|&mut (t, _)| t);
        Ok(Some(Self { leaves }))
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }
}

/// Decides whether the remaining AND leaves are worth evaluating.
///
/// In the tail of the plan, an intersection that shrank the candidate set
/// by fewer than `min_improvement` docids ends evaluation: the candidate
/// set is good enough for the caller's matcher to filter.
#[derive(Debug, Clone, Copy)]
pub struct EarlyExit {
    enabled: bool,
    tail_start: f32,
    min_improvement: usize,
}

impl EarlyExit {
    pub fn new(config: &QueryConfig, leaves: usize) -> Self {
        let tail = config.tail_fraction.clamp(0.0, 1.0);
        Self {
            enabled: config.early_exit,
            tail_start: (1.0 - tail) * leaves as f32,
            min_improvement: config.min_improvement,
        }
    }

    /// Called after intersecting leaf `idx`, which took the candidate set
    /// from `before` to `after` docids.
    #[inline]
    pub fn should_stop(&self, idx: usize, before: usize, after: usize) -> bool {
        self.enabled
            && idx as f32 > self.tail_start
            && before.saturating_sub(after) < self.min_improvement
    }
}
