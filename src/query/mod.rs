//! Boolean trigram queries.
//!
//! A [`Query`] is produced by an external compiler (e.g. from a regular
//! expression) and evaluated against an index by the [`QueryExecutor`]:
//!
//! - [`planner`] orders AND leaves by selectivity and decides when to stop
//! - [`executor`] evaluates the tree with sorted-list merges

pub mod executor;
pub mod planner;

pub use executor::{intersect_sorted, union_sorted, QueryExecutor};
pub use planner::AndPlan;

use crate::index::types::Trigram;
use crate::utils::trigram::{format_trigram, query_trigrams};
use std::fmt;

/// A boolean formula over trigrams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Every document (only meaningful as an unconstrained root)
    All,
    /// Documents containing every trigram and matching every subquery
    And { trigrams: Vec<Trigram>, sub: Vec<Query> },
    /// Documents containing any trigram or matching any subquery
    Or { trigrams: Vec<Trigram>, sub: Vec<Query> },
}

impl Query {
    pub fn and(trigrams: Vec<Trigram>, sub: Vec<Query>) -> Self {
        Query::And { trigrams, sub }
    }

    pub fn or(trigrams: Vec<Trigram>, sub: Vec<Query>) -> Self {
        Query::Or { trigrams, sub }
    }

    /// AND of every trigram in `literal`; `All` if it is shorter than a trigram.
    pub fn literal(literal: &str) -> Self {
        let trigrams = query_trigrams(literal.as_bytes());
        if trigrams.is_empty() {
            Query::All
        } else {
            Query::and(trigrams, Vec::new())
        }
    }

    /// OR of the literals, each an AND of its trigrams.
    pub fn any_literal<'a>(literals: impl IntoIterator<Item = &'a str>) -> Self {
        let sub: Vec<Query> = literals.into_iter().map(Query::literal).collect();
        if sub.contains(&Query::All) {
            Query::All
        } else {
            Query::or(Vec::new(), sub)
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (op, trigrams, sub) = match self {
            Query::All => return f.write_str("+"),
            Query::And { trigrams, sub } => (" ", trigrams, sub),
            Query::Or { trigrams, sub } => ("|", trigrams, sub),
        };
        let parts: Vec<String> = trigrams
            .iter()
            .map(|&t| format!("\"{}\"", format_trigram(t)))
            .chain(sub.iter().map(|q| format!("({q})")))
            .collect();
        if parts.is_empty() {
            // Empty AND is everything, empty OR nothing
            return f.write_str(if op == " " { "+" } else { "-" });
        }
        f.write_str(&parts.join(op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal() {
        assert_eq!(Query::literal("ab"), Query::All);
        assert_eq!(
            Query::literal("abcd"),
            Query::and(vec![0x616263, 0x626364], vec![])
        );
    }

    #[test]
    fn test_any_literal() {
        assert_eq!(Query::any_literal(["abc", "x"]), Query::All);
        let q = Query::any_literal(["abc", "def"]);
        assert_eq!(q.to_string(), "(\"abc\")|(\"def\")");
    }

    #[test]
    fn test_display() {
        let q = Query::and(vec![0x616263], vec![Query::or(vec![0x646566, 0x676869], vec![])]);
        assert_eq!(q.to_string(), "\"abc\" (\"def\"|\"ghi\")");
        assert_eq!(Query::or(vec![], vec![]).to_string(), "-");
        assert_eq!(Query::All.to_string(), "+");
    }
}
