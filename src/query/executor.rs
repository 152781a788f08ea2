use crate::error::Result;
use crate::index::reader::Index;
use crate::index::types::{DocId, QueryConfig, Trigram};
use crate::query::planner::{AndPlan, EarlyExit};
use crate::query::Query;
use std::cmp::Ordering;
use tracing::trace;

/// Evaluates [`Query`] trees against one index.
///
/// Every intermediate result is an ascending, duplicate-free docid list;
/// AND and OR are linear merges of such lists.
pub struct QueryExecutor<'a> {
    index: &'a Index,
    config: QueryConfig,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(index: &'a Index) -> Self {
        Self::with_config(index, index.query_config().clone())
    }

    pub fn with_config(index: &'a Index, config: QueryConfig) -> Self {
        Self { index, config }
    }

    /// The docids that may match `query`.
    pub fn execute(&self, query: &Query) -> Result<Vec<DocId>> {
        self.eval(query, None)
    }

    /// Evaluate `query`, keeping only docids in `restrict` when given.
    pub fn eval(&self, query: &Query, restrict: Option<&[DocId]>) -> Result<Vec<DocId>> {
        match query {
            Query::All => match restrict {
                Some(r) => Ok(r.to_vec()),
                None => Ok((0..self.index.docid_count()?).collect()),
            },
            Query::And { trigrams, sub } => self.eval_and(trigrams, sub, restrict),
            Query::Or { trigrams, sub } => self.eval_or(trigrams, sub, restrict),
        }
    }

    /// Posting list of `trigram` intersected with `restrict`; empty when
    /// the trigram is absent.
    fn posting_list(&self, trigram: Trigram, restrict: Option<&[DocId]>) -> Result<Vec<DocId>> {
        let list = match self.index.posting_list(trigram) {
            Ok(list) => list,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(match restrict {
            Some(r) => intersect_sorted(&list, r),
            None => list,
        })
    }

    fn eval_and(
        &self,
        trigrams: &[Trigram],
        sub: &[Query],
        restrict: Option<&[DocId]>,
    ) -> Result<Vec<DocId>> {
        // None stands for "no constraint yet"
        let mut list: Option<Vec<DocId>> = None;

        if !trigrams.is_empty() {
            let Some(plan) = AndPlan::new(self.index.docids()?, trigrams)? else {
                return Ok(Vec::new());
            };
            let exit = EarlyExit::new(&self.config, plan.len());

            for (idx, &(trigram, _)) in plan.leaves.iter().enumerate() {
                let next = match &list {
                    None => self.posting_list(trigram, restrict)?,
                    Some(current) => {
                        let postings = self.posting_list(trigram, None)?;
                        let next = intersect_sorted(current, &postings);
                        if exit.should_stop(idx, current.len(), next.len()) {
                            trace!(idx, leaves = plan.len(), "stopping AND early");
                            list = Some(next);
                            break;
                        }
                        next
                    }
                };
                if next.is_empty() {
                    return Ok(next);
                }
                list = Some(next);
            }
        }

        for q in sub {
            let next = self.eval(q, list.as_deref().or(restrict))?;
            if next.is_empty() {
                return Ok(next);
            }
            list = Some(next);
        }

        match list {
            Some(list) => Ok(list),
            // No constraints at all: the identity of intersection
            None => self.eval(&Query::All, restrict),
        }
    }

    fn eval_or(
        &self,
        trigrams: &[Trigram],
        sub: &[Query],
        restrict: Option<&[DocId]>,
    ) -> Result<Vec<DocId>> {
        let mut list: Vec<DocId> = Vec::new();
        for &trigram in trigrams {
            let postings = self.posting_list(trigram, restrict)?;
            list = union_sorted(&list, &postings);
        }
        for q in sub {
            let next = self.eval(q, restrict)?;
            list = union_sorted(&list, &next);
        }
        Ok(list)
    }
}

/// Intersection of two ascending lists.
pub fn intersect_sorted(a: &[DocId], b: &[DocId]) -> Vec<DocId> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Union of two ascending lists, duplicates collapsed.
pub fn union_sorted(a: &[DocId], b: &[DocId]) -> Vec<DocId> {
    if a.is_empty() {
        return b.to_vec();
    }
    if b.is_empty() {
        return a.to_vec();
    }
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::{bytes_to_trigram, IndexConfig};
    use crate::index::writer::Writer;
    use tempfile::{tempdir, TempDir};

    fn tri(s: &str) -> Trigram {
        let b = s.as_bytes();
        bytes_to_trigram(b[0], b[1], b[2])
    }

    fn build(docs: &[&str]) -> (TempDir, Index) {
        let dir = tempdir().unwrap();
        let mut w = Writer::create(dir.path(), IndexConfig::default()).unwrap();
        for (i, doc) in docs.iter().enumerate() {
            w.add_bytes(&format!("doc{i}"), doc.as_bytes()).unwrap();
        }
        w.flush().unwrap();
        let index = Index::open(dir.path()).unwrap();
        (dir, index)
    }

    #[test]
    fn test_intersect_and_union() {
        assert_eq!(intersect_sorted(&[1, 3, 5, 7], &[3, 4, 5, 8]), vec![3, 5]);
        assert_eq!(intersect_sorted(&[], &[1]), Vec::<DocId>::new());
        assert_eq!(union_sorted(&[1, 3, 5], &[2, 3, 6]), vec![1, 2, 3, 5, 6]);
        assert_eq!(union_sorted(&[], &[4]), vec![4]);
    }

    #[test]
    fn test_and_or_all() {
        let (_dir, index) = build(&["abc def", "abc xyz", "def xyz", "nothing"]);
        let exec = QueryExecutor::with_config(&index, QueryConfig::exact());

        let and = Query::and(vec![tri("abc"), tri("def")], vec![]);
        assert_eq!(exec.execute(&and).unwrap(), vec![0]);

        let or = Query::or(vec![tri("abc"), tri("def")], vec![]);
        assert_eq!(exec.execute(&or).unwrap(), vec![0, 1, 2]);

        assert_eq!(exec.execute(&Query::All).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(exec.eval(&Query::All, Some(&[2])).unwrap(), vec![2]);
    }

    #[test]
    fn test_missing_trigram() {
        let (_dir, index) = build(&["abc def", "abc xyz"]);
        let exec = QueryExecutor::new(&index);

        let and = Query::and(vec![tri("abc"), tri("qqq")], vec![]);
        assert!(exec.execute(&and).unwrap().is_empty());

        let or = Query::or(vec![tri("qqq"), tri("xyz")], vec![]);
        assert_eq!(exec.execute(&or).unwrap(), vec![1]);
    }

    #[test]
    fn test_nested_with_restrict() {
        let (_dir, index) = build(&["abc def", "abc xyz", "def xyz", "abc ghi"]);
        let exec = QueryExecutor::with_config(&index, QueryConfig::exact());

        // abc AND (def OR xyz)
        let q = Query::and(
            vec![tri("abc")],
            vec![Query::or(vec![tri("def"), tri("xyz")], vec![])],
        );
        assert_eq!(exec.execute(&q).unwrap(), vec![0, 1]);

        // (abc AND def) OR (def AND xyz)
        let q = Query::or(
            vec![],
            vec![
                Query::and(vec![tri("abc"), tri("def")], vec![]),
                Query::and(vec![tri("def"), tri("xyz")], vec![]),
            ],
        );
        assert_eq!(exec.execute(&q).unwrap(), vec![0, 2]);
        assert_eq!(exec.eval(&q, Some(&[2, 3])).unwrap(), vec![2]);
    }

    #[test]
    fn test_empty_nodes() {
        let (_dir, index) = build(&["abc", "def"]);
        let exec = QueryExecutor::new(&index);
        assert_eq!(exec.execute(&Query::and(vec![], vec![])).unwrap(), vec![0, 1]);
        assert!(exec.execute(&Query::or(vec![], vec![])).unwrap().is_empty());
        let sub_only = Query::and(vec![], vec![Query::literal("def")]);
        assert_eq!(exec.execute(&sub_only).unwrap(), vec![1]);
    }

    #[test]
    fn test_early_exit_keeps_superset() {
        // One selective leaf and many leaves present in every document
        let docs: Vec<String> = (0..20)
            .map(|i| format!("abcdefghijklmnop {}", if i == 3 { "zzz" } else { "yyy" }))
            .collect();
        let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
        let (_dir, index) = build(&refs);

        let q = Query::literal("abcdefghijklmnop zzz");
        let exact = QueryExecutor::with_config(&index, QueryConfig::exact());
        assert_eq!(exact.execute(&q).unwrap(), vec![3]);

        let fast = QueryExecutor::new(&index);
        let result = fast.execute(&q).unwrap();
        assert!(result.contains(&3));
    }
}
