//! Explaining queries
//!
//! A trace walks every node of the tree, not only the ones a query can reach.
//! Each step carries an evidence chain: when a child does not satisfy the query
//! the child's chain gains an `(dimension, operator, codes)` entry. Chains are
//! persistent linked lists, so siblings share their parent's entries.
//!
//! At a leaf, selections on a fully satisfied path are recorded as found;
//! otherwise the chain is merged into that selection's mismatches. A selection
//! found on any path is never reported as a mismatch.

use crate::dimension::{Codes, Dimension};
use crate::error::Result;
use crate::node::{BranchKind, TreeNode};
use crate::operator::{Direction, Operator};
use crate::tree::{Joined, Tree};
use crate::value::Value;
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Mismatched record codes by dimension index and operator
type Mismatches = BTreeMap<usize, BTreeMap<Operator, BTreeSet<i64>>>;

#[derive(Debug)]
struct Evidence {
    dimension: usize,
    operator: Operator,
    codes: SmallVec<[i64; 2]>,
    parent: EvidenceChain,
}

#[derive(Debug, Clone, Default)]
struct EvidenceChain(Option<Arc<Evidence>>);

impl EvidenceChain {
    fn push(
        &self,
        dimension: usize,
        operator: Operator,
        codes: impl IntoIterator<Item = i64>,
    ) -> Self {
        EvidenceChain(Some(Arc::new(Evidence {
            dimension,
            operator,
            codes: codes.into_iter().collect(),
            parent: self.clone(),
        })))
    }

    fn iter(&self) -> impl Iterator<Item = &Evidence> {
        std::iter::successors(self.0.as_deref(), |e| e.parent.0.as_deref())
    }
}

struct TraceWalk<'t, T, F> {
    tree: &'t Tree<T>,
    codes: &'t [Codes],
    keep: F,
    found: BTreeSet<T>,
    failures: BTreeMap<T, Mismatches>,
}

impl<'t, T, F> TraceWalk<'t, T, F>
where
    T: Clone + Ord,
    F: Fn(&T) -> bool,
{
    fn new(tree: &'t Tree<T>, codes: &'t [Codes], keep: F) -> Self {
        Self {
            tree,
            codes,
            keep,
            found: BTreeSet::new(),
            failures: BTreeMap::new(),
        }
    }

    /// Found selections win over mismatches collected on other paths
    fn finish(mut self) -> (BTreeSet<T>, BTreeMap<T, Mismatches>) {
        let found = &self.found;
        self.failures.retain(|selection, _| !found.contains(selection));
        (self.found, self.failures)
    }

    fn visit(
        &mut self,
        node: Option<&TreeNode<T>>,
        chain: &EvidenceChain,
        success: bool,
    ) -> Result<()> {
        let Some(node) = node else {
            return Ok(());
        };
        let codes = self.codes;
        let tree: &'t Tree<T> = self.tree;
        let dimensions = &tree.dimensions;

        match node {
            TreeNode::Leaf(leaf) => {
                for selection in &leaf.selections {
                    if success {
                        self.found.insert(selection.clone());
                        continue;
                    }
                    if !(self.keep)(selection) {
                        continue;
                    }
                    let mismatches = self.failures.entry(selection.clone()).or_default();
                    for evidence in chain.iter() {
                        mismatches
                            .entry(evidence.dimension)
                            .or_default()
                            .entry(evidence.operator)
                            .or_default()
                            .extend(evidence.codes.iter().copied());
                    }
                }
            }
            TreeNode::Branch(branch) => {
                self.visit(branch.any.as_deref(), chain, success)?;
                let dimension = branch.dimension;
                let dim = &dimensions[dimension];
                let query = &codes[dimension];
                match &branch.kind {
                    BranchKind::Sets(sets) => {
                        for set in sets {
                            let matched =
                                !query.is_any() && set.accepts(dim, query.as_slice())?;
                            let next = if matched {
                                chain.clone()
                            } else {
                                chain.push(dimension, set.operator(dim), set.codes.sorted())
                            };
                            self.visit(set.child.as_deref(), &next, success && matched)?;
                        }
                    }
                    BranchKind::Compare {
                        split,
                        left,
                        equal,
                        right,
                    } => {
                        let direction = if query.is_any() {
                            Direction::NONE
                        } else {
                            dim.direction(query.as_slice(), *split)?
                        };

                        let left_ok = success && direction.contains(Direction::LEFT);
                        self.visit(left.as_deref(), chain, left_ok)?;

                        let matched = direction.contains(Direction::EQUAL);
                        let next = if matched {
                            chain.clone()
                        } else {
                            chain.push(dimension, dim.operator_or_contains(), [*split])
                        };
                        self.visit(equal.as_deref(), &next, success && matched)?;

                        let right_ok = success && direction.contains(Direction::RIGHT);
                        self.visit(right.as_deref(), chain, right_ok)?;
                    }
                }
            }
            TreeNode::Hash(hash) => {
                self.visit(hash.any.as_deref(), chain, success)?;
                let dimension = hash.dimension;
                let operator = dimensions[dimension].operator_or_contains();
                let query = codes[dimension].as_slice();
                for (slot, child) in hash.slots.iter().enumerate() {
                    let Some(child) = child.as_deref() else {
                        continue;
                    };
                    let code = slot as i64;
                    let matched = query.binary_search(&code).is_ok();
                    let next = if matched {
                        chain.clone()
                    } else {
                        chain.push(dimension, operator, [code])
                    };
                    self.visit(Some(child), &next, success && matched)?;
                }
            }
        }
        Ok(())
    }
}

/// A pre-filter that rejected the traced query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreFilterRejection {
    pub dimension: String,
    pub dimension_index: usize,
    /// Rendered query value
    pub value: String,
}

/// Mismatch evidence of one selection on one dimension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceLine {
    pub dimension: String,
    pub dimension_index: usize,
    /// Record values and operators, e.g. `[1,2] CONTAINS, [7] NOT_CONTAINS`
    pub expected: String,
    /// Rendered query value
    pub actual: String,
}

/// Outcome of [`Tree::trace`]
#[derive(Debug, Clone, PartialEq)]
pub struct TraceReport<T> {
    query: String,
    tree_empty: bool,
    rejections: Vec<PreFilterRejection>,
    mismatches: Vec<(T, Vec<EvidenceLine>)>,
    found: Vec<T>,
}

impl<T> TraceReport<T> {
    /// Query line content, `[d1:1,d2:Test2]`
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_tree_empty(&self) -> bool {
        self.tree_empty
    }

    /// Nothing rejected and no reachable selection mismatched
    pub fn is_all_ok(&self) -> bool {
        !self.tree_empty && self.rejections.is_empty() && self.mismatches.is_empty()
    }

    pub fn rejections(&self) -> &[PreFilterRejection] {
        &self.rejections
    }

    /// Mismatched selections in ascending order with their evidence
    pub fn mismatches(&self) -> &[(T, Vec<EvidenceLine>)] {
        &self.mismatches
    }

    /// Selections `find` returns for the same query, ascending
    pub fn found(&self) -> &[T] {
        &self.found
    }
}

impl<T: fmt::Display> fmt::Display for TraceReport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "query = {}", self.query)?;
        if self.tree_empty {
            return writeln!(f, "Tree is empty");
        }

        if !self.rejections.is_empty() {
            writeln!(f, "Tree Prefilters:")?;
            for rejection in &self.rejections {
                writeln!(f, "  Dimension: {}, q: {}", rejection.dimension, rejection.value)?;
            }
        }

        if !self.mismatches.is_empty() {
            writeln!(f, "Expecting:")?;
            for (selection, lines) in &self.mismatches {
                writeln!(f, "{}: ", selection)?;
                for line in lines {
                    writeln!(
                        f,
                        "    {}/{}: {} {}",
                        line.dimension, line.dimension_index, line.expected, line.actual
                    )?;
                }
            }
        } else if self.rejections.is_empty() {
            writeln!(f, "ALL OK")?;
        }

        writeln!(f, "Found:")?;
        if self.found.is_empty() {
            writeln!(f, "0 selections")
        } else {
            writeln!(f, "{}", Joined(&self.found))
        }
    }
}

fn render_query(dimensions: &[Dimension], query: &[Value]) -> String {
    let parts: Vec<String> = dimensions
        .iter()
        .zip(query)
        .map(|(dimension, value)| format!("{}:{}", dimension.name(), value.display_query()))
        .collect();
    format!("[{}]", parts.join(","))
}

/// `[a,b,...]`, listing at most `limit` codes
fn render_codes(dimension: &Dimension, codes: &BTreeSet<i64>, limit: usize) -> String {
    let mut parts: Vec<String> = codes
        .iter()
        .take(limit)
        .map(|&code| dimension.display_code(code))
        .collect();
    if codes.len() > limit {
        parts.push("...".to_string());
    }
    format!("[{}]", parts.join(","))
}

impl<T: Clone + Ord> Tree<T> {
    /// Explain which records a query matches and why the others fail
    pub fn trace(&self, query: &[Value]) -> Result<TraceReport<T>> {
        self.trace_filtered(query, |_| true)
    }

    /// [`trace`](Self::trace) with mismatches listed only for selections
    /// accepted by `keep`. Found selections are reported whatever `keep` says.
    pub fn trace_filtered<F>(&self, query: &[Value], keep: F) -> Result<TraceReport<T>>
    where
        F: Fn(&T) -> bool,
    {
        let codes = self.canonicalize(query)?;
        let mut report = TraceReport {
            query: render_query(&self.dimensions, query),
            tree_empty: self.root.is_none(),
            rejections: Vec::new(),
            mismatches: Vec::new(),
            found: Vec::new(),
        };
        let Some(root) = self.root.as_deref() else {
            return Ok(report);
        };

        report.rejections = self
            .rejecting_prefilters(&codes)
            .map(|prefilter| {
                let index = prefilter.dimension();
                PreFilterRejection {
                    dimension: self.dimensions[index].name().to_string(),
                    dimension_index: index,
                    value: query[index].display_query(),
                }
            })
            .collect();
        if !report.rejections.is_empty() {
            return Ok(report);
        }

        let mut walk = TraceWalk::new(self, &codes, keep);
        walk.visit(Some(root), &EvidenceChain::default(), true)?;
        let (found, failures) = walk.finish();

        report.found = found.into_iter().collect();
        report.mismatches = failures
            .into_iter()
            .map(|(selection, mismatches)| (selection, self.evidence_lines(&mismatches, query)))
            .collect();
        Ok(report)
    }

    /// Per selection, the number of `queries` in which each dimension
    /// mismatched, keyed by dimension name.
    ///
    /// Pre-filters are not consulted.
    pub fn trace_statistics(
        &self,
        queries: &[Vec<Value>],
    ) -> Result<BTreeMap<T, BTreeMap<String, usize>>> {
        let mut statistics: BTreeMap<T, BTreeMap<String, usize>> = BTreeMap::new();
        let Some(root) = self.root.as_deref() else {
            return Ok(statistics);
        };

        for query in queries {
            let codes = self.canonicalize(query)?;
            let mut walk = TraceWalk::new(self, &codes, |_: &T| true);
            walk.visit(Some(root), &EvidenceChain::default(), true)?;
            let (_, failures) = walk.finish();

            for (selection, mismatches) in failures {
                let counts = statistics.entry(selection).or_default();
                for dimension in mismatches.keys() {
                    *counts
                        .entry(self.dimensions[*dimension].name().to_string())
                        .or_default() += 1;
                }
            }
        }
        Ok(statistics)
    }

    fn evidence_lines(&self, mismatches: &Mismatches, query: &[Value]) -> Vec<EvidenceLine> {
        let limit = self.config.max_trace_list_count;
        mismatches
            .iter()
            .map(|(&index, by_operator)| {
                let dimension = &self.dimensions[index];
                let expected: Vec<String> = by_operator
                    .iter()
                    .map(|(operator, codes)| {
                        format!("{} {}", render_codes(dimension, codes, limit), operator)
                    })
                    .collect();
                EvidenceLine {
                    dimension: dimension.name().to_string(),
                    dimension_index: index,
                    expected: expected.join(", "),
                    actual: query[index].display_compact(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::value::{ArrayValue, ValueData};

    fn array_tree() -> Tree<&'static str> {
        let dims = vec![Dimension::long("d1", None, None)];
        let records = vec![
            ValueData::new("1", [ArrayValue::or([1i64, 2])]),
            ValueData::new("2", [ArrayValue::or([1i64, 2])]),
            ValueData::new("3", [ArrayValue::or([1i64, 2, 3])]),
        ];
        Tree::build(&dims, &records, TreeConfig::default()).unwrap()
    }

    #[test]
    fn test_evidence_chain_is_persistent() {
        let root = EvidenceChain::default();
        let left = root.push(0, Operator::Contains, [1]);
        let right = root.push(1, Operator::Contains, [2]);
        let deeper = left.push(2, Operator::NotContains, [3, 4]);
        assert_eq!(root.iter().count(), 0);
        assert_eq!(right.iter().count(), 1);
        let dims: Vec<usize> = deeper.iter().map(|e| e.dimension).collect();
        assert_eq!(dims, vec![2, 0]);
    }

    #[test]
    fn test_array_trace_all_ok() {
        let report = array_tree().trace(&[Value::from(1i64)]).unwrap();
        assert!(report.is_all_ok());
        assert_eq!(report.found(), &["1", "2", "3"]);
        assert_eq!(report.to_string(), "query = [d1:1]\nALL OK\nFound:\n1, 2, 3\n");
    }

    #[test]
    fn test_array_trace_mismatch() {
        let report = array_tree().trace(&[Value::from(3i64)]).unwrap();
        let mismatched: Vec<&str> = report.mismatches().iter().map(|(s, _)| *s).collect();
        assert_eq!(mismatched, vec!["1", "2"]);
        assert_eq!(report.mismatches()[0].1[0].expected, "[1,2] CONTAINS");
        assert_eq!(report.found(), &["3"]);
    }

    #[test]
    fn test_trace_filtered() {
        let report = array_tree()
            .trace_filtered(&[Value::from(3i64)], |s| *s != "1")
            .unwrap();
        assert_eq!(report.mismatches().len(), 1);
        assert_eq!(report.mismatches()[0].0, "2");
    }

    #[test]
    fn test_trace_filtered_reports_every_found_selection() {
        let tree = array_tree();
        let report = tree
            .trace_filtered(&[Value::from(3i64)], |s| *s == "1")
            .unwrap();
        let found: Vec<&str> = tree
            .find(&[Value::from(3i64)])
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(report.found(), found.as_slice());
        assert_eq!(report.found(), &["3"]);
        assert_eq!(report.mismatches().len(), 1);
        assert_eq!(report.mismatches()[0].0, "1");
    }

    #[test]
    fn test_value_list_evidence_uses_dimension_operator() {
        let dims = vec![Dimension::long("d1", Some(Operator::GreaterThenOrEqualTo), None)];
        let records = vec![
            ValueData::new("a", [Value::from(vec![2i64, 4])]),
            ValueData::new("b", [Value::from(9i64)]),
        ];
        let tree = Tree::build(&dims, &records, TreeConfig::default()).unwrap();

        let report = tree.trace(&[Value::from(3i64)]).unwrap();
        assert_eq!(report.found(), &["a", "b"]);

        let report = tree.trace(&[Value::from(5i64)]).unwrap();
        assert_eq!(report.found(), &["b"]);
        assert_eq!(report.mismatches()[0].0, "a");
        assert_eq!(
            report.mismatches()[0].1[0].expected,
            "[2,4] GREATER_THEN_OR_EQUAL_TO"
        );
    }

    #[test]
    fn test_list_is_capped() {
        let dims = vec![Dimension::long("d1", None, None)];
        let records = vec![ValueData::new("a", [ArrayValue::or([1i64, 2, 3, 4])])];
        let config = TreeConfig::default().with_max_trace_list_count(2);
        let tree = Tree::build(&dims, &records, config).unwrap();
        let report = tree.trace(&[Value::from(9i64)]).unwrap();
        assert_eq!(report.mismatches()[0].1[0].expected, "[1,2,...] CONTAINS");
    }

    #[test]
    fn test_empty_tree_report() {
        let dims = vec![Dimension::long("d1", Some(Operator::Contains), None)];
        let tree = Tree::<&str>::build(&dims, &[], TreeConfig::default()).unwrap();
        let report = tree.trace(&[Value::from(1i64)]).unwrap();
        assert!(report.is_tree_empty());
        assert!(!report.is_all_ok());
        assert_eq!(report.to_string(), "query = [d1:1]\nTree is empty\n");
    }
}
