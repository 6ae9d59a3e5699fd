//! Tree construction
//!
//! Records are canonicalized once into rows of [`Cell`]s, then partitioned
//! recursively. At each level the builder picks the unused dimension that best
//! separates the current rows:
//!
//! - scalar dimensions: most distinct codes wins, ties to higher priority
//! - array dimensions: fewest distinct array values wins, ties to higher priority
//! - any scalar candidate beats every array candidate
//!
//! Every record is exactly one row. A record holding several codes for a
//! scalar dimension keeps them together as one value list; rows with value
//! lists are dispatched through a set branch before the dimension is split on
//! single codes, and the record is reached when any listed code matches.
//!
//! Recursion depth is bounded by the dimension count plus the binary split
//! chain of each dimension (logarithmic in its distinct codes).

use crate::config::TreeConfig;
use crate::dimension::{Codes, Dimension};
use crate::error::{Result, TreeError};
use crate::node::{Branch, BranchKind, Child, HashBranch, Leaf, SetBranch, TreeNode};
use crate::prefilter::{self, PreFilter, PreFilterBuilder};
use crate::value::{ArrayOperation, Value, ValueData};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::sync::Arc;

/// Exclusive upper bound on the codes a hash node may index
pub const MAX_HASH_SLOTS: i64 = 1 << 16;

/// Canonical array value, or value list, of one record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ArrayKey {
    operation: ArrayOperation,
    /// Sorted, deduplicated
    codes: SmallVec<[i64; 4]>,
}

/// One dimension of a canonicalized row; `None` routes through `any`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Cell {
    Scalar(Option<i64>),
    /// Two or more codes on a scalar dimension, as an OR key
    List(Arc<ArrayKey>),
    Array(Option<Arc<ArrayKey>>),
}

impl Cell {
    fn code(&self) -> Option<i64> {
        match self {
            Cell::Scalar(code) => *code,
            Cell::List(_) | Cell::Array(_) => None,
        }
    }

    fn list(&self) -> Option<&Arc<ArrayKey>> {
        match self {
            Cell::List(key) => Some(key),
            Cell::Scalar(_) | Cell::Array(_) => None,
        }
    }

    fn array(&self) -> Option<&Arc<ArrayKey>> {
        match self {
            Cell::Array(key) => key.as_ref(),
            Cell::Scalar(_) | Cell::List(_) => None,
        }
    }

    fn is_absent(&self) -> bool {
        matches!(self, Cell::Scalar(None) | Cell::Array(None))
    }
}

#[derive(Debug)]
struct Row {
    record: usize,
    cells: Vec<Cell>,
}

/// Everything `build` produces
#[derive(Debug)]
pub(crate) struct Built<T> {
    pub root: Child<T>,
    /// Fresh copies holding this build's interning state
    pub dimensions: Vec<Dimension>,
    pub prefilters: Vec<PreFilter>,
    /// Records dropped by fail-on-empty dimensions
    pub dropped: usize,
}

enum Split {
    Scalar(usize),
    Array(usize),
}

/// Candidate dimension: (index, distinct count, priority)
type Candidate = (usize, usize, i32);

/// Build a tree over `records`.
///
/// Fails with [`TreeError::RecordWidth`] or [`TreeError::TypeMismatch`]; no
/// partial tree is returned.
pub(crate) fn build<T: Clone>(
    dimensions: &[Dimension],
    records: &[ValueData<T>],
    config: &TreeConfig,
) -> Result<Built<T>> {
    for record in records {
        if record.attributes.len() != dimensions.len() {
            return Err(TreeError::RecordWidth {
                expected: dimensions.len(),
                actual: record.attributes.len(),
            });
        }
    }

    let kept: Vec<&ValueData<T>> = records
        .iter()
        .filter(|record| {
            !dimensions
                .iter()
                .zip(&record.attributes)
                .any(|(dimension, value)| dimension.fail_on_empty() && value.is_empty())
        })
        .collect();
    let dropped = records.len() - kept.len();
    if dropped > 0 {
        tracing::debug!(dropped, "records dropped by fail-on-empty dimensions");
    }

    let mut dimensions: Vec<Dimension> = dimensions.iter().map(Dimension::fresh_copy).collect();
    for record in &kept {
        for (dimension, value) in dimensions.iter_mut().zip(&record.attributes) {
            dimension.init(value);
        }
    }

    let mut prefilters: Vec<PreFilterBuilder> = if config.prefilter && !kept.is_empty() {
        dimensions
            .iter()
            .enumerate()
            .filter(|(_, dimension)| prefilter::eligible(dimension))
            .map(|(index, _)| PreFilterBuilder::new(index))
            .collect()
    } else {
        Vec::new()
    };

    let mut rows = Vec::with_capacity(kept.len());
    for (index, record) in kept.iter().enumerate() {
        let cells = dimensions
            .iter()
            .zip(&record.attributes)
            .map(|(dimension, value)| encode(dimension, value))
            .collect::<Result<Vec<_>>>()?;
        for builder in &mut prefilters {
            let index = builder.dimension();
            add_prefilter_value(builder, &cells[index]);
        }
        rows.push(Row {
            record: index,
            cells,
        });
    }

    let total_distinct = dimensions
        .iter()
        .enumerate()
        .map(|(index, _)| {
            rows.iter()
                .map(|row| &row.cells[index])
                .collect::<FxHashSet<_>>()
                .len()
        })
        .collect();

    let builder = TreeBuilder {
        dimensions: &dimensions,
        records: &kept,
        rows: &rows,
        total_distinct,
        hash_fill_factor: config.hash_fill_factor,
    };
    let all: Vec<usize> = (0..rows.len()).collect();
    let root = builder.node(all, &vec![false; dimensions.len()]);

    Ok(Built {
        root,
        prefilters: prefilters.into_iter().filter_map(PreFilterBuilder::finish).collect(),
        dimensions,
        dropped,
    })
}

fn add_prefilter_value(builder: &mut PreFilterBuilder, cell: &Cell) {
    match cell {
        Cell::Scalar(None) | Cell::Array(None) => builder.add(None),
        Cell::Scalar(Some(code)) => {
            builder.add(Some((ArrayOperation::Or, std::slice::from_ref(code))));
        }
        Cell::List(key) | Cell::Array(Some(key)) => {
            builder.add(Some((key.operation, key.codes.as_slice())));
        }
    }
}

/// Canonicalize one record value into its cell
fn encode(dimension: &Dimension, value: &Value) -> Result<Cell> {
    if dimension.is_array() {
        let operation = match value {
            Value::Array(array) => array.operation(),
            _ => ArrayOperation::Or,
        };
        return Ok(match dimension.canonicalize_or(value, &Codes::Any)? {
            Codes::Any => Cell::Array(None),
            Codes::Values(codes) => {
                let mut codes: SmallVec<[i64; 4]> = codes.into_iter().collect();
                codes.dedup();
                Cell::Array(Some(Arc::new(ArrayKey { operation, codes })))
            }
        });
    }

    if let Value::Array(array) = value {
        return Err(TreeError::type_mismatch(
            dimension.name(),
            "scalar value",
            format!("array {}", array),
        ));
    }
    Ok(match dimension.canonicalize_or(value, &Codes::Any)? {
        Codes::Any => Cell::Scalar(None),
        Codes::Values(codes) => {
            let mut codes: SmallVec<[i64; 4]> = codes.into_iter().collect();
            codes.dedup();
            match codes.as_slice() {
                [code] => Cell::Scalar(Some(*code)),
                _ => Cell::List(Arc::new(ArrayKey {
                    operation: ArrayOperation::Or,
                    codes,
                })),
            }
        }
    })
}

fn mark_used(used: &[bool], dimension: usize) -> Vec<bool> {
    let mut next = used.to_vec();
    next[dimension] = true;
    next
}

struct TreeBuilder<'a, T> {
    dimensions: &'a [Dimension],
    records: &'a [&'a ValueData<T>],
    rows: &'a [Row],
    /// Distinct cells per dimension across the whole dataset, `any` included
    total_distinct: Vec<usize>,
    hash_fill_factor: f64,
}

impl<T: Clone> TreeBuilder<'_, T> {
    fn node(&self, rows: Vec<usize>, used: &[bool]) -> Child<T> {
        if rows.is_empty() {
            return None;
        }
        let node = match self.choose(&rows, used) {
            None => self.leaf(rows),
            Some(Split::Scalar(dimension)) => self.split_scalar(dimension, rows, used),
            Some(Split::Array(dimension)) => self.split_array(dimension, rows, used),
        };
        Some(Box::new(node))
    }

    fn leaf(&self, rows: Vec<usize>) -> TreeNode<T> {
        let mut records: Vec<usize> = rows.into_iter().map(|r| self.rows[r].record).collect();
        records.sort_unstable();
        TreeNode::Leaf(Leaf {
            selections: records
                .into_iter()
                .map(|r| self.records[r].selection.clone())
                .collect(),
        })
    }

    fn choose(&self, rows: &[usize], used: &[bool]) -> Option<Split> {
        let mut scalar: Option<Candidate> = None;
        let mut array: Option<Candidate> = None;

        for (index, dimension) in self.dimensions.iter().enumerate() {
            if used[index] {
                continue;
            }
            let priority = dimension.priority();
            if dimension.is_array() {
                let count = rows
                    .iter()
                    .filter_map(|&r| self.rows[r].cells[index].array())
                    .collect::<FxHashSet<_>>()
                    .len();
                if count == 0 {
                    continue;
                }
                let better = array.map_or(true, |(_, best, best_priority)| {
                    count < best || (count == best && priority > best_priority)
                });
                if better {
                    array = Some((index, count, priority));
                }
            } else {
                // a value list counts as one value
                let count = rows
                    .iter()
                    .map(|&r| &self.rows[r].cells[index])
                    .filter(|cell| !cell.is_absent())
                    .collect::<FxHashSet<_>>()
                    .len();
                if count == 0 {
                    continue;
                }
                let better = scalar.map_or(true, |(_, best, best_priority)| {
                    count > best || (count == best && priority > best_priority)
                });
                if better {
                    scalar = Some((index, count, priority));
                }
            }
        }

        scalar
            .map(|(index, ..)| Split::Scalar(index))
            .or_else(|| array.map(|(index, ..)| Split::Array(index)))
    }

    fn split_scalar(&self, dimension: usize, rows: Vec<usize>, used: &[bool]) -> TreeNode<T> {
        // value lists first; the remaining rows are split again under `any`
        if rows.iter().any(|&r| self.rows[r].cells[dimension].list().is_some()) {
            return self.split_sets(dimension, rows, used, Cell::list);
        }

        let code = |r: usize| self.rows[r].cells[dimension].code();
        let (any, mut present): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| code(r).is_none());
        present.sort_by_key(|&r| code(r));

        let mut unique: Vec<i64> = present.iter().filter_map(|&r| code(r)).collect();
        unique.dedup();

        let any = self.node(any, used);
        let marked = mark_used(used, dimension);

        if self.use_hash(dimension, &unique) {
            let max = unique.last().copied().unwrap_or_default();
            let mut slots: Vec<Child<T>> = (0..=max).map(|_| None).collect();
            let mut start = 0;
            while start < present.len() {
                let current = code(present[start]);
                let end = present[start..]
                    .iter()
                    .position(|&r| code(r) != current)
                    .map_or(present.len(), |offset| start + offset);
                if let Some(slot) = current.and_then(|c| usize::try_from(c).ok()) {
                    slots[slot] = self.node(present[start..end].to_vec(), &marked);
                }
                start = end;
            }
            return TreeNode::Hash(HashBranch {
                dimension,
                any,
                slots,
            });
        }

        let split = unique[unique.len() / 2];
        let mut left = Vec::new();
        let mut equal = Vec::new();
        let mut right = Vec::new();
        for r in present {
            match code(r) {
                Some(c) if c < split => left.push(r),
                Some(c) if c > split => right.push(r),
                _ => equal.push(r),
            }
        }

        TreeNode::Branch(Branch {
            dimension,
            any,
            kind: BranchKind::Compare {
                split,
                left: self.node(left, used),
                equal: self.node(equal, &marked),
                right: self.node(right, used),
            },
        })
    }

    /// Hash dispatch for dense equality splits over small non-negative codes
    fn use_hash(&self, dimension: usize, unique: &[i64]) -> bool {
        let contains = self.dimensions[dimension]
            .operation()
            .is_some_and(|operation| operation.is_contains());
        let (Some(&min), Some(&max)) = (unique.first(), unique.last()) else {
            return false;
        };
        let fill = unique.len() as f64 / self.total_distinct[dimension].max(1) as f64;
        contains
            && unique.len() > 1
            && fill > self.hash_fill_factor
            && min >= 0
            && max < MAX_HASH_SLOTS
    }

    fn split_array(&self, dimension: usize, rows: Vec<usize>, used: &[bool]) -> TreeNode<T> {
        self.split_sets(dimension, rows, used, Cell::array)
    }

    /// Group rows by the key `key_of` extracts, in first-seen order. Rows
    /// without a key go to `any` with `dimension` still unused.
    fn split_sets(
        &self,
        dimension: usize,
        rows: Vec<usize>,
        used: &[bool],
        key_of: fn(&Cell) -> Option<&Arc<ArrayKey>>,
    ) -> TreeNode<T> {
        let mut any = Vec::new();
        let mut groups: Vec<(Arc<ArrayKey>, Vec<usize>)> = Vec::new();
        let mut positions: FxHashMap<Arc<ArrayKey>, usize> = FxHashMap::default();

        for r in rows {
            match key_of(&self.rows[r].cells[dimension]) {
                None => any.push(r),
                Some(key) => match positions.get(key) {
                    Some(&position) => groups[position].1.push(r),
                    None => {
                        positions.insert(Arc::clone(key), groups.len());
                        groups.push((Arc::clone(key), vec![r]));
                    }
                },
            }
        }

        let marked = mark_used(used, dimension);
        let sets = groups
            .into_iter()
            .map(|(key, group)| SetBranch {
                codes: key.codes.iter().copied().collect(),
                operation: key.operation,
                child: self.node(group, &marked),
            })
            .collect();

        TreeNode::Branch(Branch {
            dimension,
            any: self.node(any, used),
            kind: BranchKind::Sets(sets),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::TreeShape;
    use crate::operator::Operator;
    use crate::value::ArrayValue;

    fn long(name: &str) -> Dimension {
        Dimension::long(name, Some(Operator::Contains), None)
    }

    fn config(hash_fill_factor: f64) -> TreeConfig {
        TreeConfig::default().with_hash_fill_factor(hash_fill_factor)
    }

    #[test]
    fn test_empty_dataset_has_no_root() {
        let built = build::<&str>(&[long("d1")], &[], &config(1.0)).unwrap();
        assert!(built.root.is_none());
        assert!(built.prefilters.is_empty());
    }

    #[test]
    fn test_median_split() {
        let records = vec![
            ValueData::new("1", [1i64]),
            ValueData::new("2", [2i64]),
            ValueData::new("3", [3i64]),
            ValueData::new("33", [3i64]),
        ];
        let built = build(&[long("d1")], &records, &config(1.0)).unwrap();
        let root = built.root.unwrap();
        match &*root {
            TreeNode::Branch(Branch {
                kind: BranchKind::Compare { split, .. },
                ..
            }) => assert_eq!(*split, 2),
            other => panic!("expected binary branch, got {:?}", other),
        }
        assert_eq!(TreeShape::measure(Some(&*root)).max_depth, 3);
    }

    #[test]
    fn test_hash_branch_when_dense() {
        let records = vec![
            ValueData::new("1", [1i64, 1]),
            ValueData::new("2", [2i64, 2]),
            ValueData::new("3", [1i64, 3]),
            ValueData::new("33", [1i64, 3]),
        ];
        let built = build(&[long("d1"), long("d2")], &records, &config(0.75)).unwrap();
        let root = built.root.unwrap();
        assert!(matches!(&*root, TreeNode::Hash(HashBranch { dimension: 1, .. })));
        assert_eq!(TreeShape::measure(Some(&*root)).max_depth, 3);
    }

    #[test]
    fn test_hash_guard_rejects_negative_codes() {
        let records = vec![ValueData::new("a", [-1i64]), ValueData::new("b", [4i64])];
        let built = build(&[long("d1")], &records, &config(0.0)).unwrap();
        assert!(matches!(built.root.as_deref(), Some(TreeNode::Branch(_))));
    }

    #[test]
    fn test_priority_breaks_ties() {
        let dims = vec![long("d1"), long("d2").with_priority(5)];
        let records = vec![ValueData::new("a", [1i64, 1]), ValueData::new("b", [2i64, 2])];
        let built = build(&dims, &records, &config(1.0)).unwrap();
        assert!(matches!(
            built.root.as_deref(),
            Some(TreeNode::Branch(Branch { dimension: 1, .. }))
        ));
    }

    #[test]
    fn test_fail_on_empty_drops_records() {
        let dims = vec![long("d1").with_fail_on_empty(true), long("d2")];
        let records = vec![
            ValueData::new("a", [Value::Long(1), Value::Absent]),
            ValueData::new("b", [Value::Absent, Value::Long(2)]),
        ];
        let built = build(&dims, &records, &config(1.0)).unwrap();
        assert_eq!(built.dropped, 1);
    }

    #[test]
    fn test_array_values_group_into_set_branches() {
        let dims = vec![Dimension::long("d1", None, None)];
        let records = vec![
            ValueData::new("1", [ArrayValue::or([1i64, 2])]),
            ValueData::new("2", [ArrayValue::or([2i64, 1])]),
            ValueData::new("3", [ArrayValue::not([3i64])]),
            ValueData::new("4", [Value::Absent]),
        ];
        let built = build(&dims, &records, &config(1.0)).unwrap();
        let Some(TreeNode::Branch(branch)) = built.root.as_deref() else {
            panic!("expected set branch");
        };
        let BranchKind::Sets(sets) = &branch.kind else {
            panic!("expected set dispatch");
        };
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].codes.sorted(), vec![1, 2]);
        assert_eq!(sets[1].operation, ArrayOperation::Not);
        assert!(branch.any.is_some());
    }

    #[test]
    fn test_value_list_is_one_set() {
        let records = vec![
            ValueData::new("a", [Value::from(vec![2i64, 1, 2])]),
            ValueData::new("b", [Value::from(4i64)]),
            ValueData::new("c", [Value::from(5i64)]),
        ];
        let built = build(&[long("d1")], &records, &config(1.0)).unwrap();
        let Some(TreeNode::Branch(branch)) = built.root.as_deref() else {
            panic!("expected set branch");
        };
        let BranchKind::Sets(sets) = &branch.kind else {
            panic!("expected set dispatch");
        };
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].codes.sorted(), vec![1, 2]);
        assert_eq!(sets[0].operation, ArrayOperation::Or);
        assert!(matches!(
            branch.any.as_deref(),
            Some(TreeNode::Branch(Branch {
                kind: BranchKind::Compare { .. },
                ..
            }))
        ));
        assert_eq!(TreeShape::measure(built.root.as_deref()).leaves, 3);
    }

    #[test]
    fn test_value_lists_stay_one_row_per_record() {
        let dims: Vec<Dimension> = (1..=6).map(|i| long(&format!("d{}", i))).collect();
        let codes: Vec<i64> = (0..16).collect();
        let records: Vec<ValueData<usize>> = (0..4)
            .map(|r| ValueData::new(r, vec![Value::from(codes.clone()); dims.len()]))
            .collect();
        let built = build(&dims, &records, &config(1.0)).unwrap();
        let shape = TreeShape::measure(built.root.as_deref());
        assert_eq!(shape.leaves, 1);
        assert_eq!(shape.max_depth, dims.len() + 1);
    }

    #[test]
    fn test_array_on_scalar_dimension_is_type_mismatch() {
        let records = vec![ValueData::new("a", [ArrayValue::or([1i64])])];
        let err = build(&[long("d1")], &records, &config(1.0)).unwrap_err();
        assert!(matches!(err, TreeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_record_width_checked() {
        let records = vec![ValueData::new("a", [1i64, 2])];
        let err = build(&[long("d1")], &records, &config(1.0)).unwrap_err();
        assert!(matches!(err, TreeError::RecordWidth { expected: 1, actual: 2 }));
    }

    #[test]
    fn test_prefilter_requires_values_everywhere() {
        let dims = vec![
            Dimension::text("d1", Some(Operator::Contains)).with_prefilter(true),
            Dimension::text("d2", Some(Operator::Contains)).with_prefilter(true),
        ];
        let records = vec![
            ValueData::new("a", [Value::from("x"), Value::from("y")]),
            ValueData::new("b", [Value::from("z"), Value::Absent]),
        ];
        let built = build(&dims, &records, &config(1.0).with_prefilter(true)).unwrap();
        assert_eq!(built.prefilters.len(), 1);
        assert_eq!(built.prefilters[0].dimension(), 0);
        assert_eq!(built.prefilters[0].allowed().sorted(), vec![1, 2]);
    }
}
