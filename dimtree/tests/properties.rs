//! Randomized checks of `find` against a linear scan.

use dimtree::{
    ArrayOperation, ArrayValue, Dimension, Operator, Tree, TreeConfig, Value, ValueData,
};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, Copy)]
enum Kind {
    Contains,
    NotContains,
    AtLeast,
    Between,
    Array,
}

/// One record value
#[derive(Debug, Clone)]
enum Cell {
    Absent,
    /// One or more codes on a scalar dimension
    Scalar(Vec<i64>),
    Array(ArrayOperation, Vec<i64>),
}

/// One query value; `None` is a missing value
type QueryCell = Option<Vec<i64>>;

#[derive(Debug, Clone)]
struct Dataset {
    kinds: Vec<Kind>,
    records: Vec<Vec<Cell>>,
    queries: Vec<Vec<QueryCell>>,
    fill: f64,
}

fn kind() -> impl Strategy<Value = Kind> {
    prop_oneof![
        Just(Kind::Contains),
        Just(Kind::NotContains),
        Just(Kind::AtLeast),
        Just(Kind::Between),
        Just(Kind::Array),
    ]
}

fn cell(kind: Kind) -> BoxedStrategy<Cell> {
    match kind {
        Kind::Array => prop_oneof![
            1 => Just(Cell::Absent),
            4 => (
                prop::sample::select(vec![
                    ArrayOperation::Or,
                    ArrayOperation::And,
                    ArrayOperation::Not,
                ]),
                prop::collection::vec(0i64..6, 0..=3),
            )
                .prop_map(|(operation, codes)| Cell::Array(operation, codes)),
        ]
        .boxed(),
        _ => prop_oneof![
            1 => Just(Cell::Absent),
            4 => prop::collection::vec(0i64..6, 1..=3).prop_map(Cell::Scalar),
        ]
        .boxed(),
    }
}

fn query_cell(kind: Kind) -> BoxedStrategy<QueryCell> {
    match kind {
        Kind::Contains | Kind::Array => {
            prop::option::of(prop::collection::vec(0i64..7, 1..=3)).boxed()
        }
        Kind::NotContains | Kind::AtLeast => {
            prop::option::of((0i64..7).prop_map(|code| vec![code])).boxed()
        }
        Kind::Between => prop::option::of(
            (0i64..7, 0i64..7).prop_map(|(a, b)| vec![a.min(b), a.max(b)]),
        )
        .boxed(),
    }
}

fn dataset() -> impl Strategy<Value = Dataset> {
    (
        prop::collection::vec(kind(), 1..=3),
        prop::sample::select(vec![0.0, 0.25, 1.0]),
    )
        .prop_flat_map(|(kinds, fill)| {
            let record: Vec<_> = kinds.iter().map(|&k| cell(k)).collect();
            let query: Vec<_> = kinds.iter().map(|&k| query_cell(k)).collect();
            (
                Just(kinds),
                prop::collection::vec(record, 0..12),
                prop::collection::vec(query, 1..6),
                Just(fill),
            )
        })
        .prop_map(|(kinds, records, queries, fill)| Dataset {
            kinds,
            records,
            queries,
            fill,
        })
}

fn dimensions(kinds: &[Kind]) -> Vec<Dimension> {
    kinds
        .iter()
        .enumerate()
        .map(|(i, kind)| {
            let name = format!("d{}", i + 1);
            let operation = match kind {
                Kind::Contains => Some(Operator::Contains),
                Kind::NotContains => Some(Operator::NotContains),
                Kind::AtLeast => Some(Operator::GreaterThenOrEqualTo),
                Kind::Between => Some(Operator::BetweenInclusive),
                Kind::Array => None,
            };
            Dimension::long(name, operation, None).with_prefilter(true)
        })
        .collect()
}

fn record_value(cell: &Cell) -> Value {
    match cell {
        Cell::Absent => Value::Absent,
        Cell::Scalar(codes) if codes.len() == 1 => Value::from(codes[0]),
        Cell::Scalar(codes) => Value::from(codes.clone()),
        Cell::Array(operation, codes) => {
            Value::from(ArrayValue::new(*operation, codes.iter().copied()))
        }
    }
}

fn build(data: &Dataset, config: TreeConfig) -> Tree<usize> {
    let records: Vec<ValueData<usize>> = data
        .records
        .iter()
        .enumerate()
        .map(|(i, cells)| ValueData::new(i, cells.iter().map(record_value)))
        .collect();
    Tree::build(&dimensions(&data.kinds), &records, config).unwrap()
}

fn config(data: &Dataset) -> TreeConfig {
    TreeConfig::default()
        .with_hash_fill_factor(data.fill)
        .with_prefilter(true)
}

fn query(cells: &[QueryCell]) -> Vec<Value> {
    cells
        .iter()
        .map(|cell| match cell.as_deref() {
            None => Value::Absent,
            Some([code]) => Value::from(*code),
            Some(codes) => Value::from(codes.to_vec()),
        })
        .collect()
}

fn satisfies(kind: Kind, cell: &Cell, query: &QueryCell) -> bool {
    let codes = match cell {
        Cell::Absent => return true,
        Cell::Array(_, codes) if codes.is_empty() => return true,
        Cell::Scalar(codes) | Cell::Array(_, codes) => codes,
    };
    let Some(query) = query else {
        return false;
    };
    match (cell, kind) {
        (Cell::Array(ArrayOperation::Or, _), _) => codes.iter().any(|c| query.contains(c)),
        (Cell::Array(ArrayOperation::And, _), _) => codes.iter().all(|c| query.contains(c)),
        (Cell::Array(ArrayOperation::Not, _), _) => !codes.iter().any(|c| query.contains(c)),
        (_, Kind::Contains) => codes.iter().any(|c| query.contains(c)),
        (_, Kind::NotContains) => codes.iter().any(|&c| query[0] != c),
        (_, Kind::AtLeast) => codes.iter().any(|&c| c >= query[0]),
        (_, Kind::Between) => codes.iter().any(|&c| query[0] <= c && c <= query[1]),
        (_, Kind::Array) => unreachable!("scalar cell on an array dimension"),
    }
}

fn scan(data: &Dataset, query: &[QueryCell]) -> HashSet<usize> {
    data.records
        .iter()
        .enumerate()
        .filter(|(_, cells)| {
            data.kinds
                .iter()
                .zip(cells.iter())
                .zip(query)
                .all(|((&kind, cell), query)| satisfies(kind, cell, query))
        })
        .map(|(i, _)| i)
        .collect()
}

/// A query built from the record's own values, where one satisfies the record
fn own_query(kinds: &[Kind], cells: &[Cell]) -> Option<Vec<QueryCell>> {
    kinds
        .iter()
        .zip(cells)
        .map(|(kind, cell)| match (kind, cell) {
            (_, Cell::Absent) => Some(None),
            (_, Cell::Array(_, codes)) if codes.is_empty() => Some(None),
            (_, Cell::Array(ArrayOperation::Not, _)) | (Kind::NotContains, _) => None,
            (_, Cell::Array(_, codes)) | (Kind::Contains, Cell::Scalar(codes)) => {
                let mut codes = codes.clone();
                codes.sort_unstable();
                Some(Some(codes))
            }
            (Kind::AtLeast, Cell::Scalar(codes)) => Some(codes.iter().min().map(|&c| vec![c])),
            (_, Cell::Scalar(codes)) => Some(Some(vec![codes[0], codes[0]])),
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn find_matches_linear_scan(data in dataset()) {
        let mut tree = build(&data, config(&data));
        for prefilter in [true, false] {
            tree.set_prefilter(prefilter);
            for q in &data.queries {
                prop_assert_eq!(tree.find(&query(q)).unwrap(), scan(&data, q));
            }
        }
    }

    #[test]
    fn records_find_themselves(data in dataset()) {
        let tree = build(&data, config(&data));
        for (i, cells) in data.records.iter().enumerate() {
            if let Some(q) = own_query(&data.kinds, cells) {
                prop_assert!(tree.find(&query(&q)).unwrap().contains(&i));
            }
        }
    }

    #[test]
    fn value_lists_keep_tree_linear(data in dataset()) {
        let tree = build(&data, config(&data));
        prop_assert!(tree.leaf_count() <= data.records.len());
    }

    #[test]
    fn trace_found_equals_find(data in dataset()) {
        let tree = build(&data, config(&data).with_prefilter(false));
        for q in &data.queries {
            let q = query(q);
            let report = tree.trace(&q).unwrap();
            let found: BTreeSet<usize> = tree.find(&q).unwrap().into_iter().collect();
            let traced: BTreeSet<usize> = report.found().iter().copied().collect();
            prop_assert_eq!(traced, found.clone());
            for (selection, _) in report.mismatches() {
                prop_assert!(!found.contains(selection));
            }
        }
    }

    #[test]
    fn build_is_deterministic(data in dataset()) {
        let first = build(&data, config(&data));
        let second = build(&data, config(&data));
        prop_assert_eq!(first.node_count(), second.node_count());
        prop_assert_eq!(first.max_depth(), second.max_depth());
        for q in &data.queries {
            prop_assert_eq!(first.find(&query(q)).unwrap(), second.find(&query(q)).unwrap());
        }
    }
}

#[test]
fn empty_dataset_finds_nothing() {
    let data = Dataset {
        kinds: vec![Kind::Contains, Kind::NotContains],
        records: Vec::new(),
        queries: Vec::new(),
        fill: 0.0,
    };
    let tree = build(&data, config(&data));
    assert!(tree.is_empty());
    assert!(tree.find(&query(&[Some(vec![1]), None])).unwrap().is_empty());
    assert_eq!(tree.max_depth(), 0);
}
