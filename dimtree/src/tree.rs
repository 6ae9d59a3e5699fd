//! The built index
//!
//! A [`Tree`] is built once from a dimension list and a record set, then only
//! read. `find`, `trace` and the statistics calls take `&self` and may run
//! concurrently from any number of threads; the only shared mutable state is
//! the injected [`PreFilterMetrics`] sink.
//!
//! ```
//! use dimtree::{Dimension, Operator, Tree, TreeConfig, Value, ValueData};
//!
//! let dimensions = vec![
//!     Dimension::text("country", Some(Operator::Contains)),
//!     Dimension::long("min_age", Some(Operator::LessThenOrEqualTo), None),
//! ];
//! let records = vec![
//!     ValueData::new("adults-us", [Value::from("us"), Value::from(18i64)]),
//!     ValueData::new("everyone-fr", [Value::from("fr"), Value::Absent]),
//! ];
//! let tree = Tree::build(&dimensions, &records, TreeConfig::default()).unwrap();
//!
//! let found = tree.find(&[Value::from("us"), Value::from(30i64)]).unwrap();
//! assert!(found.contains("adults-us"));
//! assert_eq!(found.len(), 1);
//! ```

use crate::builder;
use crate::config::TreeConfig;
use crate::dimension::{canonicalize_query, Codes, Dimension};
use crate::error::Result;
use crate::metrics::{NoopMetrics, PreFilterMetrics};
use crate::node::{BranchKind, TreeNode, TreeShape};
use crate::operator::Direction;
use crate::prefilter::PreFilter;
use crate::value::{Value, ValueData};
use std::collections::HashSet;
use std::fmt::{self, Display};
use std::hash::Hash;
use std::sync::Arc;

pub struct Tree<T> {
    pub(crate) dimensions: Vec<Dimension>,
    pub(crate) root: Option<Box<TreeNode<T>>>,
    pub(crate) prefilters: Vec<PreFilter>,
    pub(crate) config: TreeConfig,
    metrics: Arc<dyn PreFilterMetrics>,
    shape: TreeShape,
}

/// How a walk entered a child node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edge {
    /// `any` child of a binary or set branch; not annotated in paths
    Fallback,
    /// `any` child of a hash branch
    Any,
    Left,
    /// Equal child or matching set
    Equal,
    Right,
    /// Hash slot
    Index,
}

impl Edge {
    fn as_str(self) -> Option<&'static str> {
        match self {
            Edge::Fallback => None,
            Edge::Any => Some("any"),
            Edge::Left => Some("left"),
            Edge::Equal => Some("equal"),
            Edge::Right => Some("right"),
            Edge::Index => Some("index"),
        }
    }
}

impl<T: Clone> Tree<T> {
    /// Build a tree with pre-filter rejections discarded
    pub fn build(
        dimensions: &[Dimension],
        records: &[ValueData<T>],
        config: TreeConfig,
    ) -> Result<Self> {
        Self::build_with_metrics(dimensions, records, config, Arc::new(NoopMetrics))
    }

    /// Build a tree reporting pre-filter rejections to `metrics`
    pub fn build_with_metrics(
        dimensions: &[Dimension],
        records: &[ValueData<T>],
        config: TreeConfig,
        metrics: Arc<dyn PreFilterMetrics>,
    ) -> Result<Self> {
        config.validate()?;
        let _span = tracing::debug_span!(
            "tree_build",
            records = records.len(),
            dimensions = dimensions.len()
        )
        .entered();

        let built = builder::build(dimensions, records, &config)?;
        let shape = TreeShape::measure(built.root.as_deref());
        tracing::debug!(
            nodes = shape.nodes,
            leaves = shape.leaves,
            max_depth = shape.max_depth,
            prefilters = built.prefilters.len(),
            dropped = built.dropped,
            "tree built"
        );

        Ok(Self {
            dimensions: built.dimensions,
            root: built.root,
            prefilters: built.prefilters,
            config,
            metrics,
            shape,
        })
    }
}

impl<T> Tree<T> {
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn prefilters(&self) -> &[PreFilter] {
        &self.prefilters
    }

    /// Toggle the pre-filter check.
    ///
    /// Bitsets only exist when pre-filtering was enabled at build time;
    /// enabling it later checks nothing.
    pub fn set_prefilter(&mut self, prefilter: bool) {
        self.config.prefilter = prefilter;
    }

    pub fn is_prefilter(&self) -> bool {
        self.config.prefilter
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn root(&self) -> Option<&TreeNode<T>> {
        self.root.as_deref()
    }

    /// Internal node count
    pub fn node_count(&self) -> usize {
        self.shape.nodes
    }

    pub fn leaf_count(&self) -> usize {
        self.shape.leaves
    }

    /// Root at depth 1; 0 for an empty tree
    pub fn max_depth(&self) -> usize {
        self.shape.max_depth
    }

    pub(crate) fn canonicalize(&self, query: &[Value]) -> Result<Vec<Codes>> {
        canonicalize_query(&self.dimensions, query)
    }

    /// Pre-filters the query fails; none unless checking is enabled
    pub(crate) fn rejecting_prefilters<'a>(
        &'a self,
        codes: &'a [Codes],
    ) -> impl Iterator<Item = &'a PreFilter> + 'a {
        let enabled = self.config.prefilter;
        self.prefilters
            .iter()
            .filter(move |pf| enabled && !pf.accepts(&codes[pf.dimension()]))
    }

    fn rejected(&self, codes: &[Codes]) -> bool {
        let Some(prefilter) = self.rejecting_prefilters(codes).next() else {
            return false;
        };
        let index = prefilter.dimension();
        let name = self.dimensions[index].name();
        tracing::trace!(dimension = name, index, "query rejected by pre-filter");
        self.metrics.record_reject(index, name);
        true
    }

    /// Children of `node` reachable by the query, in `any`, left, equal,
    /// right, set / slot order
    pub(crate) fn descend<'a>(
        &self,
        node: &'a TreeNode<T>,
        codes: &[Codes],
        out: &mut Vec<(&'a TreeNode<T>, Edge)>,
    ) -> Result<()> {
        match node {
            TreeNode::Leaf(_) => {}
            TreeNode::Branch(branch) => {
                out.extend(branch.any.as_deref().map(|c| (c, Edge::Fallback)));
                let query = &codes[branch.dimension];
                if query.is_any() {
                    return Ok(());
                }
                let dimension = &self.dimensions[branch.dimension];
                match &branch.kind {
                    BranchKind::Sets(sets) => {
                        for set in sets {
                            if let Some(child) = set.child.as_deref() {
                                if set.accepts(dimension, query.as_slice())? {
                                    out.push((child, Edge::Equal));
                                }
                            }
                        }
                    }
                    BranchKind::Compare {
                        split,
                        left,
                        equal,
                        right,
                    } => {
                        let direction = dimension.direction(query.as_slice(), *split)?;
                        for (bit, child, edge) in [
                            (Direction::LEFT, left, Edge::Left),
                            (Direction::EQUAL, equal, Edge::Equal),
                            (Direction::RIGHT, right, Edge::Right),
                        ] {
                            if direction.contains(bit) {
                                out.extend(child.as_deref().map(|c| (c, edge)));
                            }
                        }
                    }
                }
            }
            TreeNode::Hash(hash) => {
                out.extend(hash.any.as_deref().map(|c| (c, Edge::Any)));
                out.extend(
                    codes[hash.dimension]
                        .as_slice()
                        .iter()
                        .filter_map(|&code| hash.slot(code))
                        .map(|c| (c, Edge::Index)),
                );
            }
        }
        Ok(())
    }
}

impl<T: Clone + Eq + Hash> Tree<T> {
    /// Selections of every record whose constraints the query satisfies.
    ///
    /// `query` holds one raw value per dimension; a missing value only matches
    /// records that hold no value for that dimension either.
    pub fn find(&self, query: &[Value]) -> Result<HashSet<T>> {
        let codes = self.canonicalize(query)?;
        let mut found = HashSet::new();
        let Some(root) = self.root.as_deref() else {
            return Ok(found);
        };
        if self.rejected(&codes) {
            return Ok(found);
        }

        let mut stack = vec![root];
        let mut children = Vec::new();
        while let Some(node) = stack.pop() {
            if let TreeNode::Leaf(leaf) = node {
                found.extend(leaf.selections.iter().cloned());
                continue;
            }
            self.descend(node, &codes, &mut children)?;
            stack.extend(children.drain(..).rev().map(|(child, _)| child));
        }
        Ok(found)
    }

    /// [`find`](Self::find), appending one line per descent and per reached leaf
    /// to `paths`, in walk order.
    ///
    /// Lines read `<child label> -> go <edge>`, written just before the child
    /// is visited, and `<leaf label> -> success: a, b`. Entering the `any`
    /// child of a binary or set branch writes no line. Labels are empty unless
    /// `full_debug` is configured.
    pub fn find_with_paths(&self, query: &[Value], paths: &mut Vec<String>) -> Result<HashSet<T>>
    where
        T: Display,
    {
        let codes = self.canonicalize(query)?;
        let mut found = HashSet::new();
        let Some(root) = self.root.as_deref() else {
            return Ok(found);
        };
        if self.rejected(&codes) {
            return Ok(found);
        }

        let mut stack = vec![(root, Edge::Fallback)];
        let mut children = Vec::new();
        while let Some((node, edge)) = stack.pop() {
            if let Some(edge) = edge.as_str() {
                paths.push(format!("{} -> go {}", self.label(node), edge));
            }
            if let TreeNode::Leaf(leaf) = node {
                let label = self.label(node);
                paths.push(format!("{} -> success: {}", label, Joined(&leaf.selections)));
                found.extend(leaf.selections.iter().cloned());
                continue;
            }
            self.descend(node, &codes, &mut children)?;
            stack.extend(children.drain(..).rev());
        }
        Ok(found)
    }

    fn label(&self, node: &TreeNode<T>) -> String
    where
        T: Display,
    {
        if self.config.full_debug {
            node.label(&self.dimensions)
        } else {
            String::new()
        }
    }
}

/// `a, b, c` rendering of displayable items
pub(crate) struct Joined<'a, T>(pub &'a [T]);

impl<T: Display> Display for Joined<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}

impl<T> fmt::Debug for Tree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("dimensions", &self.dimensions.len())
            .field("nodes", &self.shape.nodes)
            .field("leaves", &self.shape.leaves)
            .field("max_depth", &self.shape.max_depth)
            .field("prefilters", &self.prefilters.len())
            .finish()
    }
}
