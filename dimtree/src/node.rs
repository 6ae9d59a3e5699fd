//! Tree node layout
//!
//! Nodes own their children outright; there are no back references and no
//! sharing, so a built tree is a plain immutable value.
//!
//! - [`Leaf`]: terminal list of selections
//! - [`Branch`]: either a binary comparison on a split code or a set dispatch
//!   over array values (or over the value lists of multi-valued scalar
//!   records), never both
//! - [`HashBranch`]: code-indexed dispatch for dense equality dimensions

use crate::bits::CodeSet;
use crate::dimension::Dimension;
use crate::error::Result;
use crate::operator::{Direction, Operator};
use crate::value::ArrayOperation;
use std::fmt::{Display, Write};

/// Optional owned child
pub type Child<T> = Option<Box<TreeNode<T>>>;

#[derive(Debug)]
pub enum TreeNode<T> {
    Leaf(Leaf<T>),
    Branch(Branch<T>),
    Hash(HashBranch<T>),
}

#[derive(Debug)]
pub struct Leaf<T> {
    pub selections: Vec<T>,
}

#[derive(Debug)]
pub struct Branch<T> {
    pub dimension: usize,
    /// Records with no value for `dimension`
    pub any: Child<T>,
    pub kind: BranchKind<T>,
}

#[derive(Debug)]
pub enum BranchKind<T> {
    /// Binary comparison against `split`
    Compare {
        split: i64,
        left: Child<T>,
        equal: Child<T>,
        right: Child<T>,
    },
    /// Dispatch over distinct array values, or over distinct value lists on a
    /// scalar dimension
    Sets(Vec<SetBranch<T>>),
}

/// One distinct array value of a set-dispatch branch.
///
/// On a scalar dimension the set is the value list of a multi-valued record,
/// always with [`ArrayOperation::Or`].
#[derive(Debug)]
pub struct SetBranch<T> {
    pub codes: CodeSet,
    pub operation: ArrayOperation,
    pub child: Child<T>,
}

impl<T> SetBranch<T> {
    /// Whether sorted query codes satisfy this array value
    pub fn matches(&self, query: &[i64]) -> bool {
        match self.operation {
            ArrayOperation::Or => self.codes.contains_any(query),
            ArrayOperation::And => self.codes.is_covered_by(query),
            ArrayOperation::Not => !self.codes.contains_any(query),
        }
    }

    /// Whether sorted query codes reach this set's child.
    ///
    /// Array dimensions use [`matches`](Self::matches). On a scalar dimension
    /// some member must satisfy the dimension's operator on its own.
    pub fn accepts(&self, dimension: &Dimension, query: &[i64]) -> Result<bool> {
        if dimension.is_array() {
            return Ok(self.matches(query));
        }
        for code in self.codes.sorted() {
            if dimension.direction(query, code)?.contains(Direction::EQUAL) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Operator shown in trace evidence for this set
    pub fn operator(&self, dimension: &Dimension) -> Operator {
        match dimension.operation() {
            Some(operation) => operation,
            None => self.operation.operator(),
        }
    }
}

#[derive(Debug)]
pub struct HashBranch<T> {
    pub dimension: usize,
    pub any: Child<T>,
    /// Children indexed by canonical code
    pub slots: Vec<Child<T>>,
}

impl<T> HashBranch<T> {
    /// Child for a query code, if the code indexes a populated slot
    #[inline]
    pub fn slot(&self, code: i64) -> Option<&TreeNode<T>> {
        let index = usize::try_from(code).ok()?;
        self.slots.get(index)?.as_deref()
    }
}

impl<T> TreeNode<T> {
    /// Direct children, in `any`, `left`, `equal`, `right`, sets / slots order
    pub fn children(&self) -> Vec<&TreeNode<T>> {
        let mut out = Vec::new();
        match self {
            TreeNode::Leaf(_) => {}
            TreeNode::Branch(branch) => {
                out.extend(branch.any.as_deref());
                match &branch.kind {
                    BranchKind::Compare {
                        left, equal, right, ..
                    } => {
                        out.extend(left.as_deref());
                        out.extend(equal.as_deref());
                        out.extend(right.as_deref());
                    }
                    BranchKind::Sets(sets) => {
                        out.extend(sets.iter().filter_map(|s| s.child.as_deref()));
                    }
                }
            }
            TreeNode::Hash(hash) => {
                out.extend(hash.any.as_deref());
                out.extend(hash.slots.iter().filter_map(|s| s.as_deref()));
            }
        }
        out
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, TreeNode::Leaf(_))
    }

    /// Short node description used by debug path annotation.
    ///
    /// `dn|[a,b]` for leaves, `kdn|d:<name>/<index>,sv:<split>` for binary
    /// branches, `kdn|d:<name>/<index>` for set branches and
    /// `kdh|d:<name>/<index>` for hash branches.
    pub fn label(&self, dimensions: &[Dimension]) -> String
    where
        T: Display,
    {
        let mut out = String::new();
        match self {
            TreeNode::Leaf(leaf) => {
                out.push_str("dn|[");
                for (i, s) in leaf.selections.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "{}", s);
                }
                out.push(']');
            }
            TreeNode::Branch(branch) => {
                let dimension = &dimensions[branch.dimension];
                let _ = write!(out, "kdn|d:{}/{}", dimension.name(), branch.dimension);
                if let BranchKind::Compare { split, .. } = branch.kind {
                    let _ = write!(out, ",sv:{}", dimension.display_code(split));
                }
            }
            TreeNode::Hash(hash) => {
                let dimension = &dimensions[hash.dimension];
                let _ = write!(out, "kdh|d:{}/{}", dimension.name(), hash.dimension);
            }
        }
        out
    }
}

/// Node and leaf counts plus maximum depth of a subtree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeShape {
    pub nodes: usize,
    pub leaves: usize,
    /// Root at depth 1; zero for an empty tree
    pub max_depth: usize,
}

impl TreeShape {
    /// Measure with an explicit work list, independent of tree depth
    pub fn measure<T>(root: Option<&TreeNode<T>>) -> Self {
        let mut shape = TreeShape::default();
        let mut stack: Vec<(&TreeNode<T>, usize)> = root.map(|r| (r, 1)).into_iter().collect();
        while let Some((node, depth)) = stack.pop() {
            shape.max_depth = shape.max_depth.max(depth);
            if node.is_leaf() {
                shape.leaves += 1;
            } else {
                shape.nodes += 1;
                stack.extend(node.children().into_iter().map(|c| (c, depth + 1)));
            }
        }
        shape
    }
}
