//! Multi-dimensional discrimination index
//!
//! This crate matches a query tuple against thousands of rule records without a
//! linear scan. Each record constrains a fixed list of typed dimensions and
//! yields a selection when its constraints hold:
//!
//! - **Dimensions**: text, long, boolean and enumerated attributes with a
//!   comparison operator, or array dimensions combined with OR / AND / NOT
//! - **Build**: records are partitioned once into an immutable tree of binary,
//!   set-dispatch and hash nodes
//! - **Find**: a query walks only the subtrees that can still match
//! - **Trace**: explains, per selection and dimension, why a query missed
//!
//! # Core Types
//!
//! - [`Dimension`]: canonicalizes raw [`Value`]s into `i64` codes
//! - [`ValueData`]: a record, one value per dimension plus its selection
//! - [`Tree`]: the built index; `find`, `trace` and `trace_statistics`
//! - [`TreeConfig`]: hash fill factor, pre-filtering and trace options
//!
//! # Matching Semantics
//!
//! 1. **Missing values**: a record without a value for a dimension matches any
//!    query value; a query without a value only matches such records
//! 2. **Multi-valued queries**: a list matches when any of its values matches
//! 3. **Arrays**: OR needs one query code in the set, AND needs the whole set
//!    in the query, NOT needs no query code in the set
//! 4. **Pre-filter**: queries that no record can match are rejected before the
//!    walk; the result is the same with pre-filtering on or off
//!
//! # Usage
//!
//! Declare the dimension list, build a [`Tree`] with [`Tree::build`] (or
//! [`Tree::build_with_metrics`] to count pre-filter rejections), then share it
//! across threads for concurrent `find` and `trace` calls. Updating the record
//! set means building a new tree.

mod bits;
mod builder;
mod config;
mod dimension;
mod error;
mod interner;
mod metrics;
mod node;
mod operator;
mod prefilter;
mod trace;
mod tree;
mod value;

pub use bits::CodeSet;
pub use builder::MAX_HASH_SLOTS;
pub use config::{TreeConfig, DEFAULT_HASH_FILL_FACTOR, DEFAULT_MAX_TRACE_LIST_COUNT};
pub use dimension::{
    canonicalize_query, Codes, Dimension, DimensionKind, EnumDomain, PRIORITY_DEFAULT,
};
pub use error::{Result, TreeError};
pub use interner::{ValueInterner, FIRST_CODE, UNKNOWN_CODE};
pub use metrics::{NoopMetrics, PreFilterCounters, PreFilterMetrics};
pub use node::{Branch, BranchKind, Child, HashBranch, Leaf, SetBranch, TreeNode, TreeShape};
pub use operator::{Direction, Operator};
pub use prefilter::PreFilter;
pub use trace::{EvidenceLine, PreFilterRejection, TraceReport};
pub use tree::Tree;
pub use value::{ArrayOperation, ArrayValue, Value, ValueData, UNKNOWN_LABEL};
