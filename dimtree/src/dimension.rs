//! Dimensions: typed, named query attributes
//!
//! A [`Dimension`] canonicalizes raw [`Value`]s into `i64` codes and carries the
//! operator used when a query is compared against stored codes.
//!
//! ## Kinds
//!
//! | Kind | Code | Missing value |
//! |------|------|---------------|
//! | Text | interned, first-seen order starting at 1; unseen text is 0 | `Any` |
//! | Long | the integer itself | configured default or `Any` |
//! | Boolean | `false` = 0, `true` = 1 | configured default or `Any` |
//! | Enum | index of the variant name in name-sorted order | configured default or `Any` |
//!
//! Every kind is strict: a value of the wrong type fails with
//! [`TreeError::TypeMismatch`]; no default code is substituted.
//!
//! ## Array dimensions
//!
//! A dimension without an operator is an array dimension. Its record values are
//! sets ([`ArrayValue`](crate::value::ArrayValue)) combined with OR / AND / NOT
//! instead of a single comparison.

use crate::error::{Result, TreeError};
use crate::interner::ValueInterner;
use crate::operator::{Direction, Operator};
use crate::value::{Value, UNKNOWN_LABEL};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// Default dimension priority
pub const PRIORITY_DEFAULT: i32 = 0;

/// Canonical codes for one attribute value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Codes {
    /// No value supplied; only `any` subtrees are reachable
    Any,
    /// Codes sorted ascending, never empty
    Values(SmallVec<[i64; 2]>),
}

impl Codes {
    pub fn one(code: i64) -> Self {
        Codes::Values(SmallVec::from_slice(&[code]))
    }

    /// Build from unsorted codes; an empty input yields `Any`
    pub fn from_unsorted(mut codes: SmallVec<[i64; 2]>) -> Self {
        if codes.is_empty() {
            return Codes::Any;
        }
        codes.sort_unstable();
        Codes::Values(codes)
    }

    #[inline]
    pub fn is_any(&self) -> bool {
        matches!(self, Codes::Any)
    }

    /// Codes as a slice; empty for `Any`
    #[inline]
    pub fn as_slice(&self) -> &[i64] {
        match self {
            Codes::Any => &[],
            Codes::Values(codes) => codes,
        }
    }
}

/// Closed set of enumerated variant names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDomain {
    sorted: Arc<[String]>,
    codes: Arc<FxHashMap<String, i64>>,
}

impl EnumDomain {
    /// Variants may be given in declaration order; codes follow name order.
    pub fn new<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut sorted: Vec<String> = variants.into_iter().map(Into::into).collect();
        sorted.sort();
        sorted.dedup();
        let codes = sorted
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i as i64))
            .collect();
        Self {
            sorted: sorted.into(),
            codes: Arc::new(codes),
        }
    }

    pub fn code(&self, name: &str) -> Option<i64> {
        self.codes.get(name).copied()
    }

    pub fn name(&self, code: i64) -> Option<&str> {
        usize::try_from(code)
            .ok()
            .and_then(|i| self.sorted.get(i))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }
}

/// Value domain of a dimension
#[derive(Debug, Clone)]
pub enum DimensionKind {
    Text(ValueInterner),
    Long,
    Bool,
    Enum(EnumDomain),
}

impl DimensionKind {
    fn expected(&self) -> &'static str {
        match self {
            DimensionKind::Text(_) => "text",
            DimensionKind::Long => "long",
            DimensionKind::Bool => "boolean",
            DimensionKind::Enum(_) => "enum",
        }
    }
}

/// A typed, named query attribute
#[derive(Debug, Clone)]
pub struct Dimension {
    name: String,
    operation: Option<Operator>,
    priority: i32,
    sentinel: Codes,
    fail_on_empty: bool,
    prefilter: bool,
    group: String,
    kind: DimensionKind,
}

impl Dimension {
    fn with_kind(
        name: impl Into<String>,
        operation: Option<Operator>,
        kind: DimensionKind,
    ) -> Self {
        Self {
            name: name.into(),
            operation,
            priority: PRIORITY_DEFAULT,
            sentinel: Codes::Any,
            fail_on_empty: false,
            prefilter: false,
            group: String::new(),
            kind,
        }
    }

    /// Text dimension; `operation = None` makes it an array dimension
    pub fn text(name: impl Into<String>, operation: Option<Operator>) -> Self {
        Self::with_kind(name, operation, DimensionKind::Text(ValueInterner::new()))
    }

    /// Integer dimension with an optional code for missing query values
    pub fn long(
        name: impl Into<String>,
        operation: Option<Operator>,
        null_value: Option<i64>,
    ) -> Self {
        let mut dimension = Self::with_kind(name, operation, DimensionKind::Long);
        if let Some(code) = null_value {
            dimension.sentinel = Codes::one(code);
        }
        dimension
    }

    /// Boolean dimension with an optional value for missing query values
    pub fn boolean(
        name: impl Into<String>,
        operation: Option<Operator>,
        null_value: Option<bool>,
    ) -> Self {
        let mut dimension = Self::with_kind(name, operation, DimensionKind::Bool);
        if let Some(b) = null_value {
            dimension.sentinel = Codes::one(i64::from(b));
        }
        dimension
    }

    /// Enumerated dimension over `domain`
    ///
    /// `null_value`, when given, must name a variant of the domain.
    pub fn enumeration(
        name: impl Into<String>,
        domain: EnumDomain,
        operation: Option<Operator>,
        null_value: Option<&str>,
    ) -> Result<Self> {
        let name = name.into();
        let sentinel = match null_value {
            None => Codes::Any,
            Some(variant) => {
                let code = domain.code(variant).ok_or_else(|| {
                    TreeError::type_mismatch(&name, "enum", format!("unknown variant {}", variant))
                })?;
                Codes::one(code)
            }
        };
        let mut dimension = Self::with_kind(name, operation, DimensionKind::Enum(domain));
        dimension.sentinel = sentinel;
        Ok(dimension)
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Drop records whose value for this dimension is missing
    pub fn with_fail_on_empty(mut self, fail_on_empty: bool) -> Self {
        self.fail_on_empty = fail_on_empty;
        self
    }

    pub fn with_prefilter(mut self, prefilter: bool) -> Self {
        self.prefilter = prefilter;
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operation(&self) -> Option<Operator> {
        self.operation
    }

    /// Operator used when reporting evidence for scalar nodes
    pub fn operator_or_contains(&self) -> Operator {
        self.operation.unwrap_or(Operator::Contains)
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn sentinel(&self) -> &Codes {
        &self.sentinel
    }

    pub fn fail_on_empty(&self) -> bool {
        self.fail_on_empty
    }

    pub fn prefilter(&self) -> bool {
        self.prefilter
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn kind(&self) -> &DimensionKind {
        &self.kind
    }

    /// True for set-valued dimensions (no comparison operator)
    #[inline]
    pub fn is_array(&self) -> bool {
        self.operation.is_none()
    }

    /// Copy of this dimension with build-time state cleared
    pub fn fresh_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.reset();
        copy
    }

    /// Clear build-time state
    pub fn reset(&mut self) {
        if let DimensionKind::Text(interner) = &mut self.kind {
            interner.reset();
        }
    }

    /// Register a record value with build-time state.
    ///
    /// Only text dimensions keep state; values of other types are left for
    /// [`canonicalize`](Self::canonicalize) to reject.
    pub fn init(&mut self, value: &Value) {
        let DimensionKind::Text(interner) = &mut self.kind else {
            return;
        };
        fn walk(interner: &mut ValueInterner, value: &Value) {
            match value {
                Value::Text(s) => {
                    interner.intern(s);
                }
                Value::List(items) => items.iter().for_each(|v| walk(interner, v)),
                Value::Array(array) => array.values().iter().for_each(|v| walk(interner, v)),
                _ => {}
            }
        }
        walk(interner, value);
    }

    /// Canonical codes for `value`; missing values map to the sentinel
    pub fn canonicalize(&self, value: &Value) -> Result<Codes> {
        self.canonicalize_or(value, &self.sentinel)
    }

    /// Canonical codes for `value`; missing values map to `fallback`
    pub fn canonicalize_or(&self, value: &Value, fallback: &Codes) -> Result<Codes> {
        match value {
            Value::Absent => Ok(fallback.clone()),
            Value::List(items) => self.collect_codes(items, fallback),
            Value::Array(array) => self.collect_codes(array.values(), fallback),
            scalar => Ok(Codes::one(self.code_of(scalar)?)),
        }
    }

    fn collect_codes(&self, items: &[Value], fallback: &Codes) -> Result<Codes> {
        if items.is_empty() {
            return Ok(fallback.clone());
        }
        let codes = items
            .iter()
            .map(|item| self.code_of(item))
            .collect::<Result<SmallVec<[i64; 2]>>>()?;
        Ok(Codes::from_unsorted(codes))
    }

    /// Code of a single scalar value
    pub fn code_of(&self, value: &Value) -> Result<i64> {
        match (&self.kind, value) {
            (DimensionKind::Text(interner), Value::Text(s)) => Ok(interner.get(s)),
            (DimensionKind::Long, Value::Long(n)) => Ok(*n),
            (DimensionKind::Bool, Value::Bool(b)) => Ok(i64::from(*b)),
            (DimensionKind::Enum(domain), Value::Enum(variant)) => {
                domain.code(variant).ok_or_else(|| {
                    TreeError::type_mismatch(
                        &self.name,
                        "enum",
                        format!("unknown variant {}", variant),
                    )
                })
            }
            (kind, other) => Err(TreeError::type_mismatch(
                &self.name,
                kind.expected(),
                format!("{} {}", other.type_name(), other),
            )),
        }
    }

    /// Render a code back into its domain form
    pub fn display_code(&self, code: i64) -> String {
        match &self.kind {
            DimensionKind::Text(interner) => interner
                .resolve(code)
                .map(str::to_string)
                .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            DimensionKind::Long => code.to_string(),
            DimensionKind::Bool => if code == 0 { "false" } else { "true" }.to_string(),
            DimensionKind::Enum(domain) => domain
                .name(code)
                .map(str::to_string)
                .unwrap_or_else(|| code.to_string()),
        }
    }

    /// Branch direction for sorted query codes against a node's split code
    pub fn direction(&self, query: &[i64], node: i64) -> Result<Direction> {
        self.operator_or_contains().direction(&self.name, query, node)
    }
}

/// Canonicalize a full query, one code array per dimension
pub fn canonicalize_query(dimensions: &[Dimension], query: &[Value]) -> Result<Vec<Codes>> {
    if query.len() != dimensions.len() {
        return Err(TreeError::RecordWidth {
            expected: dimensions.len(),
            actual: query.len(),
        });
    }
    dimensions
        .iter()
        .zip(query)
        .map(|(dimension, value)| dimension.canonicalize(value))
        .collect()
}
