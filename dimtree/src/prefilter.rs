//! Dataset-wide fast reject
//!
//! A [`PreFilter`] summarizes every code a dimension holds across the loaded
//! records. A query whose codes cannot satisfy any record on that dimension is
//! rejected before the tree walk starts.
//!
//! A pre-filter only exists for an equality-style or array dimension whose value
//! is present in every loaded record, because a record with no value would match
//! through the `any` route regardless of the query.

use crate::bits::CodeSet;
use crate::dimension::{Codes, Dimension};
use crate::value::ArrayOperation;

#[derive(Debug, Clone)]
pub struct PreFilter {
    dimension: usize,
    /// Codes of scalar values and OR / AND arrays
    allowed: CodeSet,
    /// Codes listed by every NOT array; `None` when no record holds a NOT array
    disallowed: Option<CodeSet>,
}

impl PreFilter {
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn allowed(&self) -> &CodeSet {
        &self.allowed
    }

    pub fn disallowed(&self) -> Option<&CodeSet> {
        self.disallowed.as_ref()
    }

    /// Whether some record may still match the query codes of this dimension.
    ///
    /// A positive record needs one of its codes in the query. A NOT record only
    /// fails when the query hits one of its codes; the query is safe to reject
    /// when it hits a code shared by all NOT records.
    pub fn accepts(&self, query: &Codes) -> bool {
        let codes = query.as_slice();
        if self.allowed.contains_any(codes) {
            return true;
        }
        match &self.disallowed {
            Some(disallowed) => !disallowed.contains_any(codes),
            None => false,
        }
    }
}

/// Whether a dimension may carry a pre-filter at all
pub(crate) fn eligible(dimension: &Dimension) -> bool {
    dimension.prefilter()
        && dimension
            .operation()
            .map_or(true, |operation| operation.is_contains())
}

/// Accumulates a [`PreFilter`] over the loaded records
#[derive(Debug)]
pub(crate) struct PreFilterBuilder {
    dimension: usize,
    allowed: CodeSet,
    disallowed: Option<CodeSet>,
    complete: bool,
}

impl PreFilterBuilder {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            allowed: CodeSet::new(),
            disallowed: None,
            complete: true,
        }
    }

    pub(crate) fn dimension(&self) -> usize {
        self.dimension
    }

    /// Add one record's value; `None` marks the value missing
    pub(crate) fn add(&mut self, value: Option<(ArrayOperation, &[i64])>) {
        match value {
            None => self.complete = false,
            Some((ArrayOperation::Not, codes)) => {
                let codes: CodeSet = codes.iter().copied().collect();
                match &mut self.disallowed {
                    Some(disallowed) => disallowed.intersect_with(&codes),
                    None => self.disallowed = Some(codes),
                }
            }
            Some((_, codes)) => self.allowed.extend(codes.iter().copied()),
        }
    }

    /// The pre-filter, unless some record had no value
    pub(crate) fn finish(self) -> Option<PreFilter> {
        self.complete.then(|| PreFilter {
            dimension: self.dimension,
            allowed: self.allowed,
            disallowed: self.disallowed,
        })
    }
}
