//! Text value interning
//!
//! The `ValueInterner` assigns stable integer codes to distinct text values in
//! first-seen order. Codes start at [`FIRST_CODE`]; [`UNKNOWN_CODE`] is returned
//! for text that was never interned, which sorts below every real code and
//! therefore matches no stored value.
//!
//! Interning happens while a tree is built. Once the tree is published the
//! interner is only read, so no locking is involved.

use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Code for text that was never interned
pub const UNKNOWN_CODE: i64 = 0;

/// Code assigned to the first interned value
pub const FIRST_CODE: i64 = 1;

/// First-seen-order text interner
///
/// # Example
///
/// ```
/// use dimtree::{ValueInterner, UNKNOWN_CODE};
///
/// let mut interner = ValueInterner::new();
/// let us = interner.intern("us");
/// assert_eq!(interner.intern("us"), us);
/// assert_eq!(interner.get("fr"), UNKNOWN_CODE);
/// assert_eq!(interner.resolve(us), Some("us"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ValueInterner {
    /// Map from value to code; shares the `Arc<str>` held in `values`
    codes: FxHashMap<Arc<str>, i64>,
    /// Values by `code - FIRST_CODE`
    values: Vec<Arc<str>>,
}

impl ValueInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an interner with pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            codes: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Return the code for `value`, assigning the next code on first sight.
    ///
    /// Only allocates on a miss.
    pub fn intern(&mut self, value: &str) -> i64 {
        if let Some(&code) = self.codes.get(value) {
            return code;
        }
        let code = FIRST_CODE + self.values.len() as i64;
        let shared: Arc<str> = Arc::from(value);
        self.values.push(Arc::clone(&shared));
        self.codes.insert(shared, code);
        code
    }

    /// Code for `value`, or [`UNKNOWN_CODE`] when it was never interned
    pub fn get(&self, value: &str) -> i64 {
        self.codes.get(value).copied().unwrap_or(UNKNOWN_CODE)
    }

    /// Text for a code previously returned by [`intern`](Self::intern)
    pub fn resolve(&self, code: i64) -> Option<&str> {
        let index = usize::try_from(code.checked_sub(FIRST_CODE)?).ok()?;
        self.values.get(index).map(|v| v.as_ref())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Forget every interned value
    pub fn reset(&mut self) {
        self.codes.clear();
        self.values.clear();
    }
}
