//! Compressed code sets
//!
//! `CodeSet` stores canonical `i64` codes in a `RoaringTreemap`. Codes are
//! mapped to `u64` by reinterpreting the two's complement bits, which keeps
//! the mapping total for negative long codes.

use roaring::RoaringTreemap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeSet(RoaringTreemap);

impl CodeSet {
    pub fn new() -> Self {
        Self(RoaringTreemap::new())
    }

    #[inline]
    pub fn insert(&mut self, code: i64) -> bool {
        self.0.insert(code as u64)
    }

    #[inline]
    pub fn contains(&self, code: i64) -> bool {
        self.0.contains(code as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> u64 {
        self.0.len()
    }

    /// True if any of `codes` is a member
    pub fn contains_any(&self, codes: &[i64]) -> bool {
        codes.iter().any(|&c| self.contains(c))
    }

    /// True if every member is present in the sorted slice `codes`
    pub fn is_covered_by(&self, codes: &[i64]) -> bool {
        self.0
            .iter()
            .all(|c| codes.binary_search(&(c as i64)).is_ok())
    }

    /// Keep only members also present in `other`
    pub fn intersect_with(&mut self, other: &CodeSet) {
        self.0 &= &other.0;
    }

    /// Members in ascending numeric order
    pub fn sorted(&self) -> Vec<i64> {
        let mut codes: Vec<i64> = self.0.iter().map(|c| c as i64).collect();
        // negative codes follow the non-negative ones in u64 order
        codes.sort_unstable();
        codes
    }
}

impl FromIterator<i64> for CodeSet {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        Self(iter.into_iter().map(|c| c as u64).collect())
    }
}

impl Extend<i64> for CodeSet {
    fn extend<I: IntoIterator<Item = i64>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(|c| c as u64));
    }
}
