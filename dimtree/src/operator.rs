//! Comparison operators and branch direction
//!
//! A binary branch node splits records on `split` into `left` (code < split),
//! `equal` (code == split) and `right` (code > split). [`Operator::direction`]
//! answers which of those three subtrees can hold a record satisfying the query.
//!
//! Multi-valued query codes must be sorted ascending: CONTAINS, CONTAINS_ALL
//! and BETWEEN_INCLUSIVE read the first and last code as min and max.

use crate::error::{Result, TreeError};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// Scalar dimension operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operator {
    Contains,
    ContainsAll,
    NotContains,
    GreaterThen,
    GreaterThenOrEqualTo,
    LessThen,
    LessThenOrEqualTo,
    BetweenInclusive,
}

impl Operator {
    pub const ALL: [Operator; 8] = [
        Operator::Contains,
        Operator::ContainsAll,
        Operator::NotContains,
        Operator::GreaterThen,
        Operator::GreaterThenOrEqualTo,
        Operator::LessThen,
        Operator::LessThenOrEqualTo,
        Operator::BetweenInclusive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Contains => "CONTAINS",
            Operator::ContainsAll => "CONTAINS_ALL",
            Operator::NotContains => "NOT_CONTAINS",
            Operator::GreaterThen => "GREATER_THEN",
            Operator::GreaterThenOrEqualTo => "GREATER_THEN_OR_EQUAL_TO",
            Operator::LessThen => "LESS_THEN",
            Operator::LessThenOrEqualTo => "LESS_THEN_OR_EQUAL_TO",
            Operator::BetweenInclusive => "BETWEEN_INCLUSIVE",
        }
    }

    /// True for the equality-style operators eligible for hash dispatch
    pub fn is_contains(self) -> bool {
        matches!(self, Operator::Contains | Operator::ContainsAll)
    }

    /// Which subtrees of a node split on `node` can satisfy `query`.
    ///
    /// `query` must be non-empty and sorted ascending. `dimension` only names
    /// the dimension in arity errors.
    pub fn direction(self, dimension: &str, query: &[i64], node: i64) -> Result<Direction> {
        let Some((&head, _)) = query.split_first() else {
            return Ok(Direction::NONE);
        };

        let direction = match self {
            Operator::Contains | Operator::ContainsAll => {
                if query.len() == 1 {
                    if head > node {
                        Direction::RIGHT
                    } else if head < node {
                        Direction::LEFT
                    } else {
                        Direction::EQUAL
                    }
                } else {
                    let last = query[query.len() - 1];
                    let mut d = Direction::NONE;
                    if last > node {
                        d |= Direction::RIGHT;
                    }
                    if head < node {
                        d |= Direction::LEFT;
                    }
                    if query.binary_search(&node).is_ok() {
                        d |= Direction::EQUAL;
                    }
                    d
                }
            }
            Operator::NotContains => {
                if query.len() > 1 || head != node {
                    Direction::ALL
                } else {
                    Direction::LEFT | Direction::RIGHT
                }
            }
            Operator::GreaterThen => {
                let q = self.single(dimension, query)?;
                if q < node {
                    Direction::ALL
                } else {
                    Direction::RIGHT
                }
            }
            Operator::GreaterThenOrEqualTo => {
                let q = self.single(dimension, query)?;
                if q < node {
                    Direction::ALL
                } else if q == node {
                    Direction::EQUAL | Direction::RIGHT
                } else {
                    Direction::RIGHT
                }
            }
            Operator::LessThenOrEqualTo => {
                let q = self.single(dimension, query)?;
                if q > node {
                    Direction::ALL
                } else if q == node {
                    Direction::EQUAL | Direction::LEFT
                } else {
                    Direction::LEFT
                }
            }
            Operator::LessThen => {
                let q = self.single(dimension, query)?;
                if q > node {
                    Direction::ALL
                } else {
                    Direction::LEFT
                }
            }
            Operator::BetweenInclusive => {
                if query.len() != 2 {
                    return Err(TreeError::invalid_arity(
                        dimension,
                        self.as_str(),
                        2,
                        query.len(),
                    ));
                }
                let (low, high) = (query[0], query[1]);
                let mut d = Direction::NONE;
                if high > node {
                    d |= Direction::RIGHT;
                }
                if low < node {
                    d |= Direction::LEFT;
                }
                if high == node || low == node || d == (Direction::LEFT | Direction::RIGHT) {
                    d |= Direction::EQUAL;
                }
                d
            }
        };

        Ok(direction)
    }

    fn single(self, dimension: &str, query: &[i64]) -> Result<i64> {
        match query {
            [q] => Ok(*q),
            _ => Err(TreeError::invalid_arity(
                dimension,
                self.as_str(),
                1,
                query.len(),
            )),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self> {
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| TreeError::unknown_operator(s))
    }
}

/// Bitmask over the `left`, `equal` and `right` subtrees of a binary node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Direction(u8);

impl Direction {
    pub const NONE: Direction = Direction(0);
    pub const LEFT: Direction = Direction(1);
    pub const EQUAL: Direction = Direction(1 << 1);
    pub const RIGHT: Direction = Direction(1 << 2);
    pub const ALL: Direction = Direction(0b111);

    #[inline]
    pub fn contains(self, other: Direction) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Direction {
    type Output = Direction;

    fn bitor(self, rhs: Direction) -> Direction {
        Direction(self.0 | rhs.0)
    }
}

impl BitOrAssign for Direction {
    fn bitor_assign(&mut self, rhs: Direction) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(op: Operator, query: &[i64], node: i64) -> Direction {
        op.direction("d", query, node).unwrap()
    }

    #[test]
    fn test_contains_single_is_exclusive() {
        assert_eq!(dir(Operator::Contains, &[5], 3), Direction::RIGHT);
        assert_eq!(dir(Operator::Contains, &[1], 3), Direction::LEFT);
        assert_eq!(dir(Operator::Contains, &[3], 3), Direction::EQUAL);
    }

    #[test]
    fn test_contains_multi_uses_min_max() {
        let d = dir(Operator::Contains, &[1, 3, 7], 3);
        assert!(d.contains(Direction::LEFT));
        assert!(d.contains(Direction::EQUAL));
        assert!(d.contains(Direction::RIGHT));

        let d = dir(Operator::ContainsAll, &[4, 7], 3);
        assert_eq!(d, Direction::RIGHT);
    }

    #[test]
    fn test_not_contains() {
        assert_eq!(
            dir(Operator::NotContains, &[3], 3),
            Direction::LEFT | Direction::RIGHT
        );
        assert_eq!(dir(Operator::NotContains, &[2], 3), Direction::ALL);
        assert_eq!(dir(Operator::NotContains, &[2, 3], 3), Direction::ALL);
    }

    #[test]
    fn test_ordered_comparisons() {
        // stored record value is the node code; query q selects records with
        // value OP q
        assert_eq!(dir(Operator::GreaterThen, &[1], 5), Direction::ALL);
        assert_eq!(dir(Operator::GreaterThen, &[5], 5), Direction::RIGHT);
        assert_eq!(
            dir(Operator::GreaterThenOrEqualTo, &[5], 5),
            Direction::EQUAL | Direction::RIGHT
        );
        assert_eq!(dir(Operator::LessThen, &[5], 5), Direction::LEFT);
        assert_eq!(
            dir(Operator::LessThenOrEqualTo, &[5], 5),
            Direction::EQUAL | Direction::LEFT
        );
        assert_eq!(dir(Operator::LessThenOrEqualTo, &[9], 5), Direction::ALL);
    }

    #[test]
    fn test_between() {
        assert_eq!(dir(Operator::BetweenInclusive, &[0, 9], 5), Direction::ALL);
        assert_eq!(
            dir(Operator::BetweenInclusive, &[5, 9], 5),
            Direction::EQUAL | Direction::RIGHT
        );
        assert_eq!(dir(Operator::BetweenInclusive, &[6, 9], 5), Direction::RIGHT);
        assert_eq!(dir(Operator::BetweenInclusive, &[1, 4], 5), Direction::LEFT);
    }

    #[test]
    fn test_arity_errors() {
        assert!(matches!(
            Operator::GreaterThen.direction("age", &[1, 2], 3),
            Err(TreeError::InvalidArity { expected: 1, actual: 2, .. })
        ));
        assert!(matches!(
            Operator::BetweenInclusive.direction("age", &[1], 3),
            Err(TreeError::InvalidArity { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_parse_roundtrip() {
        for op in Operator::ALL {
            assert_eq!(op.as_str().parse::<Operator>().unwrap(), op);
        }
        assert!("LIKE".parse::<Operator>().is_err());
    }
}
