use std::collections::HashSet;

use crate::common::{BlockPointer, PointerPair};
use crate::types::Value;

/// Tree of column clauses evaluated by
/// [`IndexManager::find_range_index`](super::IndexManager::find_range_index).
///
/// Range bounds are inclusive; a `None` bound is open on that side. Null keys
/// only match a range with an open lower bound.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Range {
        column: String,
        lo: Option<Value>,
        hi: Option<Value>,
    },
    Eq {
        column: String,
        value: Value,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn range(column: impl Into<String>, lo: Option<Value>, hi: Option<Value>) -> Self {
        Predicate::Range {
            column: column.into(),
            lo,
            hi,
        }
    }

    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut clauses) => {
                clauses.push(other);
                Predicate::And(clauses)
            }
            clause => Predicate::And(vec![clause, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut clauses) => {
                clauses.push(other);
                Predicate::Or(clauses)
            }
            clause => Predicate::Or(vec![clause, other]),
        }
    }
}

/// One row matched by a range query.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeMatch {
    pub key: Option<Value>,
    pub value: PointerPair,
    /// Schema position of the column the match came from.
    pub column: usize,
}

impl RangeMatch {
    pub fn table_row(&self) -> BlockPointer {
        self.value.table_row
    }
}

/// Keeps the matches of `left` whose row also appears in `right`.
pub(crate) fn intersect(left: Vec<RangeMatch>, right: &[RangeMatch]) -> Vec<RangeMatch> {
    let rows: HashSet<BlockPointer> = right.iter().map(RangeMatch::table_row).collect();
    left.into_iter()
        .filter(|m| rows.contains(&m.table_row()))
        .collect()
}

/// Appends the matches of `right` for rows not already in `left`.
pub(crate) fn union(mut left: Vec<RangeMatch>, right: Vec<RangeMatch>) -> Vec<RangeMatch> {
    let mut rows: HashSet<BlockPointer> = left.iter().map(RangeMatch::table_row).collect();
    left.extend(right.into_iter().filter(|m| rows.insert(m.table_row())));
    left
}
