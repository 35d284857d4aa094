// src/history/select.rs

//! Transaction selectors as typed on the command line
//!
//! A selector is a transaction id, `last`, or `last-N` (N transactions
//! before the most recent one). A range is two selectors joined by `..`.

use super::HistoryStore;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionSelector {
    Id(i64),
    /// `last` is `Last(0)`, `last-2` is `Last(2)`
    Last(i64),
}

impl TransactionSelector {
    /// Turn the selector into a stored transaction id
    pub fn resolve(&self, store: &dyn HistoryStore) -> Result<i64> {
        match *self {
            TransactionSelector::Id(id) => Ok(id),
            TransactionSelector::Last(offset) => {
                let last = store
                    .last()?
                    .and_then(|record| record.id)
                    .ok_or_else(|| Error::NotFoundError("No transaction history".to_string()))?;
                let id = last - offset;
                if id < 1 {
                    return Err(Error::NotFoundError(format!(
                        "No transaction {} before the last one",
                        offset
                    )));
                }
                Ok(id)
            }
        }
    }
}

impl FromStr for TransactionSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::ParseError(format!("Invalid transaction id: '{}'", s));

        if s == "last" {
            return Ok(TransactionSelector::Last(0));
        }
        if let Some(offset) = s.strip_prefix("last-") {
            let offset: i64 = offset.parse().map_err(|_| invalid())?;
            if offset < 0 {
                return Err(invalid());
            }
            return Ok(TransactionSelector::Last(offset));
        }

        let id: i64 = s.parse().map_err(|_| invalid())?;
        if id < 1 {
            return Err(invalid());
        }
        Ok(TransactionSelector::Id(id))
    }
}

impl fmt::Display for TransactionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionSelector::Id(id) => write!(f, "{}", id),
            TransactionSelector::Last(0) => write!(f, "last"),
            TransactionSelector::Last(n) => write!(f, "last-{}", n),
        }
    }
}

/// One transaction or an inclusive range of them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionRange {
    pub first: TransactionSelector,
    pub last: TransactionSelector,
}

impl TransactionRange {
    /// Resolved `(first, last)` ids, lowest first
    pub fn resolve(&self, store: &dyn HistoryStore) -> Result<(i64, i64)> {
        let a = self.first.resolve(store)?;
        let b = self.last.resolve(store)?;
        Ok((a.min(b), a.max(b)))
    }

    pub fn is_single(&self) -> bool {
        self.first == self.last
    }
}

impl FromStr for TransactionRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once("..") {
            Some((first, last)) => Ok(TransactionRange {
                first: first.parse()?,
                last: last.parse()?,
            }),
            None => {
                let single: TransactionSelector = s.parse()?;
                Ok(TransactionRange {
                    first: single,
                    last: single,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selectors() {
        assert_eq!("7".parse::<TransactionSelector>().unwrap(), TransactionSelector::Id(7));
        assert_eq!(
            "last".parse::<TransactionSelector>().unwrap(),
            TransactionSelector::Last(0)
        );
        assert_eq!(
            "last-3".parse::<TransactionSelector>().unwrap(),
            TransactionSelector::Last(3)
        );
        assert!("0".parse::<TransactionSelector>().is_err());
        assert!("last-x".parse::<TransactionSelector>().is_err());
        assert!("first".parse::<TransactionSelector>().is_err());
    }

    #[test]
    fn test_parse_ranges() {
        let range: TransactionRange = "3..last".parse().unwrap();
        assert_eq!(range.first, TransactionSelector::Id(3));
        assert_eq!(range.last, TransactionSelector::Last(0));
        assert!(!range.is_single());

        let single: TransactionRange = "5".parse().unwrap();
        assert!(single.is_single());
        assert!("3..".parse::<TransactionRange>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(TransactionSelector::Last(2).to_string(), "last-2");
        assert_eq!(TransactionSelector::Id(4).to_string(), "4");
    }
}
