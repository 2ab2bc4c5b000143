//! Typed results handed to the UI layer.

use std::time::Duration;

use bible_core::{BibleError, FieldError, Result};

/// Result of a facade read.
///
/// `Empty` is valid content; `Failed` and `TimedOut` are not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome<T> {
    Found(Vec<T>),
    Empty,
    Failed { reason: String },
    TimedOut { after: Duration },
}

impl<T> QueryOutcome<T> {
    /// `Found` unless `records` is empty.
    pub fn from_records(records: Vec<T>) -> Self {
        if records.is_empty() {
            Self::Empty
        } else {
            Self::Found(records)
        }
    }

    pub fn from_error(err: BibleError) -> Self {
        match err {
            BibleError::Timeout { millis } => Self::TimedOut {
                after: Duration::from_millis(millis),
            },
            other => Self::Failed {
                reason: other.to_string(),
            },
        }
    }

    /// Records, or an empty slice for every other outcome.
    pub fn records(&self) -> &[T] {
        match self {
            Self::Found(records) => records,
            _ => &[],
        }
    }

    pub fn into_records(self) -> Vec<T> {
        match self {
            Self::Found(records) => records,
            _ => Vec::new(),
        }
    }

    /// True for outcomes that carry usable content, including `Empty`.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Found(_) | Self::Empty)
    }

    /// True when retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::TimedOut { .. })
    }

    pub fn map<U, F>(self, f: F) -> QueryOutcome<U>
    where
        F: FnOnce(Vec<T>) -> Vec<U>,
    {
        match self {
            Self::Found(records) => QueryOutcome::from_records(f(records)),
            Self::Empty => QueryOutcome::Empty,
            Self::Failed { reason } => QueryOutcome::Failed { reason },
            Self::TimedOut { after } => QueryOutcome::TimedOut { after },
        }
    }
}

impl<T> From<Result<Vec<T>>> for QueryOutcome<T> {
    fn from(result: Result<Vec<T>>) -> Self {
        match result {
            Ok(records) => Self::from_records(records),
            Err(e) => Self::from_error(e),
        }
    }
}

/// Result of a commentary submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Stored with this id.
    Saved { id: i64 },

    /// Rejected before any I/O.
    Invalid(Vec<FieldError>),

    Failed { reason: String },
}

impl SubmitOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_is_not_found() {
        assert_eq!(QueryOutcome::<u8>::from_records(Vec::new()), QueryOutcome::Empty);
        assert_eq!(QueryOutcome::from_records(vec![1]), QueryOutcome::Found(vec![1]));
    }

    #[test]
    fn test_timeout_is_distinct_from_failure() {
        let timed_out = QueryOutcome::<u8>::from_error(BibleError::Timeout { millis: 15_000 });
        assert_eq!(
            timed_out,
            QueryOutcome::TimedOut {
                after: Duration::from_secs(15)
            }
        );
        assert!(timed_out.is_retryable());
        assert!(!timed_out.is_ok());

        let failed = QueryOutcome::<u8>::from_error(BibleError::remote("connection refused"));
        assert!(matches!(failed, QueryOutcome::Failed { ref reason } if reason.contains("connection refused")));
        assert!(failed.records().is_empty());
    }

    #[test]
    fn test_map_keeps_non_found_variants() {
        let found = QueryOutcome::Found(vec![3, 1, 3]).map(|mut v| {
            v.dedup();
            v
        });
        assert_eq!(found.into_records(), vec![3, 1, 3]);

        let emptied = QueryOutcome::Found(vec![1]).map(|_| Vec::<u8>::new());
        assert_eq!(emptied, QueryOutcome::Empty);

        let failed = QueryOutcome::<u8>::Failed {
            reason: "x".into(),
        }
        .map(|v| v);
        assert!(failed.is_retryable());
    }
}
