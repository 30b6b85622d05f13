use std::fmt;

use crate::domain::RunMeta;

/// Highest tolerated share of placeholder-titled records, in percent
pub const MAX_PLACEHOLDER_PERCENT: usize = 5;

/// Outcome of the data-quality gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    Passed,
    /// Would have failed, published anyway on request
    Forced,
    Empty,
    TooManyPlaceholders { placeholders: usize, total: usize },
}

impl GuardVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Passed | Self::Forced)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Forced => "forced",
            Self::Empty => "empty",
            Self::TooManyPlaceholders { .. } => "too_many_placeholders",
        }
    }
}

impl fmt::Display for GuardVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Forced => write!(f, "forced (guard overridden)"),
            Self::Empty => write!(f, "refused: dataset is empty"),
            Self::TooManyPlaceholders {
                placeholders,
                total,
            } => write!(
                f,
                "refused: {} of {} records have placeholder titles (limit {}%)",
                placeholders, total, MAX_PLACEHOLDER_PERCENT
            ),
        }
    }
}

/// Refuses to publish a dataset that is empty or mostly placeholders.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitGuard {
    force: bool,
}

impl CommitGuard {
    pub fn new(force: bool) -> Self {
        Self { force }
    }

    pub fn evaluate(&self, meta: &RunMeta) -> GuardVerdict {
        let verdict = Self::check(meta.total, meta.placeholder_count);
        if self.force && !verdict.is_pass() {
            GuardVerdict::Forced
        } else {
            verdict
        }
    }

    fn check(total: usize, placeholders: usize) -> GuardVerdict {
        if total == 0 {
            return GuardVerdict::Empty;
        }
        if placeholders * 100 > total * MAX_PLACEHOLDER_PERCENT {
            return GuardVerdict::TooManyPlaceholders {
                placeholders,
                total,
            };
        }
        GuardVerdict::Passed
    }
}
