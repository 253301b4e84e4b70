use crate::calendar::ExclusionReason;
use crate::conflict::ResourceConflict;
use crate::persistence::PersistenceError;
use crate::resource::SchedulePeriod;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

/// The entity a rejected write collided with, so callers can explain the rejection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateViolation {
    Conflict {
        conflicts: Vec<ResourceConflict>,
    },
    ExcludedDate {
        date: NaiveDate,
        reasons: Vec<ExclusionReason>,
    },
    OverlappingPeriods {
        first: SchedulePeriod,
        second: SchedulePeriod,
    },
}

impl std::fmt::Display for StateViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateViolation::Conflict { conflicts } => {
                write!(f, "candidate conflicts with {} scheduled period(s)", conflicts.len())
            }
            StateViolation::ExcludedDate { date, reasons } => {
                let labels = reasons
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{date} is not an instructional day ({labels})")
            }
            StateViolation::OverlappingPeriods { first, second } => write!(
                f,
                "periods {} and {} overlap on {}",
                first.id, second.id, first.period.weekday
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("invalid range: {days} days exceeds the maximum of {max_days}")]
    RangeTooLarge { days: i64, max_days: i64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid state: {0}")]
    InvalidState(StateViolation),

    #[error("computation error: {0}")]
    Computation(String),

    #[error("store error: {0}")]
    Store(#[from] PersistenceError),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn computation(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(%message, "stored data failed an integrity check");
        EngineError::Computation(message)
    }

    pub fn violation(&self) -> Option<&StateViolation> {
        match self {
            EngineError::InvalidState(violation) => Some(violation),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
