use crate::domain::money::Money;
use crate::domain::ports::Constraint;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Duration must be between {min} and {max} days, got {days}")]
    InvalidDuration { days: u32, min: u32, max: u32 },
    #[error("Insufficient balance. Available: {available}")]
    InsufficientBalance { requested: Money, available: Money },
    #[error("Full payment required to complete: paid {paid} of {total}")]
    InsufficientPayment { paid: Money, total: Money },
    #[error("Confirming {amount} would exceed layaway total ({total}). Current amount paid: {paid}")]
    ExceedsBalance {
        amount: Money,
        paid: Money,
        total: Money,
    },
    #[error("Amount ({amount}) exceeds remaining balance ({remaining})")]
    ExceedsRemaining { amount: Money, remaining: Money },
    #[error("Item value ({requested}) exceeds your available layaway limit ({available})")]
    LimitExceeded { requested: Money, available: Money },
    #[error("A pending membership request already exists for this tier")]
    DuplicatePending,
    #[error("User already has an active membership")]
    DuplicateActive,
    #[error("This payment is already confirmed")]
    AlreadyConfirmed,
    #[error("{0}")]
    NotEligible(String),
    #[error("This membership tier is not currently available")]
    TierUnavailable,
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("Operation not permitted for this caller")]
    Forbidden,
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: String },
    #[error("Unique constraint violated: {0:?}")]
    Constraint(Constraint),
    #[error("Storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Maps a commit-time uniqueness violation to the matching domain error.
    pub fn into_domain(self) -> Self {
        match self {
            Self::Constraint(Constraint::PendingPerTier) => Self::DuplicatePending,
            Self::Constraint(Constraint::ActivePerUser) => Self::DuplicateActive,
            Self::Constraint(Constraint::TierName) => {
                Self::Validation("A tier with this name already exists.".to_string())
            }
            other => other,
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Self::Storage(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
