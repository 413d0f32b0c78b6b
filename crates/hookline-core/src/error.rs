//! Error taxonomy for the broker core.
//!
//! The sentinel set here is the full error surface handlers are expected to
//! match on. Driver-specific failure codes are normalized into it at the
//! repository boundary so nothing above the storage layer ever sniffs
//! database internals.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type shared by the repositories, dispatcher, and handlers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A factory was called with too little information to build the entity.
    #[error("insufficient information for creating entity")]
    InsufficientInformation,

    /// The entity fails its validity predicate and cannot be persisted.
    #[error("entity is not in a valid state to save")]
    InvalidState,

    /// No row matched the lookup.
    #[error("no rows in result set")]
    NotFound,

    /// A message with this source id already exists on the channel.
    ///
    /// This is the publish idempotency signal; handlers may translate it
    /// into a success response.
    #[error("duplicate message id for channel")]
    DuplicateMessage,

    /// A delivery job for this (message, consumer) pair already exists.
    #[error("duplicate delivery job for consumer")]
    DuplicateJob,

    /// Both pagination bounds were supplied; the request is ill-formed.
    #[error("pagination deadlock: previous and next bounds cannot coexist")]
    PaginationDeadlock,

    /// The operation requires an ambient transaction and none was supplied.
    #[error("no transaction active in session")]
    NoActiveTransaction,

    /// The row changed underneath an optimistic update.
    #[error("stale data: entity was updated concurrently")]
    StaleData,

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            other => Self::Database(other),
        }
    }
}

/// Which unique index a constraint violation should normalize to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueViolationTarget {
    /// `messages (channel_fk, source_message_id)`.
    Message,
    /// `delivery_jobs (message_fk, consumer_fk)`.
    Job,
}

impl UniqueViolationTarget {
    fn sentinel(self) -> CoreError {
        match self {
            Self::Message => CoreError::DuplicateMessage,
            Self::Job => CoreError::DuplicateJob,
        }
    }
}

/// Unique-violation codes across the dialects the broker has run against:
/// PostgreSQL `unique_violation`, the MySQL 1062 class, and the SQLite
/// constraint family.
const UNIQUE_VIOLATION_CODES: &[&str] = &["23505", "1062", "1555", "2067", "19"];

/// Returns true when a driver error code denotes a unique-key violation.
pub fn is_unique_violation_code(code: &str) -> bool {
    UNIQUE_VIOLATION_CODES.contains(&code)
}

/// Normalizes a driver result into the domain error set.
///
/// An `Ok` input passes through untouched. Unique-violation errors map to
/// the sentinel for `target`; everything else falls through the regular
/// [`CoreError`] conversion (`RowNotFound` becomes [`CoreError::NotFound`]).
pub fn normalize_db_result<T>(
    result: std::result::Result<T, sqlx::Error>,
    target: UniqueViolationTarget,
) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(sqlx::Error::Database(db_err)) => {
            let unique = db_err.is_unique_violation()
                || db_err.code().is_some_and(|code| is_unique_violation_code(&code));
            if unique {
                Err(target.sentinel())
            } else {
                Err(CoreError::Database(sqlx::Error::Database(db_err)))
            }
        },
        Err(other) => Err(other.into()),
    }
}
