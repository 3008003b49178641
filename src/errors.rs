//! Errors.
use std::borrow::Cow;

/// Canonical status code of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    Unimplemented,
    Aborted,
    Cancelled,
    Internal,
}

/// Error returned by every store operation.
///
/// The variants mirror the status vocabulary of the public API: validation
/// errors are computed before any write, consistency errors roll the
/// enclosing transaction back, and `Db` carries storage errors verbatim.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A malformed or missing request field.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested entity does not exist.
    ///
    /// Reads translate this into an empty response; only the lineage
    /// traversal surfaces it to callers.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated, or a type upsert conflicted
    /// with the stored schema.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The stored state does not admit the requested operation.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// The operation is recognized but not supported.
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    /// A concurrent writer won a race; retrying the transaction is safe.
    #[error("aborted: {0}")]
    Aborted(String),

    /// The store is intentionally unusable (e.g. after a schema downgrade).
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Database error.
    #[error("database error")]
    Db(#[from] sqlx::Error),
}

impl StoreError {
    pub fn code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::InvalidArgument,
            Self::NotFound(_) => StatusCode::NotFound,
            Self::AlreadyExists(_) => StatusCode::AlreadyExists,
            Self::FailedPrecondition(_) => StatusCode::FailedPrecondition,
            Self::Unimplemented(_) => StatusCode::Unimplemented,
            Self::Aborted(_) => StatusCode::Aborted,
            Self::Cancelled(_) => StatusCode::Cancelled,
            Self::Db(_) => StatusCode::Internal,
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub(crate) fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub(crate) fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Whether the transaction executor may retry the enclosing transaction.
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Self::Db(sqlx::Error::Database(e)) => {
                let message = e.message().to_ascii_lowercase();
                message.contains("database is locked")
                    || message.contains("database table is locked")
                    || message.contains("deadlock")
                    || message.contains("lock wait timeout")
            }
            _ => false,
        }
    }

    /// Maps a unique-constraint violation to `AlreadyExists`; any other
    /// database error is passed through.
    pub(crate) fn from_insert_conflict(e: sqlx::Error, target: impl Into<Cow<'static, str>>) -> Self {
        if let sqlx::Error::Database(db) = &e {
            let message = db.message().to_ascii_lowercase();
            if message.contains("unique constraint failed")
                || message.contains("duplicate entry")
                || message.contains("constraint violation")
            {
                return Self::AlreadyExists(format!("{} already exists", target.into()));
            }
        }
        Self::Db(e)
    }
}
