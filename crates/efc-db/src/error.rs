use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A unique column already holds the value.
    #[error("{field} is already in use")]
    Conflict { field: &'static str },

    #[error("the only chapter of a course cannot be deleted")]
    CannotDeleteSoleChapter,

    #[error("cannot insert after chapter {after_index}: course has {count} chapters")]
    InvalidPosition { after_index: i64, count: i64 },

    /// Chapter renumbering did not commit. Nothing was changed.
    #[error("chapter renumbering rolled back: {0}")]
    TransactionFailure(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Turns a UNIQUE violation on one of `columns` (`"table.column"`, field name)
/// into `Conflict`; anything else passes through.
pub(crate) fn unique_violation(err: rusqlite::Error, columns: &[(&str, &'static str)]) -> StoreError {
    if let rusqlite::Error::SqliteFailure(code, Some(msg)) = &err {
        if code.code == ErrorCode::ConstraintViolation {
            for &(column, field) in columns {
                if msg.contains(column) {
                    return StoreError::Conflict { field };
                }
            }
        }
    }
    StoreError::Sqlite(err)
}
