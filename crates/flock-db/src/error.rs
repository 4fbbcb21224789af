use rusqlite::ffi;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("invalid {0}")]
    Invalid(&'static str),

    #[error("not the owner of this {0}")]
    NotOwner(&'static str),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error("blocking task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Map constraint violations on a write to their domain meaning.
pub(crate) fn classify(err: rusqlite::Error, what: &'static str) -> DbError {
    if let rusqlite::Error::SqliteFailure(code, _) = &err {
        match code.extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                return DbError::Conflict(what);
            }
            ffi::SQLITE_CONSTRAINT_CHECK => return DbError::Invalid(what),
            _ => {}
        }
    }
    DbError::Sqlite(err)
}
