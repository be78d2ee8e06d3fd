//! sqlx-backed repositories. Queries are built from `COLUMNS` constants and run
//! against the shared pool; multi-statement writes open their own transaction.

mod access;
mod attempts;
mod catalog;

pub(crate) use access::{PgAccess, PgGroups};
pub(crate) use attempts::PgAttempts;
pub(crate) use catalog::{PgQuestions, PgTests};

use super::RepoError;

const UNIQUE_VIOLATION: &str = "23505";

/// Turns a unique-constraint violation into [`RepoError::Conflict`].
fn conflict_on_unique(err: sqlx::Error, what: &str) -> RepoError {
    let is_unique = err
        .as_database_error()
        .and_then(|db_err| db_err.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION);
    if is_unique {
        RepoError::Conflict(what.to_string())
    } else {
        RepoError::Database(err)
    }
}
