use thiserror::Error;

use crate::repositories::RepoError;

#[derive(Debug, Error)]
pub(crate) enum ServiceError {
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Storage(RepoError),
}

impl From<RepoError> for ServiceError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Conflict(reason) => Self::Conflict(reason),
            other => Self::Storage(other),
        }
    }
}

impl ServiceError {
    pub(crate) fn not_found(entity: &str) -> Self {
        Self::NotFound(format!("{entity} not found"))
    }

    pub(crate) fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState(reason.into())
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }
}

pub(crate) type ServiceResult<T> = Result<T, ServiceError>;
