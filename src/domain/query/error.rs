use thiserror::Error;

use crate::domain::query::model::ErrorKind;

/// Whole-batch rejection. The only error `dispatch` returns to its caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("bad request: query contains no queries")]
    EmptyBatch,

    #[error("bad request: duplicate refId '{0}'")]
    DuplicateRefId(String),
}

/// Failure of one query; recorded in the response next to its siblings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl QueryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        QueryError::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::Validation(_) => ErrorKind::Validation,
            QueryError::Backend(_) => ErrorKind::Backend,
            QueryError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }
}
