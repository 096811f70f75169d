use async_trait::async_trait;
use http::StatusCode;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::query::error::QueryError;
use crate::domain::query::model::{BackendRequest, DataFrame};

#[derive(Debug, Error)]
pub enum SearchClientError {
    #[error("request to search backend failed: {0}")]
    Transport(String),

    #[error("search backend returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("search backend rejected the query: {0}")]
    Backend(String),

    #[error("malformed search response: {0}")]
    MalformedResponse(String),

    #[error("search cancelled")]
    Cancelled,
}

impl From<SearchClientError> for QueryError {
    fn from(err: SearchClientError) -> Self {
        match err {
            SearchClientError::Cancelled => QueryError::Cancelled("search cancelled".to_string()),
            other => QueryError::Backend(other.to_string()),
        }
    }
}

/// Executes one built search against the backend.
///
/// Implementations should stop work once `cancel` fires; the dispatcher
/// resolves the query as cancelled either way. Retries, if any, live here.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn execute(
        &self,
        request: &BackendRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<DataFrame>, SearchClientError>;
}
