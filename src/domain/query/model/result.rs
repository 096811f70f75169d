use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::query::error::QueryError;
use crate::domain::query::model::DataFrame;

/// Failure categories that stay scoped to a single query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Backend,
    Cancelled,
}

/// Terminal state of one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryResult {
    Succeeded { frames: Vec<DataFrame> },
    Failed { kind: ErrorKind, message: String },
}

impl QueryResult {
    pub fn success(frames: Vec<DataFrame>) -> Self {
        QueryResult::Succeeded { frames }
    }

    pub fn status(&self) -> QueryStatus {
        match self {
            QueryResult::Succeeded { .. } => QueryStatus::Succeeded,
            QueryResult::Failed {
                kind: ErrorKind::Cancelled,
                ..
            } => QueryStatus::Cancelled,
            QueryResult::Failed { .. } => QueryStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, QueryResult::Succeeded { .. })
    }

    pub fn frames(&self) -> Option<&[DataFrame]> {
        match self {
            QueryResult::Succeeded { frames } => Some(frames),
            QueryResult::Failed { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            QueryResult::Failed { kind, .. } => Some(*kind),
            QueryResult::Succeeded { .. } => None,
        }
    }
}

impl From<QueryError> for QueryResult {
    fn from(err: QueryError) -> Self {
        QueryResult::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Per-query outcomes keyed by `ref_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDataResponse {
    pub results: HashMap<String, QueryResult>,
}

impl QueryDataResponse {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, ref_id: &str) -> Option<&QueryResult> {
        self.results.get(ref_id)
    }
}

impl FromIterator<(String, QueryResult)> for QueryDataResponse {
    fn from_iter<I: IntoIterator<Item = (String, QueryResult)>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cancelled_failure_reports_cancelled_status() {
        let r: QueryResult = QueryError::Cancelled("deadline exceeded".into()).into();
        assert_eq!(r.status(), QueryStatus::Cancelled);
        assert_eq!(r.error_kind(), Some(ErrorKind::Cancelled));
    }

    #[test]
    fn serializes_with_status_tag() {
        let r: QueryResult = QueryError::Validation("no metrics".into()).into();
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            json!({ "status": "failed", "kind": "validation", "message": "validation error: no metrics" })
        );
    }
}
