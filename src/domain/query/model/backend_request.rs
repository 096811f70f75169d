use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::domain::query::model::{BucketAgg, MetricAgg};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Aggregated histogram, parsed into one frame per series.
    TimeSeries,
    /// Raw hits, parsed into a single logs frame.
    Logs,
}

/// Search produced by the builder for exactly one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendRequest {
    pub ref_id: String,
    pub index: String,
    pub kind: RequestKind,
    pub time_field: String,
    pub interval: Duration,

    /// `_msearch` header line.
    pub header: Value,

    /// Search body line.
    pub body: Value,

    /// Metrics the response parser needs to name series.
    pub metrics: Vec<MetricAgg>,

    /// Bucket aggregations in nesting order.
    pub bucket_aggs: Vec<BucketAgg>,

    /// `_source` keys promoted to the front of a logs frame.
    pub log_message_field: Option<String>,
    pub log_level_field: Option<String>,
}

impl BackendRequest {
    /// Newline-delimited `_msearch` payload.
    pub fn to_ndjson(&self) -> serde_json::Result<String> {
        Ok(format!(
            "{}\n{}\n",
            serde_json::to_string(&self.header)?,
            serde_json::to_string(&self.body)?
        ))
    }
}
