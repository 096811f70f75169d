use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{serde_as, DisplayFromStr, DurationMilliSeconds, PickFirst};
use std::time::Duration;

use crate::core::util::interval_util::parse_interval;
use crate::domain::query::model::TimeRange;

/// All panel queries of one dashboard refresh.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "RawQueryRequest")]
pub struct QueryRequest {
    pub queries: Vec<QueryEntry>,
}

impl QueryRequest {
    pub fn new(queries: Vec<Query>) -> Self {
        Self {
            queries: queries.into_iter().map(QueryEntry::Valid).collect(),
        }
    }
}

#[derive(Deserialize)]
struct RawQueryRequest {
    #[serde(default)]
    queries: Vec<Value>,
}

impl TryFrom<RawQueryRequest> for QueryRequest {
    type Error = String;

    fn try_from(raw: RawQueryRequest) -> Result<Self, Self::Error> {
        let queries = raw
            .queries
            .into_iter()
            .enumerate()
            .map(|(index, value)| QueryEntry::decode(index, value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { queries })
    }
}

/// One element of `queries`, decoded on its own.
///
/// Only `refId` is required to keep the entry; anything else that fails to
/// decode is kept as `Malformed` and reported against that `refId` alone.
#[derive(Debug, Clone)]
pub enum QueryEntry {
    Valid(Query),
    Malformed { ref_id: String, reason: String },
}

impl QueryEntry {
    pub fn ref_id(&self) -> &str {
        match self {
            QueryEntry::Valid(query) => &query.ref_id,
            QueryEntry::Malformed { ref_id, .. } => ref_id,
        }
    }

    fn decode(index: usize, value: Value) -> Result<Self, String> {
        let ref_id = match value.get("refId") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => return Err(format!("queries[{}] has no refId", index)),
        };

        Ok(match serde_json::from_value::<Query>(value) {
            Ok(query) => QueryEntry::Valid(query),
            Err(e) => QueryEntry::Malformed {
                ref_id,
                reason: e.to_string(),
            },
        })
    }
}

impl From<Query> for QueryEntry {
    fn from(query: Query) -> Self {
        QueryEntry::Valid(query)
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub ref_id: String,
    pub time_range: TimeRange,

    /// Lucene query text; `None` or blank matches everything.
    #[serde(default)]
    pub query: Option<String>,

    #[serde(default)]
    pub metrics: Vec<MetricAgg>,

    #[serde(default)]
    pub bucket_aggs: Vec<BucketAgg>,

    /// Overrides the datasource time field.
    #[serde(default)]
    pub time_field: Option<String>,

    /// Minimum interval requested by the panel.
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub interval_ms: Option<Duration>,

    #[serde(default)]
    pub max_data_points: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Count,
    Avg,
    Sum,
    Min,
    Max,
    Cardinality,
    Logs,
    RawData,
}

impl MetricType {
    /// Raw-document metrics are served by a hits query instead of an aggregation.
    pub fn is_document_query(self) -> bool {
        matches!(self, MetricType::Logs | MetricType::RawData)
    }

    pub fn requires_field(self) -> bool {
        matches!(
            self,
            MetricType::Avg
                | MetricType::Sum
                | MetricType::Min
                | MetricType::Max
                | MetricType::Cardinality
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            MetricType::Count => "Count",
            MetricType::Avg => "Average",
            MetricType::Sum => "Sum",
            MetricType::Min => "Min",
            MetricType::Max => "Max",
            MetricType::Cardinality => "Unique Count",
            MetricType::Logs => "Logs",
            MetricType::RawData => "Raw Data",
        }
    }

    /// Aggregation keyword understood by the backend, if any.
    pub fn agg_name(self) -> Option<&'static str> {
        match self {
            MetricType::Avg => Some("avg"),
            MetricType::Sum => Some("sum"),
            MetricType::Min => Some("min"),
            MetricType::Max => Some("max"),
            MetricType::Cardinality => Some("cardinality"),
            MetricType::Count | MetricType::Logs | MetricType::RawData => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAgg {
    pub id: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub settings: MetricSettings,
}

impl MetricAgg {
    /// Display name used for the value column of the resulting frame.
    pub fn display_name(&self) -> String {
        match self.field.as_deref() {
            Some(field) if self.metric_type.requires_field() => {
                format!("{} {}", self.metric_type.label(), field)
            }
            _ => self.metric_type.label().to_string(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSettings {
    /// Max documents for `logs` / `raw_data`. Accepts `"500"` or `500`.
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(alias = "size")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketAggType {
    Terms,
    DateHistogram,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketAgg {
    pub id: String,
    #[serde(rename = "type")]
    pub agg_type: BucketAggType,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub settings: BucketSettings,
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSettings {
    /// `auto` or an explicit interval for `date_histogram`.
    #[serde(default)]
    pub interval: Option<String>,

    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(alias = "min_doc_count")]
    pub min_doc_count: Option<u64>,

    /// Number of terms to keep for `terms`.
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub size: Option<usize>,
}

impl Query {
    pub fn date_histogram(&self) -> Option<&BucketAgg> {
        self.bucket_aggs
            .iter()
            .find(|b| b.agg_type == BucketAggType::DateHistogram)
    }

    pub fn is_document_query(&self) -> bool {
        self.metrics
            .iter()
            .any(|m| m.metric_type.is_document_query())
    }

    /// Caller-supplied intervals in precedence order: an explicit histogram
    /// interval, then `intervalMs`.
    ///
    /// Unparseable histogram intervals are skipped here and reported by the builder.
    pub fn interval_hints(&self) -> impl Iterator<Item = Duration> + '_ {
        self.date_histogram()
            .and_then(|h| h.settings.interval.as_deref())
            .and_then(|raw| parse_interval(raw).ok().flatten())
            .into_iter()
            .chain(self.interval_ms)
    }

    /// Lucene text, defaulting to match-all.
    pub fn lucene_query(&self) -> &str {
        match self.query.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => q,
            _ => "*",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn histogram_query(interval: &str) -> Query {
        serde_json::from_value(json!({
            "refId": "A",
            "timeRange": { "from": "2024-05-01T12:00:00Z", "to": "2024-05-01T13:00:00Z" },
            "query": "service:api",
            "metrics": [{ "id": "1", "type": "count" }],
            "bucketAggs": [{
                "id": "2",
                "type": "date_histogram",
                "field": "_timesinceepoch",
                "settings": { "interval": interval, "min_doc_count": "0" }
            }],
            "intervalMs": 15000
        }))
        .unwrap()
    }

    #[test]
    fn deserializes_frontend_payload() {
        let q = histogram_query("auto");
        assert_eq!(q.ref_id, "A");
        assert_eq!(q.metrics[0].metric_type, MetricType::Count);
        assert_eq!(q.bucket_aggs[0].agg_type, BucketAggType::DateHistogram);
        assert_eq!(q.bucket_aggs[0].settings.min_doc_count, Some(0));
        assert_eq!(q.interval_ms, Some(Duration::from_secs(15)));
    }

    #[test]
    fn explicit_histogram_interval_comes_before_interval_ms() {
        let hints: Vec<_> = histogram_query("1m").interval_hints().collect();
        assert_eq!(hints, vec![Duration::from_secs(60), Duration::from_secs(15)]);
        let hints: Vec<_> = histogram_query("auto").interval_hints().collect();
        assert_eq!(hints, vec![Duration::from_secs(15)]);
    }

    #[test]
    fn malformed_entry_keeps_its_ref_id() {
        let req: QueryRequest = serde_json::from_value(json!({ "queries": [
            { "refId": "A", "timeRange": { "from": "2024-05-01T12:00:00Z", "to": "2024-05-01T13:00:00Z" },
              "metrics": [{ "id": "1", "type": "count" }] },
            { "refId": "B", "metrics": [{ "id": "1", "type": "percentiles" }] }
        ]}))
        .unwrap();

        assert_eq!(req.queries.len(), 2);
        assert!(matches!(req.queries[0], QueryEntry::Valid(_)));
        match &req.queries[1] {
            QueryEntry::Malformed { ref_id, reason } => {
                assert_eq!(ref_id, "B");
                assert!(reason.contains("percentiles"), "{}", reason);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn entry_without_ref_id_rejects_request() {
        let err = serde_json::from_value::<QueryRequest>(json!({ "queries": [{ "query": "*" }] }))
            .unwrap_err();
        assert!(err.to_string().contains("queries[0] has no refId"), "{}", err);
    }

    #[test]
    fn blank_query_matches_everything() {
        let mut q = histogram_query("auto");
        q.query = Some("   ".into());
        assert_eq!(q.lucene_query(), "*");
    }

    #[test]
    fn display_name_includes_field_for_numeric_metrics() {
        let m: MetricAgg = serde_json::from_value(json!({
            "id": "3", "type": "avg", "field": "latency_ms"
        }))
        .unwrap();
        assert_eq!(m.display_name(), "Average latency_ms");
    }
}
