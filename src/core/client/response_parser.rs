use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

use crate::core::client::search_client::SearchClientError;
use crate::domain::query::model::{
    BackendRequest, BucketAgg, BucketAggType, DataFrame, MetricAgg, MetricType, RequestKind,
};

/// Turn an `_msearch` response body into frames for `request`.
pub fn parse_msearch_response(
    request: &BackendRequest,
    body: &Value,
) -> Result<Vec<DataFrame>, SearchClientError> {
    let response = body
        .get("responses")
        .and_then(Value::as_array)
        .and_then(|r| r.first())
        .ok_or_else(|| malformed("missing 'responses'"))?;

    if let Some(err) = response.get("error") {
        return Err(SearchClientError::Backend(error_reason(err)));
    }

    let frames = match request.kind {
        RequestKind::TimeSeries => parse_time_series(request, response)?,
        RequestKind::Logs => parse_logs(request, response)?,
    };

    Ok(match shards_meta(response) {
        Some(meta) => frames.into_iter().map(|f| f.with_meta(meta.clone())).collect(),
        None => frames,
    })
}

/// `{"shards": {"total", "failed"}}` from the response `_shards` block.
fn shards_meta(response: &Value) -> Option<Value> {
    let shards = response.get("_shards")?;
    let count = |key: &str| shards.get(key).and_then(Value::as_u64).unwrap_or(0);
    Some(json!({
        "shards": {
            "total": count("total"),
            "failed": count("failed"),
        }
    }))
}

fn malformed(msg: impl Into<String>) -> SearchClientError {
    SearchClientError::MalformedResponse(msg.into())
}

fn error_reason(err: &Value) -> String {
    err.get("root_cause")
        .and_then(Value::as_array)
        .and_then(|causes| causes.first())
        .and_then(|c| c.get("reason"))
        .or_else(|| err.get("reason"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string())
}

// =========================
// Time series
// =========================

fn parse_time_series(
    request: &BackendRequest,
    response: &Value,
) -> Result<Vec<DataFrame>, SearchClientError> {
    let aggregations = response
        .get("aggregations")
        .filter(|a| a.is_object())
        .ok_or_else(|| malformed("missing 'aggregations'"))?;

    let mut frames = Vec::new();
    walk_buckets(
        aggregations,
        &request.bucket_aggs,
        &request.metrics,
        &mut Vec::new(),
        &mut frames,
    )?;
    Ok(frames)
}

fn walk_buckets(
    node: &Value,
    bucket_aggs: &[BucketAgg],
    metrics: &[MetricAgg],
    labels: &mut Vec<String>,
    frames: &mut Vec<DataFrame>,
) -> Result<(), SearchClientError> {
    let Some((agg, rest)) = bucket_aggs.split_first() else {
        return Ok(());
    };

    let buckets = node
        .get(&agg.id)
        .and_then(|a| a.get("buckets"))
        .and_then(Value::as_array)
        .ok_or_else(|| malformed(format!("missing buckets for aggregation '{}'", agg.id)))?;

    match agg.agg_type {
        BucketAggType::Terms => {
            for bucket in buckets {
                labels.push(bucket_key_label(bucket));
                let result = walk_buckets(bucket, rest, metrics, labels, frames);
                labels.pop();
                result?;
            }
        }
        BucketAggType::DateHistogram => {
            frames.extend(histogram_frames(buckets, metrics, labels)?);
        }
    }
    Ok(())
}

fn bucket_key_label(bucket: &Value) -> String {
    match bucket.get("key_as_string").or_else(|| bucket.get("key")) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn histogram_frames(
    buckets: &[Value],
    metrics: &[MetricAgg],
    labels: &[String],
) -> Result<Vec<DataFrame>, SearchClientError> {
    let times = buckets
        .iter()
        .map(|b| {
            b.get("key")
                .and_then(Value::as_i64)
                .map(Value::from)
                .ok_or_else(|| malformed("histogram bucket without numeric key"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let frames = metrics
        .iter()
        .map(|metric| {
            let values = buckets
                .iter()
                .map(|b| metric_value(b, metric))
                .collect::<Vec<_>>();

            let display = metric.display_name();
            let name = if labels.is_empty() {
                display.clone()
            } else {
                format!("{} {}", labels.join(" "), display)
            };

            DataFrame::new(name)
                .with_field("time", times.clone())
                .with_field(display, values)
        })
        .collect();

    Ok(frames)
}

fn metric_value(bucket: &Value, metric: &MetricAgg) -> Value {
    match metric.metric_type {
        MetricType::Count => bucket.get("doc_count").cloned().unwrap_or(Value::Null),
        _ => bucket
            .get(&metric.id)
            .and_then(|m| m.get("value"))
            .cloned()
            .unwrap_or(Value::Null),
    }
}

// =========================
// Logs
// =========================

fn parse_logs(
    request: &BackendRequest,
    response: &Value,
) -> Result<Vec<DataFrame>, SearchClientError> {
    let hits = response
        .get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("missing 'hits.hits'"))?;

    let empty = Map::new();
    let sources: Vec<&Map<String, Value>> = hits
        .iter()
        .map(|hit| hit.get("_source").and_then(Value::as_object).unwrap_or(&empty))
        .collect();

    let time_field = request.time_field.as_str();
    // names already taken by the fixed columns
    let reserved = [time_field, "_id", "_source"];

    let keys: BTreeSet<&str> = sources
        .iter()
        .flat_map(|s| s.keys().map(String::as_str))
        .filter(|k| !reserved.contains(k))
        .collect();

    // configured message/level fields first, then the rest alphabetically
    let mut columns: Vec<&str> = [&request.log_message_field, &request.log_level_field]
        .into_iter()
        .filter_map(|f| f.as_deref())
        .filter(|f| keys.contains(f))
        .collect();
    columns.dedup();
    let rest: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|k| !columns.contains(k))
        .collect();
    columns.extend(rest);

    let times = hits
        .iter()
        .zip(&sources)
        .map(|(hit, source)| {
            source
                .get(time_field)
                .or_else(|| hit.get("sort").and_then(|s| s.get(0)))
                .cloned()
                .unwrap_or(Value::Null)
        })
        .collect();

    let ids = hits
        .iter()
        .map(|hit| hit.get("_id").cloned().unwrap_or(Value::Null))
        .collect();

    let documents = sources
        .iter()
        .map(|s| Value::Object((*s).clone()))
        .collect();

    let mut frame = DataFrame::new("logs")
        .with_field(time_field, times)
        .with_field("_id", ids)
        .with_field("_source", documents);

    for column in columns {
        let values = sources
            .iter()
            .map(|s| s.get(column).cloned().unwrap_or(Value::Null))
            .collect();
        frame = frame.with_field(column, values);
    }

    Ok(vec![frame])
}
