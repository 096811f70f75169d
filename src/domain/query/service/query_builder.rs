use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::core::settings::ConnectionSettings;
use crate::core::util::interval_util::{format_interval, parse_interval};
use crate::domain::query::error::QueryError;
use crate::domain::query::model::{
    BackendRequest, BucketAgg, BucketAggType, MetricAgg, Query, RequestKind, TimeRange,
};

const DEFAULT_TERMS_SIZE: usize = 10;

/// Translate one panel query into a backend search. Pure: no I/O.
///
/// `interval` is embedded as the `fixed_interval` of the `date_histogram`.
pub fn build_backend_request(
    query: &Query,
    interval: Duration,
    settings: &ConnectionSettings,
) -> Result<BackendRequest, QueryError> {
    if !query.time_range.is_valid() {
        return Err(QueryError::validation(format!(
            "time range start {} is after end {}",
            query.time_range.from.to_rfc3339(),
            query.time_range.to.to_rfc3339()
        )));
    }

    if query.metrics.is_empty() {
        return Err(QueryError::validation("query has no metrics"));
    }

    let time_field = resolve_time_field(query, settings)?;

    let (kind, body) = if query.is_document_query() {
        if query.metrics.iter().any(|m| !m.metric_type.is_document_query()) {
            return Err(QueryError::validation(
                "logs/raw_data metrics cannot be combined with aggregation metrics",
            ));
        }
        (RequestKind::Logs, logs_body(query, &time_field, settings))
    } else {
        validate_metrics(&query.metrics)?;
        validate_bucket_aggs(&query.bucket_aggs)?;
        (
            RequestKind::TimeSeries,
            time_series_body(query, &time_field, interval),
        )
    };

    let header = json!({
        "index": settings.database,
        "ignore_unavailable": true,
        "search_type": "query_then_fetch",
        "max_concurrent_shard_requests": settings.max_concurrent_shard_requests,
    });

    Ok(BackendRequest {
        ref_id: query.ref_id.clone(),
        index: settings.database.clone(),
        kind,
        time_field,
        interval,
        header,
        body,
        metrics: query.metrics.clone(),
        bucket_aggs: query.bucket_aggs.clone(),
        log_message_field: non_blank(settings.log_message_field.as_deref()),
        log_level_field: non_blank(settings.log_level_field.as_deref()),
    })
}

fn non_blank(field: Option<&str>) -> Option<String> {
    field
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
}

fn resolve_time_field(query: &Query, settings: &ConnectionSettings) -> Result<String, QueryError> {
    let field = query
        .time_field
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| settings.time_field.trim());

    if field.is_empty() {
        return Err(QueryError::validation("time field is not configured"));
    }
    Ok(field.to_string())
}

fn validate_metrics(metrics: &[MetricAgg]) -> Result<(), QueryError> {
    for m in metrics {
        let has_field = m.field.as_deref().is_some_and(|f| !f.trim().is_empty());
        if m.metric_type.requires_field() && !has_field {
            return Err(QueryError::validation(format!(
                "metric '{}' ({}) requires a field",
                m.id,
                m.metric_type.label()
            )));
        }
    }
    Ok(())
}

fn validate_bucket_aggs(aggs: &[BucketAgg]) -> Result<(), QueryError> {
    let histograms = aggs
        .iter()
        .filter(|b| b.agg_type == BucketAggType::DateHistogram)
        .count();

    match (histograms, aggs.last()) {
        (0, _) => {
            return Err(QueryError::validation(
                "time series query requires a date_histogram bucket aggregation",
            ))
        }
        (1, Some(last)) if last.agg_type == BucketAggType::DateHistogram => {}
        (1, _) => {
            return Err(QueryError::validation(
                "date_histogram must be the innermost bucket aggregation",
            ))
        }
        _ => {
            return Err(QueryError::validation(
                "only one date_histogram bucket aggregation is supported",
            ))
        }
    }

    for agg in aggs {
        match agg.agg_type {
            BucketAggType::Terms => {
                if !agg.field.as_deref().is_some_and(|f| !f.trim().is_empty()) {
                    return Err(QueryError::validation(format!(
                        "terms aggregation '{}' requires a field",
                        agg.id
                    )));
                }
            }
            BucketAggType::DateHistogram => {
                if let Some(raw) = agg.settings.interval.as_deref() {
                    parse_interval(raw).map_err(|e| QueryError::validation(e.to_string()))?;
                }
            }
        }
    }
    Ok(())
}

fn filter_clause(query: &Query, time_field: &str) -> Value {
    json!({
        "bool": {
            "filter": [
                time_range_filter(&query.time_range, time_field),
                {
                    "query_string": {
                        "analyze_wildcard": true,
                        "query": query.lucene_query(),
                    }
                }
            ]
        }
    })
}

fn time_range_filter(range: &TimeRange, time_field: &str) -> Value {
    let mut inner = Map::new();
    inner.insert(
        time_field.to_string(),
        json!({
            "gte": range.from_millis(),
            "lte": range.to_millis(),
            "format": "epoch_millis",
        }),
    );
    json!({ "range": inner })
}

fn logs_body(query: &Query, time_field: &str, settings: &ConnectionSettings) -> Value {
    let size = query
        .metrics
        .iter()
        .find_map(|m| m.settings.limit)
        .filter(|limit| *limit > 0)
        .unwrap_or(settings.logs_limit);

    let mut sort_field = Map::new();
    sort_field.insert(
        time_field.to_string(),
        json!({ "order": "desc", "unmapped_type": "boolean" }),
    );

    json!({
        "size": size,
        "query": filter_clause(query, time_field),
        "sort": [sort_field],
    })
}

fn time_series_body(query: &Query, time_field: &str, interval: Duration) -> Value {
    // Built innermost first: metric sub-aggs, then wrapped by each bucket agg.
    let mut inner = metric_aggs(&query.metrics);

    for agg in query.bucket_aggs.iter().rev() {
        let mut clause = Map::new();
        let agg_body = match agg.agg_type {
            BucketAggType::DateHistogram => json!({
                "field": agg.field.as_deref().filter(|f| !f.is_empty()).unwrap_or(time_field),
                "fixed_interval": format_interval(interval),
                "min_doc_count": agg.settings.min_doc_count.unwrap_or(0),
                "extended_bounds": {
                    "min": query.time_range.from_millis(),
                    "max": query.time_range.to_millis(),
                },
                "format": "epoch_millis",
            }),
            BucketAggType::Terms => json!({
                "field": agg.field,
                "size": agg.settings.size.filter(|s| *s > 0).unwrap_or(DEFAULT_TERMS_SIZE),
                "order": { "_count": "desc" },
                "min_doc_count": agg.settings.min_doc_count.unwrap_or(1),
            }),
        };
        let key = match agg.agg_type {
            BucketAggType::DateHistogram => "date_histogram",
            BucketAggType::Terms => "terms",
        };
        clause.insert(key.to_string(), agg_body);
        if !inner.is_empty() {
            clause.insert("aggs".to_string(), Value::Object(inner));
        }

        let mut wrapped = Map::new();
        wrapped.insert(agg.id.clone(), Value::Object(clause));
        inner = wrapped;
    }

    json!({
        "size": 0,
        "query": filter_clause(query, time_field),
        "aggs": inner,
    })
}

fn metric_aggs(metrics: &[MetricAgg]) -> Map<String, Value> {
    metrics
        .iter()
        .filter_map(|m| {
            let name = m.metric_type.agg_name()?;
            let mut agg = Map::new();
            agg.insert(name.to_string(), json!({ "field": m.field }));
            Some((m.id.clone(), Value::Object(agg)))
        })
        .collect()
}
