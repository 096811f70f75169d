use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::client::response_parser::parse_msearch_response;
use crate::core::client::search_client::{SearchClient, SearchClientError};
use crate::core::settings::ConnectionSettings;
use crate::domain::query::model::{BackendRequest, DataFrame};

/// `_msearch` client for Astra / OpenSearch compatible backends.
pub struct HttpSearchClient {
    http: Client,
    settings: Arc<ConnectionSettings>,
}

impl HttpSearchClient {
    pub fn new(settings: Arc<ConnectionSettings>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self { http, settings })
    }

    fn msearch_url(&self) -> String {
        format!("{}/_msearch", self.settings.url.trim_end_matches('/'))
    }

    async fn send(&self, request: &BackendRequest) -> Result<Value, SearchClientError> {
        let url = self.msearch_url();
        let payload = request
            .to_ndjson()
            .map_err(|e| SearchClientError::Transport(format!("failed to encode request: {}", e)))?;

        debug!(ref_id = %request.ref_id, %url, "Sending search request");

        let mut builder = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(payload);

        if let Some(user) = self.settings.basic_auth_user.as_deref() {
            builder = builder.basic_auth(user, self.settings.basic_auth_password.as_deref());
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SearchClientError::Transport(format!(
                    "timed out after {}ms (url={})",
                    self.settings.timeout_ms, url
                ))
            } else {
                SearchClientError::Transport(format!("{} (url={})", e, url))
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchClientError::Status { status, body });
        }

        resp.json::<Value>()
            .await
            .map_err(|e| SearchClientError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn execute(
        &self,
        request: &BackendRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<DataFrame>, SearchClientError> {
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SearchClientError::Cancelled),
            res = self.send(request) => res?,
        };

        parse_msearch_response(request, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query::model::{Query, RequestKind};
    use crate::domain::query::service::query_builder::build_backend_request;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    #[derive(Default, Clone)]
    struct Captured {
        auth: Option<String>,
        content_type: Option<String>,
        body: String,
    }

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn logs_request(settings: &ConnectionSettings) -> BackendRequest {
        let query: Query = serde_json::from_value(json!({
            "refId": "A",
            "timeRange": { "from": "2024-05-01T12:00:00Z", "to": "2024-05-01T13:00:00Z" },
            "metrics": [{ "id": "1", "type": "logs" }]
        }))
        .unwrap();
        let request = build_backend_request(&query, Duration::from_secs(1), settings).unwrap();
        assert_eq!(request.kind, RequestKind::Logs);
        request
    }

    #[test]
    fn msearch_url_ignores_trailing_slash() {
        let settings = Arc::new(ConnectionSettings::new("http://astra:9200/"));
        let client = HttpSearchClient::new(settings).unwrap();
        assert_eq!(client.msearch_url(), "http://astra:9200/_msearch");
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        // unroutable port; the pre-cancelled token must win before any connect
        let settings = Arc::new(ConnectionSettings::new("http://127.0.0.1:9"));
        let client = HttpSearchClient::new(settings.clone()).unwrap();
        let request = logs_request(&settings);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = client.execute(&request, &cancel).await;
        assert!(matches!(result, Err(SearchClientError::Cancelled)));
    }

    #[tokio::test]
    async fn msearch_round_trip_with_basic_auth() {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let sink = captured.clone();
        let router = Router::new().route(
            "/_msearch",
            post(move |headers: HeaderMap, body: String| {
                let sink = sink.clone();
                async move {
                    let header = |name: &str| {
                        headers
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string)
                    };
                    *sink.lock().unwrap() = Captured {
                        auth: header("authorization"),
                        content_type: header("content-type"),
                        body,
                    };
                    Json(json!({ "responses": [{
                        "_shards": { "total": 3, "failed": 0 },
                        "hits": { "hits": [
                            { "_id": "x", "_source": { "_timesinceepoch": 5, "message": "hello" } }
                        ]}
                    }]}))
                }
            }),
        );
        let mut settings = ConnectionSettings::new(serve(router).await);
        settings.basic_auth_user = Some("grafana".into());
        settings.basic_auth_password = Some("secret".into());
        let settings = Arc::new(settings);
        let client = HttpSearchClient::new(settings.clone()).unwrap();

        let frames = client
            .execute(&logs_request(&settings), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].field("message").unwrap().values, vec![json!("hello")]);
        assert_eq!(frames[0].meta, Some(json!({ "shards": { "total": 3, "failed": 0 } })));

        let seen = captured.lock().unwrap().clone();
        assert_eq!(seen.auth.as_deref(), Some("Basic Z3JhZmFuYTpzZWNyZXQ="));
        assert_eq!(seen.content_type.as_deref(), Some("application/x-ndjson"));
        let lines: Vec<&str> = seen.body.lines().collect();
        assert_eq!(lines.len(), 2);
        let header: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(header["index"], "_all");
    }

    #[tokio::test]
    async fn non_success_status_is_reported_with_body() {
        let router = Router::new().route(
            "/_msearch",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "no shards available") }),
        );
        let settings = Arc::new(ConnectionSettings::new(serve(router).await));
        let client = HttpSearchClient::new(settings.clone()).unwrap();

        let err = client
            .execute(&logs_request(&settings), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            SearchClientError::Status { status, body } => {
                assert_eq!(status.as_u16(), 503);
                assert_eq!(body, "no shards available");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        // grab a free port, then close it
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let settings = Arc::new(ConnectionSettings::new(format!("http://{}", addr)));
        let client = HttpSearchClient::new(settings.clone()).unwrap();

        let err = client
            .execute(&logs_request(&settings), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SearchClientError::Transport(_)), "{:?}", err);
    }
}
