use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use validator::Validate;

use crate::config::AppConfig;
use crate::core::client::http_search_client::HttpSearchClient;
use crate::core::client::search_client::SearchClient;
use crate::core::settings::ConnectionSettings;
use crate::domain::datasource::health::HealthStatus;
use crate::domain::query::error::DispatchError;
use crate::domain::query::model::{QueryDataResponse, QueryRequest};
use crate::domain::query::service::dispatcher::{DispatchLimits, Dispatcher};
use crate::domain::query::service::interval_calculator::IntervalCalculator;

/// One configured datasource: its settings, interval rules and backend client.
///
/// Each instance owns its own calculator; nothing is process-global.
pub struct AstraDatasource {
    settings: Arc<ConnectionSettings>,
    dispatcher: Dispatcher,
}

impl AstraDatasource {
    pub fn new(
        settings: ConnectionSettings,
        calculator: IntervalCalculator,
        limits: DispatchLimits,
        client: Arc<dyn SearchClient>,
    ) -> Self {
        let settings = Arc::new(settings);
        let dispatcher = Dispatcher::new(client, calculator, settings.clone(), limits);
        Self {
            settings,
            dispatcher,
        }
    }

    /// Build with the HTTP `_msearch` client.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let settings = Arc::new(config.connection.clone());
        let client = Arc::new(HttpSearchClient::new(settings.clone())?);
        let calculator = config.query.interval_calculator();
        let limits = config.query.dispatch_limits();

        info!(
            url = %settings.url,
            database = %settings.database,
            min_interval = ?calculator.min_interval(),
            target_points = calculator.target_points(),
            max_concurrent_queries = limits.max_concurrent_queries,
            "Datasource instance created"
        );

        Ok(Self {
            dispatcher: Dispatcher::new(client, calculator, settings.clone(), limits),
            settings,
        })
    }

    pub async fn query_data(&self, request: &QueryRequest) -> Result<QueryDataResponse, DispatchError> {
        self.dispatcher.dispatch(request).await
    }

    pub async fn query_data_with_cancel(
        &self,
        request: &QueryRequest,
        cancel: CancellationToken,
    ) -> Result<QueryDataResponse, DispatchError> {
        self.dispatcher.dispatch_with_cancel(request, cancel).await
    }

    /// Instances built through `new` skip config validation, so settings are
    /// checked here.
    pub async fn check_health(&self) -> HealthStatus {
        match self.settings.validate() {
            Ok(()) => HealthStatus::ok("plugin is running"),
            Err(e) => {
                warn!("Datasource settings are invalid: {}", e);
                HealthStatus::error(format!("invalid datasource settings: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::search_client::SearchClientError;
    use crate::domain::datasource::health::HealthState;
    use crate::domain::query::model::{BackendRequest, DataFrame, Query};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingClient {
        indices: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SearchClient for RecordingClient {
        async fn execute(
            &self,
            request: &BackendRequest,
            _cancel: &CancellationToken,
        ) -> Result<Vec<DataFrame>, SearchClientError> {
            self.indices.lock().unwrap().push(request.index.clone());
            Ok(vec![])
        }
    }

    fn query(ref_id: &str) -> Query {
        serde_json::from_value(json!({
            "refId": ref_id,
            "timeRange": { "from": "2024-05-01T12:00:00Z", "to": "2024-05-01T13:00:00Z" },
            "metrics": [{ "id": "1", "type": "logs" }],
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn health_reports_running() {
        let ds = AstraDatasource::from_config(&AppConfig::default()).unwrap();
        let health = ds.check_health().await;
        assert_eq!(health.status, HealthState::Ok);
        assert_eq!(health.message, "plugin is running");
    }

    #[tokio::test]
    async fn health_reports_invalid_settings() {
        let ds = AstraDatasource::new(
            ConnectionSettings::new("not a url"),
            IntervalCalculator::default(),
            DispatchLimits::default(),
            Arc::new(RecordingClient::default()),
        );
        let health = ds.check_health().await;
        assert_eq!(health.status, HealthState::Error);
        assert!(health.message.contains("url"), "{}", health.message);
    }

    #[tokio::test]
    async fn cancelled_token_cancels_queries() {
        let ds = AstraDatasource::new(
            ConnectionSettings::default(),
            IntervalCalculator::default(),
            DispatchLimits::default(),
            Arc::new(RecordingClient::default()),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let resp = ds
            .query_data_with_cancel(&QueryRequest::new(vec![query("A")]), cancel)
            .await
            .unwrap();

        assert_eq!(
            resp.get("A").unwrap().status(),
            crate::domain::query::model::QueryStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn queries_use_instance_settings() {
        let client = Arc::new(RecordingClient::default());
        let mut settings = ConnectionSettings::default();
        settings.database = "logs-prod".into();
        let ds = AstraDatasource::new(
            settings,
            IntervalCalculator::new(Duration::from_secs(1), 120),
            DispatchLimits::default(),
            client.clone(),
        );

        let resp = ds
            .query_data(&QueryRequest::new(vec![query("A"), query("B")]))
            .await
            .unwrap();

        assert_eq!(resp.len(), 2);
        assert_eq!(*client.indices.lock().unwrap(), vec!["logs-prod", "logs-prod"]);
    }

    #[tokio::test]
    async fn empty_request_is_rejected() {
        let ds = AstraDatasource::new(
            ConnectionSettings::default(),
            IntervalCalculator::default(),
            DispatchLimits::default(),
            Arc::new(RecordingClient::default()),
        );
        let err = ds.query_data(&QueryRequest::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "bad request: query contains no queries");
    }
}
