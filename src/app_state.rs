use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::domain::datasource::AstraDatasource;

#[derive(Clone)]
pub struct AppState {
    pub datasource: Arc<AstraDatasource>,
    /// Cancelled on server shutdown; in-flight batches stop waiting on the backend.
    pub shutdown: CancellationToken,
}

pub fn build_app_state(config: &AppConfig, shutdown: CancellationToken) -> Result<AppState> {
    Ok(AppState {
        datasource: Arc::new(AstraDatasource::from_config(config)?),
        shutdown,
    })
}
