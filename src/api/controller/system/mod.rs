//! System controller: datasource health

use axum::extract::State;
use axum::Json;

use crate::api::dto::ApiResponse;
use crate::app_state::AppState;
use crate::domain::datasource::HealthStatus;
use crate::errors::AppError;

pub struct SystemController;

impl SystemController {
    pub async fn health(
        State(state): State<AppState>,
    ) -> Result<Json<ApiResponse<HealthStatus>>, AppError> {
        Ok(Json(ApiResponse::ok(state.datasource.check_health().await)))
    }
}
