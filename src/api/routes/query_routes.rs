//! Query routes (e.g., /api/v1/query)

use axum::{routing::post, Router};

use crate::api::controller::query::QueryController;
use crate::app_state::AppState;

pub fn query_routes() -> Router<AppState> {
    Router::new().route("/", post(QueryController::query_data))
}
