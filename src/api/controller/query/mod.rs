//! Query controller: decodes a batch and hands it to the datasource

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tracing::debug;

use crate::api::dto::ApiResponse;
use crate::api::util::json::to_json;
use crate::app_state::AppState;
use crate::domain::query::model::{QueryDataResponse, QueryRequest};
use crate::errors::AppError;

pub struct QueryController;

impl QueryController {
    pub async fn query_data(
        State(state): State<AppState>,
        payload: Result<Json<QueryRequest>, JsonRejection>,
    ) -> Result<Json<ApiResponse<QueryDataResponse>>, AppError> {
        let Json(request) = payload.map_err(|e| AppError::BodyParsingError(e.body_text()))?;
        debug!(queries = request.queries.len(), "Received query request");

        to_json(
            state
                .datasource
                .query_data_with_cancel(&request, state.shutdown.child_token())
                .await,
        )
    }
}
