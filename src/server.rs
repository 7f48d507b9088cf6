//! Read-only display surface over the summary store.

use crate::error::StoreError;
use crate::models::SummaryRecord;
use crate::outputs::html::render_page;
use crate::store::ArticleStore;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tracing::{error, instrument};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ArticleStore>,
    pub display_limit: usize,
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/summaries", get(summaries))
        .with_state(state)
}

/// Store failures on the display path become a bare 500.
struct AppError(StoreError);

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "Failed to read summaries");
        (StatusCode::INTERNAL_SERVER_ERROR, "failed to read summaries").into_response()
    }
}

#[instrument(level = "debug", skip_all)]
async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let records = state.store.latest(state.display_limit).await?;
    Ok(Html(render_page(&records)))
}

#[instrument(level = "debug", skip_all)]
async fn summaries(State(state): State<AppState>) -> Result<Json<Vec<SummaryRecord>>, AppError> {
    Ok(Json(state.store.latest(state.display_limit).await?))
}
