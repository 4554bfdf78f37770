use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use modelgate::models::embedding::{EmbedRequest, EmbedResponse};
use tokio_util::sync::CancellationToken;

use super::dto::parse_json;
use super::EMBED_PATH;
use crate::api_error::ApiError;
use crate::state::AppState;

async fn embed_handler(
    State(state): State<AppState>,
    payload: Result<Json<EmbedRequest>, JsonRejection>,
) -> Result<Json<EmbedResponse>, ApiError> {
    let request = parse_json(payload)?;
    let ctx = state.call_context(CancellationToken::new());

    let response = state.embedding.embed(&ctx, request).await?;
    Ok(Json(response))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(EMBED_PATH, post(embed_handler))
        .with_state(state)
}
