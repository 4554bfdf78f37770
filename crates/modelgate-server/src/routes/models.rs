use axum::{extract::State, routing::get, Json, Router};

use super::dto::ModelList;
use super::MODELS_PATH;
use crate::state::AppState;

async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    Json(ModelList {
        models: state.router.list_models(),
    })
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(MODELS_PATH, get(list_models))
        .with_state(state)
}
