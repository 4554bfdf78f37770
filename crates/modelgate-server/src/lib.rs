//! HTTP front end of the modelgate LLM gateway.

pub mod api_error;
pub mod configuration;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

pub use state::AppState;

/// The full application: routes behind recovery, authentication and logging,
/// applied in that order from the outside in.
pub fn app(state: AppState) -> Router {
    let auth = state.auth.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::configure(state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::recovery::layer())
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    middleware::auth::require_secret,
                ))
                .layer(axum::middleware::from_fn(middleware::logging::log_call)),
        )
        .layer(cors)
}
