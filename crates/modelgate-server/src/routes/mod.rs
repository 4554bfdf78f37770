pub mod chat;
pub mod dto;
pub mod embed;
pub mod health;
pub mod models;

use axum::Router;

use crate::state::AppState;

pub const CHAT_PATH: &str = "/v1/chat";
pub const CHAT_STREAM_PATH: &str = "/v1/chat/stream";
pub const EMBED_PATH: &str = "/v1/embed";
pub const MODELS_PATH: &str = "/v1/models";
pub const HEALTH_PATH: &str = "/health";

/// Operation name recorded in logs for a route path.
pub fn operation_name(path: &str) -> &'static str {
    match path {
        CHAT_PATH => "Chat",
        CHAT_STREAM_PATH => "ChatStream",
        EMBED_PATH => "Embed",
        MODELS_PATH => "ListModels",
        HEALTH_PATH => "Health",
        _ => "Unknown",
    }
}

pub fn is_streaming(operation: &str) -> bool {
    operation == "ChatStream"
}

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(chat::routes(state.clone()))
        .merge(embed::routes(state.clone()))
        .merge(models::routes(state))
        .merge(health::routes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names() {
        assert_eq!(operation_name("/v1/chat"), "Chat");
        assert_eq!(operation_name("/v1/chat/stream"), "ChatStream");
        assert_eq!(operation_name("/v1/models"), "ListModels");
        assert_eq!(operation_name("/nope"), "Unknown");
        assert!(is_streaming(operation_name(CHAT_STREAM_PATH)));
        assert!(!is_streaming(operation_name(CHAT_PATH)));
    }
}
