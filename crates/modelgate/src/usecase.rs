//! Request orchestration shared by every transport.

pub mod chat;
pub mod embedding;

use serde::{Deserialize, Serialize};

pub use chat::ChatUseCase;
pub use embedding::EmbeddingUseCase;

/// Generation parameters injected when the caller leaves them unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationDefaults {
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// Reuse the caller's id, or mint one.
pub(crate) fn ensure_request_id(id: &mut Option<String>) {
    if id.as_deref().map_or(true, |existing| existing.trim().is_empty()) {
        *id = Some(uuid::Uuid::new_v4().to_string());
    }
}
