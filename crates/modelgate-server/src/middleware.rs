//! Inbound call pipeline: recovery, then authentication, then logging, then the handler.

pub mod auth;
pub mod capture;
pub mod logging;
pub mod recovery;

pub use auth::AuthConfig;
pub use capture::RequestCapture;
pub use logging::StreamOutcome;
