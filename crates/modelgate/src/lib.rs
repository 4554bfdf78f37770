//! A provider-agnostic chat and embedding gateway.
//!
//! Requests arrive in one normalized shape, are routed by model id to a
//! provider adapter, translated to that provider's wire format, and the
//! answers are translated back.

pub mod context;
pub mod errors;
pub mod models;
pub mod providers;
pub mod router;
pub mod usecase;

pub use context::CallContext;
pub use errors::{ErrorKind, GatewayError, GatewayResult};
pub use router::ModelRouter;
