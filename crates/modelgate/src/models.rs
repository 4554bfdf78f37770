//! Normalized, provider-agnostic shapes used everywhere inside the gateway.
//!
//! Callers send these shapes; each adapter in [`crate::providers`] translates
//! them into its provider's wire protocol and translates responses back. No
//! adapter-specific field leaks into these types: a provider quirk is always
//! expressed as a translation step, never as an extra field here.
pub mod chat;
pub mod embedding;
pub mod message;
pub mod spec;
pub mod tool;
