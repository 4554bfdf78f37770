pub mod anthropic;
pub mod base;
pub mod configs;
pub mod deepseek;
pub mod factory;
pub mod google;
pub mod internal;
pub mod openai;
pub mod openai_compat;
pub mod streaming;
pub mod utils;
