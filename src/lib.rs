//! Math-safe markdown rendering for assistant chat, with a sandboxed
//! request/reply rendering channel and lazily loaded engines.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
