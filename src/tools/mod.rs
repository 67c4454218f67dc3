//! Type-safe tool argument modules.
//!
//! Each struct implements `ToolArgs` for one external program and maps Rust
//! fields to the exact flags that program expects.

pub mod account;
pub mod engine;
pub mod packages;
pub mod service;
