//! Execution modes
//!
//! - `server`: HTTP server (default)
//! - `cli`: configuration helpers (`generate-config`, `check-config`)

pub mod cli;
pub mod server;

pub use cli::{check_config, generate_config};
pub use server::run_server;
