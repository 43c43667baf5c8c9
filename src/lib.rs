//! goip - IP geolocation lookup service
//!
//! Fronts several geolocation sources (MaxMind and IPIP database files,
//! remote HTTP APIs) behind one HTTP API, with a shared Redis cache in front.
//!
//! # Architecture
//! - `services`: provider adapters, the multi-provider resolver and the
//!   cache-aside lookup service
//! - `cache`: result cache stores (Redis, in-process Moka, null)
//! - `ratelimit`: per-client sliding window limiter
//! - `api`: HTTP handlers and middleware
//! - `config`: configuration loading and validation
//! - `runtime`: application lifecycle and execution modes
//! - `system`: logging and panic hook

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod errors;
pub mod models;
pub mod ratelimit;
pub mod runtime;
pub mod services;
pub mod system;
pub mod utils;
