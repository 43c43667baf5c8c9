//! Service layer for business logic
//!
//! - `geoip`: provider adapters and the multi-provider resolver
//! - `lookup_service`: cache-aside lookup pipeline used by the HTTP handlers

pub mod geoip;
mod lookup_service;

pub use geoip::{GeoIpLookup, MultiProviderResolver, ProviderEntry};
pub use lookup_service::{BATCH_CONCURRENCY, LookupService};
