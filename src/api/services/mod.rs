pub mod cache;
pub mod health;
pub mod helpers;
pub mod lookup;

pub use cache::cache_routes;
pub use health::{AppStartTime, HealthService};
pub use lookup::{json_error_config, lookup_routes};
