use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;

use super::StaticConfig;
use crate::errors::Result;

static CONFIG: OnceLock<ArcSwap<StaticConfig>> = OnceLock::new();

/// Returns the configuration if `init_config` has already run.
///
/// The Arc is cheap to clone and doesn't hold any locks.
pub fn try_get_config() -> Option<Arc<StaticConfig>> {
    CONFIG.get().map(|c| c.load_full())
}

/// Initialize the global configuration from `path` (plus environment).
///
/// Calling it again after a successful init is a no-op.
pub fn init_config(path: &str) -> Result<Arc<StaticConfig>> {
    if let Some(existing) = try_get_config() {
        return Ok(existing);
    }
    let loaded = StaticConfig::load(path)?;
    let swap = CONFIG.get_or_init(|| ArcSwap::from_pointee(loaded));
    Ok(swap.load_full())
}
