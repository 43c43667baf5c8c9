pub mod access_log;
pub mod rate_limit;
pub mod recovery;
pub mod request_id;

pub use access_log::{AccessLogMiddleware, LookupOutcome};
pub use rate_limit::RateLimitMiddleware;
pub use recovery::RecoveryMiddleware;
pub use request_id::{RequestId, RequestIdMiddleware};
