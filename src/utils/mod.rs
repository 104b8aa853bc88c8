pub mod errors;
pub mod format;
pub mod ratelimit;
pub mod table;

pub use errors::{CacheError, ConfigError, FetchError, NotifyError};
pub use format::{format_amount, format_optional, format_percent};
pub use ratelimit::RateLimiter;
pub use table::Table;
