pub mod alert_service;
pub mod cache_service;
pub mod market_service;
pub mod monitor_service;
pub mod notify_service;
