pub mod config;
pub mod error;
pub mod http;
pub mod limiter;
pub mod logging;
