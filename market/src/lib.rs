pub mod config;
pub mod error;
pub mod feed;
pub mod manager;
pub mod pulse;
pub mod rolling_window;
pub mod types;
