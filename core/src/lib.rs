pub mod admission;
pub mod api;
pub mod config;
pub mod dispatch;
pub mod network;
pub mod shutdown;
pub mod types;
pub mod utils;
