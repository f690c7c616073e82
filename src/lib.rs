pub mod api_error;
pub mod config;
pub mod db;
pub mod http;
pub mod models;
pub mod service;
pub mod store;
pub mod telemetry;
