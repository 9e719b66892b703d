pub mod api;
pub mod config;
pub mod core_state;
pub mod db;
pub mod models;
pub mod report;
pub mod workflow;
