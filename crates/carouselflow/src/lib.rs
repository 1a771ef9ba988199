pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod generate;
pub mod jobs;

pub use config::Config;
