pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod external;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
