pub mod api_router;
pub mod assignments;
pub mod auth;
pub mod catalog;
pub mod certificates;
pub mod config;
pub mod enrollment;
pub mod progress;
pub mod server;
pub mod shared;
