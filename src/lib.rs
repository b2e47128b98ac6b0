pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod permissions;
pub mod phase;
pub mod pricing;
pub mod routes;
pub mod schema;
pub mod state;
pub mod storage;
pub mod tenant;
pub mod utils;
pub mod xero;

pub use routes::create_router;
