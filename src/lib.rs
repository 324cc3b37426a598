// Library exports for wtf.rent
// This allows integration tests and the binary to share every module

pub mod account;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod forms;
pub mod posts;
pub mod routes;
pub mod state;
pub mod users;

pub use routes::router;
