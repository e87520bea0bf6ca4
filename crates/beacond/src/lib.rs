//! Library half of the Beacon daemon, shared by the binary and its tests.

pub mod config;
pub mod daemon;
pub mod routes;

pub use routes::build_router;
