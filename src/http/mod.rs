//! HTTP surface: router, health and status endpoints, bearer auth

pub mod middleware;
pub mod routes;

pub use routes::build_router;
