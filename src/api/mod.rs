//! API server implementation
//!
//! Provides the check endpoint with SSE progress streaming and
//! liveness routes.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use server::ApiServer;
