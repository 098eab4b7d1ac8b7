//! HTTP presentation adapter.
//!
//! A thin shell over the core library: routing, request identity, and
//! translation between core results and JSON responses. The authenticated
//! user id arrives from the upstream identity provider as the `x-user-id`
//! header; nothing here authenticates.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::ApiServer;
