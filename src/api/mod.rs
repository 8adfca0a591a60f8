//! Ledger HTTP API
//!
//! JSON surface over the ledger core for the external web layer. Caller
//! identity arrives in request headers and is trusted as given.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{build_app, ApiServer};
