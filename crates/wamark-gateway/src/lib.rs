//! # Wamark Gateway
//!
//! HTTP control surface over the dispatch engine: status, settings,
//! roster and group selection, start/stop, backlog passes, and the bulk
//! campaign lifecycle. JSON in, JSON out, no server-rendered UI.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, serve};
