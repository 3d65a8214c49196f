//! Meet Mux application library
//!
//! The books resource plus the bootstrap that wires it to a store and the
//! HTTP server.

pub mod bootstrap;
pub mod modules;

pub use bootstrap::{base_routes, migrate, open_store, registry, serve, WELCOME_MESSAGE};
