//! Persistence layer for the dockroute server.
//!
//! SQLite-backed storage for zones, docking station inventory and deployed
//! routes. The in-memory registry and allocator stay authoritative; writes go
//! through to the database.

pub mod db;
pub mod routes;
pub mod stations;
pub mod zones;

pub use db::{init_database, Database};
