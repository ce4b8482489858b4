//! Shared library surface for the dockroute server and its tests.

pub mod api;
pub mod backoff;
pub mod config;
pub mod loops;
pub mod persistence;
pub mod state;
