//! Dockroute Feed - regulatory airspace feed client
//!
//! Pulls temporary restriction updates over HTTP and turns untrusted records
//! into zones, rejecting malformed records one at a time.

pub mod client;
pub mod record;

pub use client::FeedClient;
pub use record::{parse_feed, FeedBatch, FeedPoint, FeedZone};
