//! Background loops.

pub mod feed_sync_loop;
