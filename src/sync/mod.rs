//! Cross-instance synchronization
//!
//! A project may delegate authority over its environments and resources to a
//! remote peer. Reads from the peer take precedence over local state; pull and
//! push are explicit, one-directional, last-writer-wins copies.

pub mod client;

pub use client::{SyncClient, SyncTimeouts};
