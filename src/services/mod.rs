//! Service layer for douyin-sync business logic.
//!
//! This module contains domain logic separated from UI concerns.
//! The CLI only builds a request and renders the result.

pub mod sync;

pub use sync::{SyncError, SyncRequest, SyncService};
