//! Durable local store for FleetLink.
//!
//! Two independent SQLite-backed collections that survive process restarts:
//!
//! - **Cached entities**: full-replace upsert by id, read back in bulk to
//!   hydrate offline views.
//! - **Mutation queue**: append-only log of opaque HTTP-shaped requests,
//!   read in insertion order and emptied as a whole after a replay sweep.
//!
//! [`LocalStore`] is the synchronous store. [`SharedStore`] is the handle the
//! rest of the system uses: it opens the store lazily, shares one in-flight
//! initialisation between all callers, and runs every operation on the
//! blocking thread pool.

mod error;
mod shared;
mod store;

pub use error::{StoreError, StoreResult};
pub use shared::SharedStore;
pub use store::{LocalStore, StoreLocation};
