//! Inode-keyed file expiry scheduler.
//!
//! This crate schedules a single deferred "delete this file" action per file
//! on an external job queue (`at`/`atq`/`atrm` by default):
//! - Jobs are keyed by `(path, inode)`, so a file replaced at the same path
//!   is never deleted by a job written for its predecessor
//! - The queue is the only source of truth; nothing is cached between calls
//! - Scheduling replaces any existing expiry (cancel, then submit)
//! - The queue is an injected [`QueueBackend`], with [`MemoryQueue`] for tests

mod at;
mod error;
mod identity;
mod marker;
mod memory;
mod queue;
mod reap;
mod request;
mod scheduler;

pub use at::{AtQueue, AtQueueConfig};
pub use error::{ExpiryError, QueueError};
pub use identity::FileIdentity;
pub use marker::{DEFAULT_HELPER, Marker, MarkerEncoder};
pub use memory::MemoryQueue;
pub use queue::{JobId, QueueBackend, QueueEntry, parse_atq_line, parse_atq_listing};
pub use reap::{ReapOutcome, reap_if_inode_matches};
pub use request::{ExpiryPreset, ExpiryRequest};
pub use scheduler::{ExpiryScheduler, ExpiryStatus};
