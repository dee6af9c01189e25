//! # OpenPermit Transport
//!
//! Transport-side building blocks for the permit bridge:
//!
//! - [`memory`]: an in-process homeserver implementing
//!   [`ChatTransport`](openpermit_core::effects::ChatTransport), used by tests
//!   and the CLI demo
//! - [`backoff`]: retry policy for transient failures during sync

#![forbid(unsafe_code)]

pub mod backoff;
pub mod memory;

pub use backoff::{Backoff, RetryDecision, RetryPolicy};
pub use memory::{CallSnapshot, MemoryFault, MemoryHomeserver, MemoryTransport};
