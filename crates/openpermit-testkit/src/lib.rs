//! OpenPermit Testing Infrastructure
//!
//! Recording collaborators, canned shape sets and memory homeserver setups
//! shared by the workspace's tests.
//!
//! ```toml
//! [dev-dependencies]
//! openpermit-testkit = { path = "../openpermit-testkit" }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
