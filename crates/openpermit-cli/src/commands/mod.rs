//! Subcommand implementations

pub mod alias;
pub mod common;
pub mod demo;
pub mod event;
pub mod validate;
