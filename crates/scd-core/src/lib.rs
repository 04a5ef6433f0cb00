//! Core types and operations for an append-only, versioned record store.
//!
//! Every change to an entity is a new immutable row with the next version
//! number; "current state" is always the highest version. Other entities refer
//! to one exact version by its row uid. Storage engines plug in through
//! [`store::VersionStore`]; this crate has no database dependency.

pub mod catalog;
pub mod chain;
pub mod controller;
pub mod descriptor;
pub mod error;
pub mod interceptor;
pub mod memory;
pub mod predicate;
pub mod repository;
pub mod resolver;
pub mod row;
pub mod store;

pub use error::{Error, ErrorKind, Result};

#[cfg(test)]
mod tests;
