//! Huddle Shared Types and Utilities
//!
//! Domain types, errors, and database helpers shared by the Huddle crates.

pub mod db;
pub mod error;
pub mod types;

pub use db::*;
pub use error::*;
pub use types::*;
