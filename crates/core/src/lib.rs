//! Shared domain types and the error taxonomy used across keygate crates.

pub mod error;
pub mod types;
