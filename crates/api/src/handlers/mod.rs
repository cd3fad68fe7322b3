//! Request handlers.
//!
//! Each submodule provides async handler functions for one resource.
//! Handlers that write run their whole workflow inside a single
//! coordinator-managed transaction and map errors via [`AppError`].
//!
//! [`AppError`]: crate::error::AppError

pub mod auth;
