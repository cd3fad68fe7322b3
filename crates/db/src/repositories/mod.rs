//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods. Reads
//! accept `&PgPool`; writes accept `&mut PgSession` so they execute inside
//! the request's single transaction.

pub mod token_repo;
pub mod user_repo;

pub use token_repo::{AccessTokenRepo, RefreshTokenRepo};
pub use user_repo::UserRepo;
