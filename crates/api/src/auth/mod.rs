//! Authentication primitives.
//!
//! - [`password`] -- Argon2id password hashing and verification.
//! - [`tokens`] -- dual-secret access/refresh token signing and verification.

pub mod password;
pub mod tokens;
