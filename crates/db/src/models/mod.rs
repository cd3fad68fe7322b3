//! Row models and insert DTOs.
//!
//! Each submodule contains a `FromRow` entity struct matching the database
//! row and a create DTO for inserts. Password hashes and token strings stay
//! inside the db/api boundary; wire-facing shapes live in `keygate-api`.

pub mod token;
pub mod user;
