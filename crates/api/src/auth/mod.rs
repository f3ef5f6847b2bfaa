//! Authentication primitives.
//!
//! - [`jwt`] -- control-plane access-token generation and validation.

pub mod jwt;
