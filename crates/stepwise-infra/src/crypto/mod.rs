//! Cryptographic operations for Stepwise.
//!
//! - `hash`: SHA-256 hashing of template step graphs

pub mod hash;
