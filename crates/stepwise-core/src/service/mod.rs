//! Infrastructure-facing service traits.

pub mod hash;
