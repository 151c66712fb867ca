//! Core type aliases and re-exports

pub use glam::{IVec3, Vec3};

/// Standard Result type for voxtree
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;

/// Logical change-tracking time, see [`crate::core::clock`]
pub type Timestamp = u32;
