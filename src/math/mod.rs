//! Mathematical utilities and data structures

pub mod region;
pub mod morton;

pub use region::Region;
