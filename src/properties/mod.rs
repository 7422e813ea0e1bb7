//! Logical and physical properties.

pub mod distribution;
pub mod logical;
pub mod ordering;
pub mod physical;

pub use distribution::Distribution;
pub use ordering::{OrderingChoice, OrderingColumn};
pub use physical::{PropertySet, RequiredProperties};
