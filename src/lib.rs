pub mod catalog;
pub mod cost;
pub mod datatypes;
pub mod error;
pub mod joins;
pub mod memo;
pub mod meta;
pub mod operators;
pub mod optimizer;
pub mod options;
pub mod plan;
pub mod properties;
pub mod rules;
pub mod statistics;
#[cfg(test)]
pub mod testing;
#[cfg(test)]
mod tests;
