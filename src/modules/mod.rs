//! Concrete visualiser modules shipped with the crate.

mod proptest;
mod variables;

pub use variables::{Variable, VariablesModule};
