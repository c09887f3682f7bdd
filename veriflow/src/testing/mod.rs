//! Test doubles and fixtures, usable by downstream crates as well.

mod fixtures;
mod mocks;

pub use fixtures::{damage_result_set, declining_gold_result_set};
pub use mocks::{MockCapability, MockExecutor};
