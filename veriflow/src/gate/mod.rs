//! Claim validation against retrieved ground truth.

mod validator;
mod verdict;

pub use validator::{GateConfig, ValidationGate};
pub use verdict::{Discrepancy, DiscrepancyKind, Verdict};
