//! Typed claims and the pattern-based extractor that produces them.

mod extract;
mod model;

pub use extract::ClaimExtractor;
pub use model::{Claim, ClaimKind, Span, TrendDirection};
