//! Small shared utilities.

mod timestamps;
mod uuid_utils;

pub use timestamps::{iso_timestamp, Timestamp};
pub use uuid_utils::generate_uuid;
