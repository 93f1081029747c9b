//! Utility functions for id generation and timestamp handling.

pub mod timestamps;
mod uuid_utils;

pub use timestamps::{duration_ms, iso_timestamp, now_utc, Timestamp};
pub use uuid_utils::generate_uuid_v7;
