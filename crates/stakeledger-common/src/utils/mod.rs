//! Utility functions and helpers

mod time;

pub use time::{current_timestamp, format_timestamp, seconds_between};
