//! Errors and rational time shared by every other module.

/// Error type and result alias.
pub mod error;
/// Exact rational time and time ranges.
pub mod time;
