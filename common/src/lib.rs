//! Shared building blocks for the Aether bridge.
//!
//! Every error enum in the workspace carries an [`ErrorLocation`] so a log line
//! points straight at the construction site. The text helpers keep captured
//! output and prompt summaries within fixed character budgets.

pub mod error_location;
pub mod text;

pub use error_location::ErrorLocation;
pub use text::{TRUNCATION_MARKER, truncate_chars, truncate_with_marker};

#[cfg(test)]
mod tests;
