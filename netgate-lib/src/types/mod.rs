#![allow(unreachable_pub)]

mod error;

pub use error::{ErrorKind, LookupError};

/// The netgate `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;

/// Format a ratio as a percentage with one decimal, e.g. `87.5%`.
/// An empty denominator formats as `0.0%`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub(crate) fn percentage(part: u64, total: u64) -> String {
    if total == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", part as f64 / total as f64 * 100.0)
}
