//! Shared helpers

mod retry;

pub use retry::{with_timeout, RetryPolicy};

/// Truncate to at most `max` chars, appending an ellipsis when cut
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
