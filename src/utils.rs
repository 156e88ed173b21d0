//! Utility functions
//!
//! **Used by**: player (logs), sim (scrubber labels)

/// Format seconds as `MM:SS` for time labels.
///
/// Minutes wrap at 60 (hours are not shown). Negative and non-finite
/// input renders as `00:00`.
pub fn format_mmss(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "00:00".to_string();
    }
    let total = seconds.floor() as u64;
    let minutes = (total / 60) % 60;
    let secs = total % 60;
    format!("{:02}:{:02}", minutes, secs)
}
