/// Render a duration as `[minutes:]seconds.hundredths`.
///
/// Seconds are zero-padded only when a minutes part is shown.
pub fn format_time(ms: u64) -> String {
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let hundredths = (ms % 1000) / 10;

    if minutes > 0 {
        format!("{minutes}:{seconds:02}.{hundredths:02}")
    } else {
        format!("{seconds}.{hundredths:02}")
    }
}

/// Short form used in the recent list, e.g. `12.34s`
pub fn format_seconds(ms: u64) -> String {
    format!("{:.2}s", ms as f64 / 1000.0)
}
