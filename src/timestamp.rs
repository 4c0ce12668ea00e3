use std::time::Duration;

/// Formats a duration as `HH:MM:SS.mmm`.
pub fn time_str(elapsed: Duration) -> String {
    let ms = elapsed.as_millis();
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let milliseconds = ms % 1000;

    format!(
        "{hours:0width$}:{minutes:02}:{seconds:02}.{milliseconds:03}",
        width = if hours >= 100 { 0 } else { 2 }
    )
}

/// Frames per second over `elapsed`, zero for an empty interval.
pub fn rate(frames: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { frames as f64 / secs } else { 0.0 }
}

#[test]
fn format_durations() {
    assert_eq!(time_str(Duration::from_millis(3_723_004)), "01:02:03.004");
    assert_eq!(time_str(Duration::from_secs(360_000)), "100:00:00.000");
    assert_eq!(rate(50, Duration::from_secs(2)), 25.0);
    assert_eq!(rate(50, Duration::ZERO), 0.0);
}
