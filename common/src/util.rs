use std::time::Duration;

/// Expected wall time of a sweep, assuming every run succeeds first time
pub fn estimate_runtime(points: usize, repeat: usize, per_run: Duration) -> Duration {
    let runs = points.saturating_mul(repeat);
    per_run.saturating_mul(runs.try_into().unwrap_or(u32::MAX))
}

/// `HH:MM:SS`, hours are not wrapped
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
