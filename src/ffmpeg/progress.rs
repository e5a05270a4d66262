const ELAPSED_MARKER: &str = "time=";

/// Percentage of `total_duration` reached by the `time=HH:MM:SS[.frac]` field
/// of a transcoder status line, clamped to `0..=100`.
///
/// Lines without the marker, malformed timestamps and unusable totals all
/// yield `None`; a bad line never interrupts a conversion.
pub fn parse(line: &str, total_duration: f64) -> Option<f64> {
    if !total_duration.is_finite() || total_duration <= 0.0 {
        return None;
    }
    let elapsed = elapsed_seconds(line)?;
    Some((elapsed / total_duration * 100.0).clamp(0.0, 100.0))
}

/// Seconds named by the first elapsed marker in `line`.
pub fn elapsed_seconds(line: &str) -> Option<f64> {
    let (_, rest) = line.split_once(ELAPSED_MARKER)?;
    let token = rest.split_whitespace().next()?;
    let parts: Vec<&str> = token.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;
    let elapsed = hours * 3600.0 + minutes * 60.0 + seconds;
    elapsed.is_finite().then_some(elapsed)
}
