// ABOUTME: Parses media durations (itunes:duration, media:content@duration) into whole seconds.
// ABOUTME: Accepts plain seconds, clock notation with optional fraction, and unit strings like 1h30m.

/// Parses a duration into seconds.
///
/// Accepted forms: `3600`, `3600.5`, `MM:SS`, `HH:MM:SS`, `HH:MM:SS.mmm`, and unit strings such
/// as `1h30m` or `45m`. Returns `None` for anything else or for values beyond `u32`.
pub fn parse_duration_seconds(s: &str) -> Option<u32> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(secs) = s.parse::<u64>() {
        return u32::try_from(secs).ok();
    }
    if let Ok(secs) = s.parse::<f64>() {
        return (secs.is_finite() && secs >= 0.0)
            .then(|| secs.floor() as u64)
            .and_then(|secs| u32::try_from(secs).ok());
    }
    if s.contains(':') {
        return parse_clock(s);
    }

    parse_duration::parse(s)
        .ok()
        .and_then(|d| u32::try_from(d.as_secs()).ok())
}

fn parse_clock(s: &str) -> Option<u32> {
    let mut total: u64 = 0;
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    for (i, part) in parts.iter().enumerate() {
        let value: u64 = if i == parts.len() - 1 {
            // Seconds may carry a fraction.
            part.split('.').next()?.parse().ok()?
        } else {
            part.parse().ok()?
        };
        total = total.checked_mul(60)?.checked_add(value)?;
    }
    u32::try_from(total).ok()
}
