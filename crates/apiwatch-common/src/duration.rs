use std::time::Duration;

/// Parses a human duration string of the form `500ms`, `30s`, `5m`, `2h`
/// or `1d`. A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let value: f64 = num
        .parse()
        .map_err(|_| format!("invalid duration value in '{s}'"))?;

    let secs = match unit {
        "ms" => value / 1000.0,
        "" | "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        "d" => value * 86400.0,
        other => return Err(format!("unknown duration unit '{other}' in '{s}'")),
    };

    if secs < 0.0 {
        return Err(format!("negative duration '{s}'"));
    }
    Ok(Duration::from_secs_f64(secs))
}
