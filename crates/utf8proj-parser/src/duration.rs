//! ISO-8601 task duration codec (spec.md §4.2): `PT<H>H<M>M<S>S`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DurationError {
    #[error("invalid duration format '{0}'")]
    InvalidFormat(String),
}

/// Parse `PT<H>H<M>M<S>S` into total hours, treated against an 8-hour
/// working day by callers that need days.
pub fn parse_hours(input: &str) -> Result<f64, DurationError> {
    let rest = input
        .strip_prefix("PT")
        .ok_or_else(|| DurationError::InvalidFormat(input.to_string()))?;

    let (hours_str, rest) = split_component(rest, 'H')
        .ok_or_else(|| DurationError::InvalidFormat(input.to_string()))?;
    let (minutes_str, rest) = split_component(rest, 'M')
        .ok_or_else(|| DurationError::InvalidFormat(input.to_string()))?;
    let (seconds_str, rest) = split_component(rest, 'S')
        .ok_or_else(|| DurationError::InvalidFormat(input.to_string()))?;

    if !rest.is_empty() {
        return Err(DurationError::InvalidFormat(input.to_string()));
    }

    let hours: f64 = parse_non_negative(hours_str, input)?;
    let minutes: f64 = parse_non_negative(minutes_str, input)?;
    let seconds: f64 = parse_non_negative(seconds_str, input)?;

    Ok(hours + minutes / 60.0 + seconds / 3600.0)
}

fn split_component(input: &str, marker: char) -> Option<(&str, &str)> {
    let idx = input.find(marker)?;
    Some((&input[..idx], &input[idx + marker.len_utf8()..]))
}

fn parse_non_negative(s: &str, original: &str) -> Result<f64, DurationError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DurationError::InvalidFormat(original.to_string()));
    }
    s.parse::<f64>()
        .map_err(|_| DurationError::InvalidFormat(original.to_string()))
}

/// Render total hours back into canonical `PT<H>H0M0S` form: seconds always
/// zero, minutes typically zero (spec.md §4.2).
pub fn render_hours(hours: f64) -> String {
    let whole_hours = hours.round() as i64;
    format!("PT{whole_hours}H0M0S")
}

/// Convert total hours to canonical days using the fixed 8-hour workday.
pub fn hours_to_days(hours: f64) -> f64 {
    hours / 8.0
}

/// Convert canonical days to total hours using the fixed 8-hour workday.
pub fn days_to_hours(days: f64) -> f64 {
    days * 8.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_duration() {
        assert_eq!(parse_hours("PT8H0M0S").unwrap(), 8.0);
        assert_eq!(parse_hours("PT0H0M0S").unwrap(), 0.0);
        assert_eq!(parse_hours("PT1H30M0S").unwrap(), 1.5);
    }

    #[test]
    fn rejects_malformed_duration() {
        assert!(parse_hours("8H").is_err());
        assert!(parse_hours("PT8H").is_err());
        assert!(parse_hours("PTxH0M0S").is_err());
        assert!(parse_hours("").is_err());
    }

    #[test]
    fn renders_canonical_shape() {
        assert_eq!(render_hours(8.0), "PT8H0M0S");
        assert_eq!(render_hours(0.0), "PT0H0M0S");
    }

    #[test]
    fn milestone_zero_duration_round_trips() {
        let hours = parse_hours("PT0H0M0S").unwrap();
        assert_eq!(render_hours(hours), "PT0H0M0S");
    }

    #[test]
    fn day_hour_conversion_uses_eight_hour_day() {
        assert_eq!(hours_to_days(8.0), 1.0);
        assert_eq!(days_to_hours(1.0), 8.0);
    }
}
