//! Conversion between native-unit lag and canonical days (spec.md §4.1).
//!
//! Ingestion never converts: the value stored on a `PredecessorLink` is
//! whatever the source document carried. Conversion to/from days is a pure
//! function used only at display time or when the CPM engine builds its
//! graph.

/// Days represented by one unit of the given lag format. Unknown codes
/// default to days (1.0), matching the codec's tolerance rule.
fn days_per_unit(lag_format: i32) -> f64 {
    match lag_format {
        3 => 1.0 / 480.0,  // working minutes
        4 => 1.0 / 1440.0, // elapsed minutes
        5 => 1.0 / 8.0,    // working hours
        6 => 1.0 / 24.0,   // elapsed hours
        7 => 1.0,          // working days
        8 => 1.0,          // elapsed days
        9 => 5.0,          // working weeks
        10 => 7.0,         // elapsed weeks
        11 => 20.0,        // working months
        12 => 30.0,        // elapsed months
        _ => 1.0,
    }
}

/// Convert a native-unit lag value into canonical days.
pub fn to_days(lag: i64, lag_format: i32) -> f64 {
    lag as f64 * days_per_unit(lag_format)
}

/// Convert a canonical-days lag value back into the native unit, rounding
/// to the nearest integer (native lag is always a whole number on the wire).
pub fn from_days(days: f64, lag_format: i32) -> i64 {
    let per_unit = days_per_unit(lag_format);
    (days / per_unit).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_lag_working_days_is_zero_not_48000() {
        assert_eq!(to_days(0, 7), 0.0);
        assert_eq!(from_days(0.0, 7), 0);
    }

    #[test]
    fn working_days_round_trip() {
        assert_eq!(to_days(5, 7), 5.0);
        assert_eq!(from_days(5.0, 7), 5);
    }

    #[test]
    fn unknown_format_defaults_to_days() {
        assert_eq!(to_days(3, 99), 3.0);
    }

    #[test]
    fn negative_lag_is_preserved() {
        assert_eq!(to_days(-2, 7), -2.0);
        assert_eq!(from_days(-2.0, 7), -2);
    }

    #[test]
    fn round_trip_all_formats() {
        for format in 3..=12 {
            for lag in [-100_i64, -1, 0, 1, 100] {
                let once = to_days(lag, format);
                let twice = to_days(from_days(once, format), format);
                assert!((once - twice).abs() < 1e-9, "format {format} lag {lag}");
            }
        }
    }
}
