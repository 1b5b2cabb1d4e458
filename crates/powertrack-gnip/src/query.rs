//! Rule and date helpers shared by historical and search requests

use chrono::{NaiveDate, NaiveDateTime};

/// Clause appended to every rule so only located tweets come back
pub const GEO_FILTER: &str = "(has:geo OR has:profile_geo)";

/// Compact timestamp format used in request bodies (`201503011000`)
pub const GNIP_DATE_FORMAT: &str = "%Y%m%d%H%M";

/// Restrict a rule to tweets carrying an exact or profile location
pub fn geo_rule(rule: &str) -> String {
    format!("({rule}) {GEO_FILTER}")
}

pub fn format_date(date: &NaiveDateTime) -> String {
    date.format(GNIP_DATE_FORMAT).to_string()
}

/// Parse a user-supplied date: `YYYY-MM-DD`, `YYYY-MM-DD HH:MM`,
/// `YYYY-MM-DDTHH:MM[:SS]` or the compact `YYYYMMDDHHMM`.
pub fn parse_date(input: &str) -> anyhow::Result<NaiveDateTime> {
    let input = input.trim();
    const TIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        GNIP_DATE_FORMAT,
    ];
    for fmt in TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, fmt) {
            return Ok(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt);
        }
    }
    anyhow::bail!("invalid date '{input}' (expected YYYY-MM-DD[THH:MM] or YYYYMMDDHHMM)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_wrapped_with_geo_filter() {
        assert_eq!(
            geo_rule("madrid OR barcelona"),
            "(madrid OR barcelona) (has:geo OR has:profile_geo)"
        );
    }

    #[test]
    fn compact_date_format() {
        let dt = parse_date("2015-03-01T10:05").unwrap();
        assert_eq!(format_date(&dt), "201503011005");
    }

    #[test]
    fn accepted_date_inputs() {
        let expected = parse_date("2015-03-01T00:00:00").unwrap();
        for input in ["2015-03-01", "2015-03-01 00:00", "201503010000", " 2015-03-01T00:00 "] {
            assert_eq!(parse_date(input).unwrap(), expected, "{input}");
        }
    }

    #[test]
    fn garbage_date_rejected() {
        assert!(parse_date("yesterday").is_err());
        assert!(parse_date("2015-13-01").is_err());
    }
}
