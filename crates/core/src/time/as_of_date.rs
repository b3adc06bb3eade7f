use chrono::{DateTime, FixedOffset, Local, NaiveDate, Utc};

/// The calendar date a snapshot belongs to.
///
/// An explicit `YYYY-MM-DD` wins. Otherwise `now_utc` is viewed in `offset`, or in the
/// host's local timezone when no offset is configured, and its date is taken as-is:
/// no weekend or holiday rollback, the scanner is keyed by calendar day.
pub fn resolve_as_of_date(
    as_of_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
    offset: Option<FixedOffset>,
) -> Result<NaiveDate, chrono::ParseError> {
    if let Some(s) = as_of_date_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d");
    }

    Ok(local_date(now_utc, offset))
}

/// Calendar date of `now_utc` in `offset`, or in the host's local timezone.
pub fn local_date(now_utc: DateTime<Utc>, offset: Option<FixedOffset>) -> NaiveDate {
    match offset {
        Some(offset) => now_utc.with_timezone(&offset).date_naive(),
        None => now_utc.with_timezone(&Local).date_naive(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap()
    }

    #[test]
    fn explicit_date_wins() {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
        let d = resolve_as_of_date(Some("2025-12-31"), now, Some(ist())).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
    }

    #[test]
    fn rejects_malformed_explicit_date() {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
        assert!(resolve_as_of_date(Some("05/01/2026"), now, None).is_err());
    }

    #[test]
    fn rolls_into_next_day_east_of_utc() {
        // 2026-01-05 19:00 UTC = 2026-01-06 00:30 IST
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 19, 0, 0).unwrap();
        let d = resolve_as_of_date(None, now, Some(ist())).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 1, 6).unwrap());
    }

    #[test]
    fn keeps_weekend_dates() {
        // 2026-01-03 is Saturday.
        let now = Utc.with_ymd_and_hms(2026, 1, 3, 8, 0, 0).unwrap();
        let d = resolve_as_of_date(None, now, Some(ist())).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 1, 3).unwrap());
    }
}
