//! Datetime cells: template-driven validation and epoch-second conversion
//!
//! A template uses strftime specifiers. Before parsing, the text must match
//! a regex derived from the template, so `%m`/`%d` accept one or two digits
//! while `%H`/`%M`/`%S` require exactly two.

use crate::error::CastError;
use crate::table::RawCell;
use crate::value::Value;
use chrono::format::{parse, Parsed, StrftimeItems};
use chrono::{Local, NaiveDateTime, TimeZone};
use regex::Regex;

/// Template used when a field carries no `DateFormat:` tag
pub const DEFAULT_DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Anchored regex accepting text shaped like `template`
pub fn template_regex(template: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::from("^");
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            if let Some(spec) = chars.next() {
                match spec {
                    'Y' => pattern.push_str(r"\d{4}"),
                    'm' | 'd' => pattern.push_str(r"\d{1,2}"),
                    'H' | 'M' | 'S' => pattern.push_str(r"\d{2}"),
                    other => pattern.push_str(&regex::escape(&format!("%{other}"))),
                }
                continue;
            }
        }
        pattern.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
    }
    pattern.push('$');
    Regex::new(&pattern)
}

/// Cast a cell to epoch seconds. Non-text, non-date cells become 0.
pub(crate) fn cast_datetime(cell: &RawCell, template: &str) -> Result<Value, CastError> {
    match cell {
        RawCell::DateTime(dt) => local_timestamp(dt)
            .map(Value::DateTime)
            .ok_or_else(|| CastError::cast(cell, "datetime", "time does not exist locally")),
        RawCell::Text(text) => parse_text(cell, text.trim(), template),
        _ => Ok(Value::DateTime(0)),
    }
}

fn parse_text(cell: &RawCell, text: &str, template: &str) -> Result<Value, CastError> {
    let fail = |reason: String| CastError::cast(cell, "datetime", reason);

    let shape = template_regex(template)
        .map_err(|e| fail(format!("invalid date format '{template}': {e}")))?;
    if !shape.is_match(text) {
        return Err(fail(format!("expected format '{template}'")));
    }

    let mut parsed = Parsed::new();
    parse(&mut parsed, text, StrftimeItems::new(template))
        .map_err(|e| fail(format!("invalid date: {e}")))?;
    let date = parsed
        .to_naive_date()
        .map_err(|e| fail(format!("invalid date: {e}")))?;
    let time = parsed.to_naive_time().unwrap_or_default();

    local_timestamp(&date.and_time(time))
        .map(Value::DateTime)
        .ok_or_else(|| fail("time does not exist locally".to_string()))
}

fn local_timestamp(naive: &NaiveDateTime) -> Option<i64> {
    Local
        .from_local_datetime(naive)
        .earliest()
        .map(|dt| dt.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn text(s: &str) -> RawCell {
        RawCell::Text(s.to_string())
    }

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> i64 {
        Local
            .with_ymd_and_hms(y, m, d, h, min, s)
            .earliest()
            .unwrap()
            .timestamp()
    }

    #[test]
    fn test_template_regex() {
        let re = template_regex("%Y/%m/%d").unwrap();
        assert!(re.is_match("2024/3/5"));
        assert!(re.is_match("2024/03/05"));
        assert!(!re.is_match("2024-03-05"));
        assert!(!re.is_match("24/3/5"));

        let re = template_regex(DEFAULT_DATE_FORMAT).unwrap();
        assert!(re.is_match("2024/3/5 08:00:00"));
        assert!(!re.is_match("2024/3/5 8:00:00"));
    }

    #[test]
    fn test_template_escapes_literals() {
        let re = template_regex("%Y.%m.%d").unwrap();
        assert!(re.is_match("2024.1.2"));
        assert!(!re.is_match("2024x1x2"));
    }

    #[test]
    fn test_short_month_and_day() {
        assert_eq!(
            cast_datetime(&text("2024/3/5"), "%Y/%m/%d"),
            Ok(Value::DateTime(local(2024, 3, 5, 0, 0, 0)))
        );
    }

    #[test]
    fn test_default_template() {
        assert_eq!(
            cast_datetime(&text("2024/12/31 23:59:58"), DEFAULT_DATE_FORMAT),
            Ok(Value::DateTime(local(2024, 12, 31, 23, 59, 58)))
        );
    }

    #[test]
    fn test_calendar_invalid_date_fails() {
        assert!(cast_datetime(&text("2024/13/5"), "%Y/%m/%d").is_err());
        assert!(cast_datetime(&text("2023/2/29"), "%Y/%m/%d").is_err());
    }

    #[test]
    fn test_shape_mismatch_fails() {
        let err = cast_datetime(&text("2024-03-05"), "%Y/%m/%d").unwrap_err();
        assert!(err.to_string().contains("%Y/%m/%d"));
    }

    #[test]
    fn test_non_text_cells() {
        assert_eq!(cast_datetime(&RawCell::Number(5.0), "%Y"), Ok(Value::DateTime(0)));
        assert_eq!(cast_datetime(&RawCell::Bool(true), "%Y"), Ok(Value::DateTime(0)));

        let dt = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        assert_eq!(
            cast_datetime(&RawCell::DateTime(dt), DEFAULT_DATE_FORMAT),
            Ok(Value::DateTime(local(2024, 3, 5, 12, 30, 0)))
        );
    }
}
