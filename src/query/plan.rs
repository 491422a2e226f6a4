//! Search planning.
//!
//! Turns the caller's `(start, end, sender, subject)` arguments into a
//! validated [`SearchSpec`]. The window is half-open: the start date is
//! included, the end date is not.
//!
//! # Examples
//!
//! - `plan_range("2025-08-11", "2025-08-13", Some("x@y.edu"), None)`
//!   → messages from `x@y.edu` dated 2025-08-11 or 2025-08-12
//! - `plan_year(2024, Some("x@y.edu"), Some("invoice"))`
//!   → `2024-01-01 ..< 2025-01-01` with a subject filter

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::error::{Result, SnapError};
use crate::model::message::MessageRecord;

/// A validated mailbox filter. Opaque to the pipeline; mailboxes interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSpec {
    /// Target sender address (trimmed, as given).
    pub sender: String,
    /// First day included.
    pub start: NaiveDate,
    /// First day excluded.
    pub end: NaiveDate,
    /// Case-insensitive subject keyword; `None` means no subject filter.
    pub subject: Option<String>,
}

/// Plan a search over `[start_date, end_date)`.
pub fn plan_range(
    start_date: &str,
    end_date: &str,
    sender: Option<&str>,
    subject_keyword: Option<&str>,
) -> Result<SearchSpec> {
    let sender = sender
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SnapError::MissingSender)?;
    let start = parse_day("start date", start_date)?;
    let end = parse_day("end date", end_date)?;

    if start >= end {
        return Err(SnapError::EmptyWindow {
            start: start_date.to_string(),
            end: end_date.to_string(),
        });
    }

    let subject = subject_keyword
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(SearchSpec {
        sender: sender.to_string(),
        start,
        end,
        subject,
    })
}

/// Plan a search over one calendar year (`<year>-01-01 ..< <year+1>-01-01`).
pub fn plan_year(
    year: i64,
    sender: Option<&str>,
    subject_keyword: Option<&str>,
) -> Result<SearchSpec> {
    if !(1000..=9998).contains(&year) {
        return Err(SnapError::InvalidYear(year));
    }
    plan_range(
        &format!("{year}-01-01"),
        &format!("{}-01-01", year + 1),
        sender,
        subject_keyword,
    )
}

/// Parse a strict `YYYY-MM-DD` date.
fn parse_day(field: &'static str, value: &str) -> Result<NaiveDate> {
    let invalid = || SnapError::InvalidDate {
        field,
        value: value.to_string(),
    };

    let bytes = value.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, &b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shape_ok {
        return Err(invalid());
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid())
}

impl SearchSpec {
    /// Gmail-style filter expression.
    ///
    /// `after:` is inclusive and `before:` exclusive in that syntax, which
    /// matches the half-open window.
    pub fn expression(&self) -> String {
        let mut expr = format!(
            "from:({}) after:{} before:{}",
            self.sender,
            self.start.format("%Y/%m/%d"),
            self.end.format("%Y/%m/%d")
        );
        if let Some(subject) = &self.subject {
            expr.push_str(&format!(" subject:({subject})"));
        }
        expr
    }

    /// Name of the container derived from the sender.
    pub fn container_name(&self, suffix: &str) -> String {
        format!("{}{}", self.sender, suffix)
    }

    /// Whether a local calendar day falls inside the window.
    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.start <= day && day < self.end
    }

    /// Whether an instant falls inside the window, judged in `offset`.
    pub fn contains(&self, date: DateTime<Utc>, offset: FixedOffset) -> bool {
        self.contains_day(date.with_timezone(&offset).date_naive())
    }

    /// Search-level match: the loose criteria a mailbox search would apply.
    ///
    /// The sender test is a case-insensitive substring over address and display
    /// name, like a web mail `from:` search. The pipeline applies the strict
    /// address comparison afterwards.
    pub fn matches(&self, message: &MessageRecord, offset: FixedOffset) -> bool {
        let sender = self.sender.to_lowercase();
        let from_ok = message.from.address.to_lowercase().contains(&sender)
            || message.from.display_name.to_lowercase().contains(&sender);
        if !from_ok || !self.contains(message.date, offset) {
            return false;
        }
        match &self.subject {
            Some(keyword) => message
                .subject
                .to_lowercase()
                .contains(&keyword.to_lowercase()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_window_is_half_open() {
        let spec = plan_range("2025-08-11", "2025-08-13", Some("x@y.edu"), None).unwrap();
        assert!(spec.contains_day(day("2025-08-11")));
        assert!(spec.contains_day(day("2025-08-12")));
        assert!(!spec.contains_day(day("2025-08-13")));
        assert!(!spec.contains_day(day("2025-08-10")));
    }

    #[test]
    fn test_plan_year_equals_range() {
        for year in [1999, 2024, 2025] {
            let a = plan_year(year, Some("x@y.edu"), Some("kw")).unwrap();
            let b = plan_range(
                &format!("{year}-01-01"),
                &format!("{}-01-01", year + 1),
                Some("x@y.edu"),
                Some("kw"),
            )
            .unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_year_excludes_next_new_year() {
        let spec = plan_year(2024, Some("x@y.edu"), None).unwrap();
        assert!(spec.contains_day(day("2024-12-31")));
        assert!(!spec.contains_day(day("2025-01-01")));
    }

    #[test]
    fn test_missing_sender() {
        assert!(matches!(
            plan_range("2025-01-01", "2025-02-01", None, None),
            Err(SnapError::MissingSender)
        ));
        assert!(matches!(
            plan_range("2025-01-01", "2025-02-01", Some("  "), None),
            Err(SnapError::MissingSender)
        ));
    }

    #[test]
    fn test_rejects_malformed_dates() {
        for bad in ["2025-8-11", "2025/08/11", "11-08-2025", "2025-08-11T00:00", "", "2025-02-30"] {
            let err = plan_range(bad, "2025-09-01", Some("x@y.edu"), None).unwrap_err();
            assert!(err.is_precondition(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_rejects_empty_window() {
        assert!(matches!(
            plan_range("2025-08-13", "2025-08-13", Some("x@y.edu"), None),
            Err(SnapError::EmptyWindow { .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_year() {
        assert!(matches!(
            plan_year(99, Some("x@y.edu"), None),
            Err(SnapError::InvalidYear(99))
        ));
        assert!(plan_year(9999, Some("x@y.edu"), None).is_err());
    }

    #[test]
    fn test_blank_subject_means_unfiltered() {
        let spec = plan_range("2025-01-01", "2025-02-01", Some("x@y.edu"), Some("   ")).unwrap();
        assert_eq!(spec.subject, None);
    }

    #[test]
    fn test_expression() {
        let spec = plan_range("2025-08-11", "2025-08-13", Some("x@y.edu"), Some("Update")).unwrap();
        assert_eq!(
            spec.expression(),
            "from:(x@y.edu) after:2025/08/11 before:2025/08/13 subject:(Update)"
        );
        let spec = plan_range("2025-08-11", "2025-08-13", Some("x@y.edu"), None).unwrap();
        assert!(!spec.expression().contains("subject:"));
    }

    #[test]
    fn test_container_name() {
        let spec = plan_year(2025, Some("x@y.edu"), None).unwrap();
        assert_eq!(spec.container_name(" Email Archive"), "x@y.edu Email Archive");
    }
}
