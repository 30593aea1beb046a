//! Shared utility functions for HPS crates.

/// Date utility functions
pub mod dates {
    use crate::error::DateError;
    use chrono::NaiveDate;
    use std::fmt;

    /// Format a NaiveDate as "YYYY-MM-DD"
    pub fn format_date(date: &NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }

    /// Parse a date string in "YYYY-MM-DD" format
    pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
        Ok(NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")?)
    }

    /// An inclusive window of calendar days used to bound remote queries.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DateWindow {
        start: NaiveDate,
        end: NaiveDate,
    }

    impl DateWindow {
        /// Build a window; fails when `end` precedes `start`.
        pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateError> {
            if end < start {
                return Err(DateError(format!(
                    "window end {} is before start {}",
                    format_date(&end),
                    format_date(&start)
                )));
            }
            Ok(Self { start, end })
        }

        /// Parse a window from two "YYYY-MM-DD" strings.
        pub fn parse(start: &str, end: &str) -> anyhow::Result<Self> {
            let start = parse_date(start)?;
            let end = parse_date(end)?;
            Ok(Self::new(start, end)?)
        }

        pub fn start(&self) -> NaiveDate {
            self.start
        }

        pub fn end(&self) -> NaiveDate {
            self.end
        }

        /// First instant of the window as an RFC 3339 UTC timestamp.
        pub fn start_timestamp(&self) -> String {
            format!("{}T00:00:00Z", format_date(&self.start))
        }

        /// Last second of the window as an RFC 3339 UTC timestamp.
        pub fn end_timestamp(&self) -> String {
            format!("{}T23:59:59Z", format_date(&self.end))
        }

        /// Number of days covered, both ends included.
        pub fn num_days(&self) -> i64 {
            (self.end - self.start).num_days() + 1
        }
    }

    impl fmt::Display for DateWindow {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}..{}", format_date(&self.start), format_date(&self.end))
        }
    }

}

/// Error types
pub mod error {
    use std::fmt;

    #[derive(Debug)]
    pub struct DateError(pub String);

    impl fmt::Display for DateError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Date error: {}", self.0)
        }
    }

    impl std::error::Error for DateError {}
}
