use chrono::{Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Coarse lookback window selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

impl TimeRange {
    /// Any unrecognized or missing token falls back to a month.
    pub fn from_token(token: Option<&str>) -> Self {
        match token {
            Some("day") => Self::Day,
            Some("week") => Self::Week,
            Some("year") => Self::Year,
            _ => Self::Month,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// `[today - span, today]` for the selected range.
    pub fn for_range(range: TimeRange) -> Self {
        Self::compute(range, Utc::now().date_naive())
    }

    pub fn compute(range: TimeRange, today: NaiveDate) -> Self {
        let start = match range {
            TimeRange::Day => today - Duration::days(1),
            TimeRange::Week => today - Duration::weeks(1),
            TimeRange::Month => today
                .checked_sub_months(Months::new(1))
                .unwrap_or(today),
            TimeRange::Year => today
                .checked_sub_months(Months::new(12))
                .unwrap_or(today),
        };

        Self { start, end: today }
    }

    pub fn start_str(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}
