use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::cache::CacheKey;
use crate::error::QueryError;
use crate::utils::{normalize_department, parse_date};

/// Department name used when a query is not scoped to one department
pub const ALL_DEPARTMENTS: &str = "all";

/// Operation name for statistics cache keys
const STATISTICS_OPERATION: &str = "statistics";

/// A statistics lookup: one department over an inclusive date range.
///
/// Construction normalizes the input (department case and spacing, date
/// format, reversed ranges), so two queries that mean the same thing compare
/// equal and produce the same cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatisticsQuery {
    department: String,
    from: NaiveDate,
    to: NaiveDate,
}

impl StatisticsQuery {
    pub fn new(department: &str, from: NaiveDate, to: NaiveDate) -> Self {
        let department = match normalize_department(department) {
            d if d.is_empty() => ALL_DEPARTMENTS.to_string(),
            d => d,
        };
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        Self { department, from, to }
    }

    /// Build a query from raw form input.
    pub fn parse(department: &str, from: &str, to: &str) -> Result<Self, QueryError> {
        let from_date = parse_date(from).ok_or_else(|| QueryError::InvalidDate(from.to_string()))?;
        let to_date = parse_date(to).ok_or_else(|| QueryError::InvalidDate(to.to_string()))?;
        Ok(Self::new(department, from_date, to_date))
    }

    pub fn department(&self) -> &str {
        &self.department
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(
            STATISTICS_OPERATION,
            [
                ("department", self.department.clone()),
                ("from", self.from.format("%Y-%m-%d").to_string()),
                ("to", self.to.format("%Y-%m-%d").to_string()),
            ],
        )
    }
}

/// Grievance counts for one department and date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub department: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total: u32,
    pub resolved: u32,
    pub in_progress: u32,
    pub pending: u32,
    pub rejected: u32,
    pub average_resolution_days: f64,
}

impl Statistics {
    /// Grievances not yet closed
    pub fn open(&self) -> u32 {
        self.pending + self.in_progress
    }

    /// Percentage of grievances resolved, 0 when there are none.
    pub fn resolution_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.resolved) * 100.0 / f64::from(self.total)
        }
    }
}
