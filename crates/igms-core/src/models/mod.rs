//! Data models for dashboard statistics.
//!
//! - `StatisticsQuery`: normalized department + date range lookup
//! - `Statistics`: grievance counts rendered by the statistic cards

pub mod statistics;

pub use statistics::{Statistics, StatisticsQuery, ALL_DEPARTMENTS};
