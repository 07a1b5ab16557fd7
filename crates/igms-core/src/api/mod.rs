//! Data collaborators that supply grievance statistics.
//!
//! This module provides the `StatisticsSource` trait the call cache wraps,
//! plus two implementations:
//! - `MockStatisticsSource`: deterministic numbers with simulated latency
//! - `HttpStatisticsSource`: a REST backend reached with `reqwest`

pub mod client;
pub mod error;
pub mod mock;

pub use client::HttpStatisticsSource;
pub use error::ApiError;
pub use mock::MockStatisticsSource;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::Statistics;

#[async_trait]
pub trait StatisticsSource: Send + Sync {
    /// Aggregate grievance counts for `department` between `from` and `to`
    /// (both inclusive).
    async fn fetch_aggregate(&self, department: &str, from: NaiveDate, to: NaiveDate) -> Result<Statistics>;
}
