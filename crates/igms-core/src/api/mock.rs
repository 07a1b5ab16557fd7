use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::StatisticsSource;
use crate::models::Statistics;
use crate::utils::normalize_department;

/// Average number of grievances filed per department per week
const WEEKLY_FILING_RANGE: std::ops::RangeInclusive<u32> = 3..=12;

/// Stand-in for the statistics backend.
///
/// The same (department, range) always yields the same numbers, so repeated
/// lookups are easy to compare.
#[derive(Debug, Default)]
pub struct MockStatisticsSource {
    latency: Duration,
    unavailable: HashSet<String>,
    calls: AtomicUsize,
}

impl MockStatisticsSource {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Make every lookup for `department` fail with a network error.
    /// Names match the way queries normalize them.
    pub fn with_unavailable(mut self, department: &str) -> Self {
        self.unavailable.insert(normalize_department(department));
        self
    }

    /// Number of `fetch_aggregate` calls received so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn seed(department: &str, from: NaiveDate, to: NaiveDate) -> u64 {
        let mut hasher = DefaultHasher::new();
        (department, from, to).hash(&mut hasher);
        hasher.finish()
    }
}

#[async_trait]
impl StatisticsSource for MockStatisticsSource {
    async fn fetch_aggregate(&self, department: &str, from: NaiveDate, to: NaiveDate) -> Result<Statistics> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        debug!(department, %from, %to, "Mock statistics request");

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.unavailable.contains(department) {
            bail!("network error: statistics service unreachable for {}", department);
        }

        let mut rng = StdRng::seed_from_u64(Self::seed(department, from, to));
        let weeks = (((to - from).num_days() + 1) as f64 / 7.0).max(1.0);
        let total = (f64::from(rng.gen_range(WEEKLY_FILING_RANGE)) * weeks).round() as u32;

        let resolved = rng.gen_range(0..=total);
        let rejected = rng.gen_range(0..=(total - resolved) / 4);
        let in_progress = rng.gen_range(0..=total - resolved - rejected);
        let pending = total - resolved - rejected - in_progress;

        Ok(Statistics {
            department: department.to_string(),
            from,
            to,
            total,
            resolved,
            in_progress,
            pending,
            rejected,
            average_resolution_days: (rng.gen_range(10..=150) as f64) / 10.0,
        })
    }
}
