//! Cached statistics lookups for the dashboard cards.

use std::sync::Arc;

use tracing::debug;

use crate::api::StatisticsSource;
use crate::cache::{CacheKey, CallCache, ResolveOptions};
use crate::error::CacheError;
use crate::models::{Statistics, StatisticsQuery};

/// Cards ask this service for statistics instead of calling the data source,
/// so re-renders with the same (department, range) share one request.
#[derive(Clone)]
pub struct StatisticsService {
    source: Arc<dyn StatisticsSource>,
    cache: CallCache<CacheKey, Statistics>,
}

impl StatisticsService {
    pub fn new(source: Arc<dyn StatisticsSource>, cache: CallCache<CacheKey, Statistics>) -> Self {
        Self { source, cache }
    }

    pub fn cache(&self) -> &CallCache<CacheKey, Statistics> {
        &self.cache
    }

    pub async fn statistics(&self, query: &StatisticsQuery) -> Result<Statistics, CacheError> {
        self.statistics_with(query, ResolveOptions::default()).await
    }

    pub async fn statistics_with(
        &self,
        query: &StatisticsQuery,
        options: ResolveOptions,
    ) -> Result<Statistics, CacheError> {
        let key = query.cache_key();
        let source = Arc::clone(&self.source);
        let query = query.clone();

        debug!(key = %key, "Statistics requested");
        self.cache
            .resolve(
                key,
                move || async move {
                    source
                        .fetch_aggregate(query.department(), query.from(), query.to())
                        .await
                },
                options,
            )
            .await
    }

    pub fn invalidate(&self, query: &StatisticsQuery) -> bool {
        self.cache.invalidate(&query.cache_key())
    }

    /// Drop every cached statistic, e.g. after a grievance was filed or closed.
    pub fn clear(&self) {
        self.cache.clear();
    }
}
