//! Session and call-cache core for the IGMS grievance dashboard.
//!
//! The dashboard asks [`auth::SessionStore`] who is logged in before it
//! renders protected views, and asks [`service::StatisticsService`] for
//! statistics instead of calling the data source directly. Logging out clears
//! both.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use igms_core::api::MockStatisticsSource;
//! use igms_core::auth::{MockAuthenticator, SessionStore};
//! use igms_core::cache::CallCache;
//! use igms_core::models::StatisticsQuery;
//! use igms_core::service::StatisticsService;
//! use igms_core::storage::MemoryStorage;
//!
//! let cache = CallCache::new();
//! let stats = StatisticsService::new(Arc::new(MockStatisticsSource::default()), cache.clone());
//! let sessions = SessionStore::new(
//!     Arc::new(MemoryStorage::new()),
//!     Arc::new(MockAuthenticator::new(Duration::from_secs(1))),
//! )
//! .with_cache(Arc::new(cache));
//!
//! sessions.login("admin", "admin").await?;
//! let query = StatisticsQuery::parse("Health", "2024-01-01", "2024-01-31")?;
//! let card = stats.statistics(&query).await?;
//! println!("{} grievances", card.total);
//! sessions.logout()?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod service;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use error::{AuthError, CacheError, DecodeError, QueryError, SessionError};
