//! Dashboard shell state.
//!
//! Wires the session store and the cached statistics service together the
//! way the browser dashboard does: the navigation header reads the session,
//! statistic cards read through the cache, and session events re-initialize
//! the shell.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use futures::future::join_all;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use igms_core::api::{HttpStatisticsSource, MockStatisticsSource, StatisticsSource};
use igms_core::auth::{Hydration, MockAuthenticator, Session, SessionEvent, SessionStore};
use igms_core::cache::CallCache;
use igms_core::models::{Statistics, StatisticsQuery};
use igms_core::service::StatisticsService;
use igms_core::utils::truncate_string;
use igms_core::Config;

/// Departments shown as statistic cards
pub const DEPARTMENTS: &[&str] = &["Public Works", "Health", "Water Supply", "Education", "Revenue"];

/// Days covered by the default reporting window
const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Width of the department column on a card
const CARD_LABEL_WIDTH: usize = 14;

pub struct Dashboard {
    sessions: SessionStore,
    statistics: StatisticsService,
    events: broadcast::Receiver<SessionEvent>,
    /// REST backend, when configured; carries the session token
    http: Option<HttpStatisticsSource>,
    /// Session the shell was last initialized against
    current: Option<Session>,
    reloads: usize,
}

impl Dashboard {
    pub fn new(config: &Config) -> Result<Self> {
        let storage = config.open_storage().context("Failed to open session storage")?;

        let http = config
            .statistics_url
            .as_deref()
            .map(HttpStatisticsSource::new)
            .transpose()?;
        let source: Arc<dyn StatisticsSource> = match http {
            Some(ref http) => Arc::new(http.clone()),
            None => Arc::new(MockStatisticsSource::new(config.statistics_latency())),
        };
        let cache = CallCache::new().with_default_ttl(config.cache_ttl());
        let statistics = StatisticsService::new(source, cache.clone());

        let sessions = SessionStore::new(storage, Arc::new(MockAuthenticator::new(config.hydration_delay())))
            .with_session_key(config.session_key.clone())
            .with_reload_policy(config.reload_policy)
            .with_lifetime(config.session_lifetime())
            .with_cache(Arc::new(cache));
        let events = sessions.subscribe();

        let mut dashboard = Self {
            sessions,
            statistics,
            events,
            http,
            current: None,
            reloads: 0,
        };
        dashboard.initialize();
        Ok(dashboard)
    }

    /// (Re-)read the session the way a freshly loaded page does.
    fn initialize(&mut self) {
        self.current = self.sessions.get_session();
        match self.current {
            Some(ref s) => info!(identifier = %s.identifier, role = ?s.role, "Shell initialized"),
            None => info!("Shell initialized without a session"),
        }
        self.sync_token();
    }

    /// Hand the current credential token to the REST backend.
    fn sync_token(&self) {
        if let Some(ref http) = self.http {
            http.set_token(self.current.as_ref().map(|s| s.credential_token.as_str()));
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn reloads(&self) -> usize {
        self.reloads
    }

    pub fn is_authenticated(&self) -> bool {
        self.sessions.is_authenticated()
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<Hydration> {
        let hydration = self.sessions.login(username, password).await?;
        // The minimal session is readable right away; no reload happened yet
        self.current = self.sessions.get_session();
        self.sync_token();
        Ok(hydration)
    }

    pub fn logout(&mut self) -> Result<()> {
        self.sessions.logout()?;
        self.handle_events();
        Ok(())
    }

    /// Apply pending session events. Returns true if the shell re-initialized.
    pub fn handle_events(&mut self) -> bool {
        let mut reinitialized = false;
        loop {
            match self.events.try_recv() {
                Ok(SessionEvent::ReloadRequested) => {
                    debug!("Reload requested");
                    self.reloads += 1;
                    self.initialize();
                    reinitialized = true;
                }
                Ok(SessionEvent::Changed(session)) => {
                    self.current = session;
                    self.sync_token();
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed session events, re-initializing");
                    self.initialize();
                    reinitialized = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        reinitialized
    }

    pub fn header(&self) -> String {
        match self.current {
            Some(ref s) => format!("IGMS Dashboard | {} ({})", s.greeting_name(), s.role.display_name()),
            None => "IGMS Dashboard | Not logged in".to_string(),
        }
    }

    /// Load one card per department; failed cards are logged and skipped.
    pub async fn load_cards(&self, from: NaiveDate, to: NaiveDate) -> Vec<Statistics> {
        let queries: Vec<StatisticsQuery> = DEPARTMENTS
            .iter()
            .map(|dept| StatisticsQuery::new(dept, from, to))
            .collect();

        let results = join_all(queries.iter().map(|q| self.statistics.statistics(q))).await;

        results
            .into_iter()
            .filter_map(|result| match result {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!(key = e.key(), error = %e.cause(), "Statistic card failed to load");
                    None
                }
            })
            .collect()
    }

    pub fn cached_entries(&self) -> usize {
        self.statistics.cache().len()
    }
}

pub fn default_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (today - Duration::days(DEFAULT_WINDOW_DAYS - 1), today)
}

pub fn render_card(stats: &Statistics) -> String {
    format!(
        "{:<width$} total {:>4} | resolved {:>4} ({:>5.1}%) | open {:>4} | rejected {:>3} | avg {:.1}d",
        truncate_string(&stats.department, CARD_LABEL_WIDTH),
        stats.total,
        stats.resolved,
        stats.resolution_rate(),
        stats.open(),
        stats.rejected,
        stats.average_resolution_days,
        width = CARD_LABEL_WIDTH,
    )
}
