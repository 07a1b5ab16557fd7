use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::authenticator::{AuthGrant, Authenticator};
use super::session::{decode, encode, Profile, Session};
use crate::cache::{Clock, Invalidate, SystemClock};
use crate::error::{AuthError, SessionError};
use crate::storage::SessionStorage;

/// Storage key holding the session blob
pub const DEFAULT_SESSION_KEY: &str = "igms.session";

/// Capacity of the session event channel. Views only need the latest event.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// What a reloading `set_session` does once the write has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPolicy {
    /// Ask every view to re-initialize from storage.
    #[default]
    Reload,
    /// Push the new session to subscribers in memory.
    Notify,
    /// Write only.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ReloadRequested,
    Changed(Option<Session>),
}

/// Background profile fetch started by [`SessionStore::login`].
pub struct Hydration {
    handle: JoinHandle<Result<Session, SessionError>>,
}

impl Hydration {
    /// Wait for the profile to be merged and stored.
    pub async fn wait(self) -> Result<Session, SessionError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(SessionError::Hydration(
                anyhow::Error::new(e).context("Hydration task failed"),
            )),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl std::fmt::Debug for Hydration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hydration")
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Single source of truth for the current user.
///
/// Every persisting operation touches exactly one storage key. Writes made
/// with `trigger_reload` apply the configured [`ReloadPolicy`] after the
/// write completes; views must not assume an in-memory update after a
/// non-reloading write.
///
/// Clone is cheap; clones share storage, collaborators, the write lock and
/// the event channel.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    /// Serializes every write, and the read-merge-write of hydration
    writes: Arc<Mutex<()>>,
    authenticator: Arc<dyn Authenticator>,
    clock: Arc<dyn Clock>,
    caches: Vec<Arc<dyn Invalidate>>,
    key: String,
    policy: ReloadPolicy,
    lifetime: Option<Duration>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>, authenticator: Arc<dyn Authenticator>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            storage,
            writes: Arc::new(Mutex::new(())),
            authenticator,
            clock: Arc::new(SystemClock),
            caches: Vec::new(),
            key: DEFAULT_SESSION_KEY.to_string(),
            policy: ReloadPolicy::default(),
            lifetime: None,
            events,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_reload_policy(mut self, policy: ReloadPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sessions older than `lifetime` read back as logged out.
    pub fn with_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Register a cache that `logout` must clear.
    pub fn with_cache(mut self, cache: Arc<dyn Invalidate>) -> Self {
        self.caches.push(cache);
        self
    }

    pub fn session_key(&self) -> &str {
        &self.key
    }

    pub fn reload_policy(&self) -> ReloadPolicy {
        self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Read and decode the stored session without collapsing failures.
    pub fn try_get_session(&self) -> Result<Option<Session>, SessionError> {
        let raw = match self.storage.get(&self.key).map_err(SessionError::Storage)? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let session = match decode(&raw)? {
            Some(session) => session,
            None => return Ok(None),
        };

        if let Some(lifetime) = self.lifetime {
            if session.is_expired(self.clock.now(), lifetime) {
                debug!(identifier = %session.identifier, "Stored session expired");
                return Ok(None);
            }
        }
        Ok(Some(session))
    }

    /// The current session, or `None`. Corrupt or unreadable data counts as
    /// logged out.
    pub fn get_session(&self) -> Option<Session> {
        match self.try_get_session() {
            Ok(session) => session,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Ignoring unreadable session");
                None
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.get_session().map(|s| s.is_authenticated).unwrap_or(false)
    }

    /// Store `session` (`None` clears it), then apply the reload policy if
    /// `trigger_reload` is set.
    pub fn set_session(&self, session: Option<Session>, trigger_reload: bool) -> Result<(), SessionError> {
        let _guard = self.lock_writes();
        self.write_locked(session, trigger_reload)
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        // The lock guards no data, so poisoning carries no meaning
        self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Caller must hold the write lock.
    fn write_locked(&self, session: Option<Session>, trigger_reload: bool) -> Result<(), SessionError> {
        self.storage
            .set(&self.key, &encode(session.as_ref()))
            .map_err(SessionError::Storage)?;

        match &session {
            Some(s) => debug!(identifier = %s.identifier, hydrated = s.is_hydrated(), "Session stored"),
            None => debug!("Session cleared"),
        }

        if trigger_reload {
            self.announce(session);
        }
        Ok(())
    }

    /// Clear the stored session without triggering a reload.
    pub fn clear(&self) -> Result<(), SessionError> {
        self.set_session(None, false)
    }

    fn announce(&self, session: Option<Session>) {
        let event = match self.policy {
            ReloadPolicy::Reload => SessionEvent::ReloadRequested,
            ReloadPolicy::Notify => SessionEvent::Changed(session),
            ReloadPolicy::Disabled => return,
        };
        if self.events.send(event).is_err() {
            trace!("No session subscribers");
        }
    }

    /// Two-phase login. The minimal session (token + role) is stored before
    /// this returns; the profile is fetched in the background and merged with
    /// a reloading write. Await the returned [`Hydration`] to observe it.
    pub async fn login(&self, identifier: &str, credential: &str) -> Result<Hydration, SessionError> {
        if identifier.trim().is_empty() || credential.is_empty() {
            return Err(AuthError::MissingCredentials.into());
        }

        let grant = match self.authenticator.authenticate(identifier, credential).await {
            Ok(grant) => grant,
            Err(e) => {
                warn!(identifier, error = %e, "Login rejected");
                return Err(e.into());
            }
        };

        let session = Session::new(&grant.identifier, &grant.token, grant.role, self.clock.now());
        self.set_session(Some(session.clone()), false)?;
        info!(identifier = %grant.identifier, role = ?grant.role, "Logged in");

        let store = self.clone();
        let handle = tokio::spawn(async move { store.hydrate(grant, session).await });
        Ok(Hydration { handle })
    }

    async fn hydrate(&self, grant: AuthGrant, minimal: Session) -> Result<Session, SessionError> {
        let profile = match self.authenticator.fetch_profile(&grant).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(identifier = %grant.identifier, error = %e, "Profile hydration failed, keeping minimal session");
                return Err(SessionError::Hydration(e));
            }
        };

        self.merge_if_current(&minimal, profile)
    }

    /// Merge `profile` into the stored session if it still belongs to the
    /// login that produced `minimal`. Read and write happen under one lock
    /// so a concurrent logout or login cannot be overwritten.
    fn merge_if_current(&self, minimal: &Session, profile: Profile) -> Result<Session, SessionError> {
        let _guard = self.lock_writes();
        match self.get_session() {
            Some(mut current) if current.same_login(minimal) => {
                current.merge_profile(profile);
                self.write_locked(Some(current.clone()), true)?;
                info!(identifier = %current.identifier, "Profile hydrated");
                Ok(current)
            }
            _ => {
                debug!(identifier = %minimal.identifier, "Session changed during hydration, discarding profile");
                Err(SessionError::Superseded)
            }
        }
    }

    /// Clear every registered cache, then the session, with a reload.
    pub fn logout(&self) -> Result<(), SessionError> {
        for cache in &self.caches {
            cache.invalidate_all();
        }
        let _guard = self.lock_writes();
        let identifier = self.get_session().map(|s| s.identifier);
        self.write_locked(None, true)?;
        info!(identifier = identifier.as_deref().unwrap_or("<none>"), "Logged out");
        Ok(())
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("key", &self.key)
            .field("policy", &self.policy)
            .field("lifetime", &self.lifetime)
            .field("caches", &self.caches.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
