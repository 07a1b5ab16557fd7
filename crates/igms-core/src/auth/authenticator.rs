use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::debug;

use super::session::{Profile, Role};
use crate::error::AuthError;

/// What the authentication collaborator hands back for valid credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub identifier: String,
    pub token: String,
    pub role: Role,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, identifier: &str, credential: &str) -> Result<AuthGrant, AuthError>;

    /// Load the profile for an authenticated user. Slower than
    /// `authenticate`; the session store runs it in the background.
    async fn fetch_profile(&self, grant: &AuthGrant) -> Result<Profile>;
}

#[derive(Debug, Clone)]
struct MockAccount {
    credential: String,
    role: Role,
    profile: Profile,
}

/// Demo accounts for the dashboard. Nothing here is real authentication.
#[derive(Debug, Clone)]
pub struct MockAuthenticator {
    accounts: HashMap<String, MockAccount>,
    profile_delay: Duration,
}

impl MockAuthenticator {
    /// Authenticator with no accounts
    pub fn empty(profile_delay: Duration) -> Self {
        Self {
            accounts: HashMap::new(),
            profile_delay,
        }
    }

    /// The built-in demo accounts: `admin`, `officer` and `viewer`, each
    /// using its own name as password.
    pub fn new(profile_delay: Duration) -> Self {
        Self::empty(profile_delay)
            .with_account("admin", "admin", Role::Admin, "admin@igms.local", "Administrator")
            .with_account("officer", "officer", Role::Officer, "officer@igms.local", "Grievance Officer")
            .with_account("viewer", "viewer", Role::Viewer, "viewer@igms.local", "Guest Viewer")
    }

    pub fn with_account(
        mut self,
        identifier: &str,
        credential: &str,
        role: Role,
        email: &str,
        display_name: &str,
    ) -> Self {
        self.accounts.insert(
            identifier.to_string(),
            MockAccount {
                credential: credential.to_string(),
                role,
                profile: Profile {
                    email: Some(email.to_string()),
                    display_name: Some(display_name.to_string()),
                },
            },
        );
        self
    }

    pub fn profile_delay(&self) -> Duration {
        self.profile_delay
    }
}

#[async_trait]
impl Authenticator for MockAuthenticator {
    async fn authenticate(&self, identifier: &str, credential: &str) -> Result<AuthGrant, AuthError> {
        match self.accounts.get(identifier) {
            Some(account) if account.credential == credential => {
                debug!(identifier, role = ?account.role, "Mock credentials accepted");
                Ok(AuthGrant {
                    identifier: identifier.to_string(),
                    token: format!("igms-{:016x}", rand::random::<u64>()),
                    role: account.role,
                })
            }
            _ => Err(AuthError::InvalidCredentials(identifier.to_string())),
        }
    }

    async fn fetch_profile(&self, grant: &AuthGrant) -> Result<Profile> {
        if !self.profile_delay.is_zero() {
            tokio::time::sleep(self.profile_delay).await;
        }
        self.accounts
            .get(&grant.identifier)
            .map(|account| account.profile.clone())
            .ok_or_else(|| anyhow!("No profile for {}", grant.identifier))
    }
}
