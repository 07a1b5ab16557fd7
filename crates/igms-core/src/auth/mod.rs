//! Authentication module for managing the dashboard session.
//!
//! This module provides:
//! - `Session`: the persisted identity, with explicit encode/decode
//! - `SessionStore`: get/set/clear, two-phase login, logout
//! - `Authenticator`: the authentication collaborator, with a mock for demos
//!
//! The session lives under one key of a `SessionStorage` medium and survives
//! reloads of the dashboard.

pub mod authenticator;
pub mod session;
pub mod store;

pub use authenticator::{AuthGrant, Authenticator, MockAuthenticator};
pub use session::{decode, encode, Profile, Role, Session, NO_SESSION};
pub use store::{Hydration, ReloadPolicy, SessionEvent, SessionStore, DEFAULT_SESSION_KEY};
