//! In-memory call cache for expensive, parameterized reads.
//!
//! This module provides the `CallCache` used by the dashboard to memoize
//! statistics lookups. Concurrent requests for the same key share a single
//! in-flight load, failures are never cached, and entries optionally expire
//! after a caller-supplied TTL measured against an injectable `Clock`.

pub mod call_cache;
pub mod clock;
pub mod key;

pub use call_cache::{CacheEntry, CallCache, EntryState, Invalidate, ResolveOptions};
pub use clock::{Clock, ManualClock, SystemClock};
pub use key::CacheKey;
