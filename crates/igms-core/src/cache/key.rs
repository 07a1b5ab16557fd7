use std::fmt;

use crate::utils::escape_key_component;

/// Canonical cache key: `operation?name=value&...` with parameters sorted by
/// name, so the order in which a caller supplies them never matters.
/// Repeated names are kept, ordered by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new<K, V>(operation: &str, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let params = params
            .into_iter()
            .map(|(k, v)| {
                (
                    escape_key_component(k.as_ref().trim()),
                    escape_key_component(v.as_ref().trim()),
                )
            })
            .collect();
        Self::from_parts(operation.trim(), params)
    }

    /// Canonicalize a raw query string such as
    /// `"to=2024-01-31&dept=X&from=2024-01-01"` or `"statistics?dept=X"`.
    /// Components are escaped the same way [`CacheKey::new`] escapes them.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let (operation, query) = match raw.split_once('?') {
            Some((op, q)) => (op.trim(), q),
            None if raw.contains('=') => ("", raw),
            None => (raw, ""),
        };
        let params = query
            .split('&')
            .filter(|pair| !pair.trim().is_empty())
            .map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (escape_key_component(k.trim()), escape_key_component(v.trim()))
            })
            .collect();
        Self::from_parts(operation, params)
    }

    fn from_parts(operation: &str, mut params: Vec<(String, String)>) -> Self {
        params.sort();
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        match (operation.is_empty(), query.is_empty()) {
            (_, true) => Self(operation.to_string()),
            (true, false) => Self(query),
            (false, false) => Self(format!("{}?{}", operation, query)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}
