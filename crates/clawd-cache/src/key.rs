//! Deterministic cache keys.

use clawd_store::StoreKeys;
use std::collections::BTreeMap;
use std::fmt::Display;

/// Builds the key a memoized call is stored under.
///
/// Positional arguments keep their order. Keyword arguments are rendered as
/// `name=value` and sorted by name, so the order they were supplied in does
/// not matter. All parts are joined with `:` and placed under `cache:`.
///
/// ```
/// use clawd_cache::CacheKey;
///
/// let key = CacheKey::new("weather").arg("Berlin").kwarg("units", "metric");
/// assert_eq!(key.build(), "cache:weather:Berlin:units=metric");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    prefix: String,
    args: Vec<String>,
    kwargs: BTreeMap<String, String>,
}

impl CacheKey {
    /// Starts a key with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl Display) -> Self {
        self.args.push(value.to_string());
        self
    }

    /// Sets a keyword argument. Setting the same name twice keeps the last value.
    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.kwargs.insert(name.into(), value.to_string());
        self
    }

    /// The prefix this key was started with.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Renders the store key.
    #[must_use]
    pub fn build(&self) -> String {
        let parts: Vec<String> = std::iter::once(self.prefix.clone())
            .chain(self.args.iter().cloned())
            .chain(self.kwargs.iter().map(|(name, value)| format!("{name}={value}")))
            .collect();
        StoreKeys::cache(&parts.join(":"))
    }
}

impl From<&str> for CacheKey {
    fn from(prefix: &str) -> Self {
        Self::new(prefix)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_keys;

    #[test]
    fn test_prefix_only() {
        assert_eq!(CacheKey::new("github").build(), "cache:github");
    }

    #[test]
    fn test_known_prefix_is_not_doubled() {
        let key = CacheKey::new(cache_keys::GARMIN_HEALTH).arg("2026-01-26");
        assert_eq!(key.build(), "cache:garmin:health:2026-01-26");
    }

    #[test]
    fn test_kwargs_order_does_not_matter() {
        let a = CacheKey::new("calendar")
            .arg("work")
            .kwarg("start", "2026-01-26")
            .kwarg("days", 7);
        let b = CacheKey::new("calendar")
            .arg("work")
            .kwarg("days", 7)
            .kwarg("start", "2026-01-26");

        assert_eq!(a.build(), b.build());
        assert_eq!(a.build(), "cache:calendar:work:days=7:start=2026-01-26");
    }

    #[test]
    fn test_different_arguments_differ() {
        let berlin = CacheKey::new("weather").arg("Berlin");
        let paris = CacheKey::new("weather").arg("Paris");
        let positional = CacheKey::new("weather").arg("Berlin").arg("metric");
        let keyword = CacheKey::new("weather").arg("Berlin").kwarg("units", "metric");

        assert_ne!(berlin.build(), paris.build());
        assert_ne!(positional.build(), keyword.build());
    }

    #[test]
    fn test_positional_order_matters() {
        let a = CacheKey::new("github").arg("owner").arg("repo");
        let b = CacheKey::new("github").arg("repo").arg("owner");
        assert_ne!(a.build(), b.build());
    }
}
