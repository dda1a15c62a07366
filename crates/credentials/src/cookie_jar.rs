use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl Cookie {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Named cookies with expiry. Expired entries are never handed out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    entries: HashMap<String, Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, cookie: Cookie) {
        self.entries.insert(name.to_string(), cookie);
    }

    /// Returns the live value, evicting the entry if it has expired.
    /// The boolean reports whether an eviction happened.
    pub fn get(&mut self, name: &str, now: DateTime<Utc>) -> (Option<&Cookie>, bool) {
        let expired = self
            .entries
            .get(name)
            .map(|c| c.is_expired_at(now))
            .unwrap_or(false);

        if expired {
            self.entries.remove(name);
            return (None, true);
        }

        (self.entries.get(name), false)
    }

    pub fn peek(&self, name: &str) -> Option<&Cookie> {
        self.entries.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Cookie> {
        self.entries.remove(name)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expired_cookie_is_evicted() {
        let now = Utc::now();
        let mut jar = CookieJar::new();
        jar.set("access_token", Cookie::new("a", now + Duration::seconds(10)));

        let (live, evicted) = jar.get("access_token", now);
        assert_eq!(live.map(|c| c.value.as_str()), Some("a"));
        assert!(!evicted);

        let (gone, evicted) = jar.get("access_token", now + Duration::seconds(10));
        assert!(gone.is_none());
        assert!(evicted);
        assert!(jar.is_empty());
    }

    #[test]
    fn test_missing_cookie() {
        let mut jar = CookieJar::new();
        let (value, evicted) = jar.get("nope", Utc::now());
        assert!(value.is_none());
        assert!(!evicted);
    }
}
