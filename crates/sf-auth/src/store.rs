use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use tracing::{debug, warn};
use url::Url;

use crate::config::keys;
use crate::errors::{Result, SfAuthError};
use crate::models::{AuthToken, User};

/// A key/value persistence mechanism for session credentials
pub trait TokenStorage: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Check whether this mechanism can hold values in the current environment
    fn probe(&self) -> bool {
        const PROBE_KEY: &str = "__sf_probe";
        let ok = self.set(PROBE_KEY, "1", Some(Duration::from_secs(60))).is_ok()
            && self.get(PROBE_KEY).as_deref() == Some("1");
        let _ = self.remove(PROBE_KEY);
        ok
    }

    /// Store a value, optionally expiring after `max_age`
    fn set(&self, key: &str, value: &str, max_age: Option<Duration>) -> Result<()>;

    /// Read a value; expired or empty entries read as `None`
    fn get(&self, key: &str) -> Option<String>;

    /// Delete a value; deleting a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

/// Session-scoped in-memory key/value store.
///
/// Values live as long as the process (the "browsing session").
#[derive(Debug, Clone, Default)]
pub struct SessionStorage {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl SessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for SessionStorage {
    fn name(&self) -> &'static str {
        "session"
    }

    fn set(&self, key: &str, value: &str, _max_age: Option<Duration>) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| SfAuthError::Storage("Lock poisoned".to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| SfAuthError::Storage("Lock poisoned".to_string()))?
            .remove(key);
        Ok(())
    }
}

/// Cookie-jar storage scoped to the API origin.
///
/// Every cookie is written with `Path=/; Secure; SameSite=Strict` and a
/// `Max-Age`. Secure cookies are only readable back over HTTPS, so probing
/// fails for plain-HTTP origins and the store falls back.
pub struct CookieStorage {
    jar: Arc<Jar>,
    origin: Url,
}

impl CookieStorage {
    pub fn new(origin: Url) -> Self {
        Self::with_jar(Arc::new(Jar::default()), origin)
    }

    pub fn with_jar(jar: Arc<Jar>, origin: Url) -> Self {
        Self { jar, origin }
    }

    fn cookie_header(&self) -> Option<String> {
        let header = self.jar.cookies(&self.origin)?;
        header.to_str().ok().map(str::to_string)
    }
}

impl TokenStorage for CookieStorage {
    fn name(&self) -> &'static str {
        "cookie"
    }

    fn set(&self, key: &str, value: &str, max_age: Option<Duration>) -> Result<()> {
        let mut cookie = format!("{key}={value}; Path=/; Secure; SameSite=Strict");
        if let Some(max_age) = max_age {
            cookie.push_str(&format!("; Max-Age={}", max_age.as_secs()));
        }
        self.jar.add_cookie_str(&cookie, &self.origin);

        // The jar drops cookies it refuses silently; read back to detect that.
        if self.get(key).as_deref() != Some(value) {
            return Err(SfAuthError::Storage(format!(
                "cookie {key} rejected for {}",
                self.origin
            )));
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Option<String> {
        let header = self.cookie_header()?;
        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.to_string())
            .filter(|value| !value.is_empty())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let cookie = format!(
            "{key}=; Path=/; Secure; SameSite=Strict; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT"
        );
        self.jar.add_cookie_str(&cookie, &self.origin);
        Ok(())
    }
}

impl std::fmt::Debug for CookieStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieStorage")
            .field("origin", &self.origin.as_str())
            .finish_non_exhaustive()
    }
}

/// Placement and lifetime of the access/refresh token pair and the user record.
///
/// Holds a ranked pair of strategies. The primary is probed once at
/// construction; writes go to it when usable and fall back otherwise. A token
/// pair is never split across the two mechanisms. The serialized user always
/// lives in the fallback.
///
/// No encryption is applied here.
pub struct TokenStore {
    primary: Arc<dyn TokenStorage>,
    primary_usable: bool,
    fallback: Arc<dyn TokenStorage>,
}

impl TokenStore {
    pub fn new(primary: Arc<dyn TokenStorage>, fallback: Arc<dyn TokenStorage>) -> Self {
        let primary_usable = primary.probe();
        if primary_usable {
            debug!(primary = primary.name(), "Token store using primary storage");
        } else {
            warn!(
                primary = primary.name(),
                fallback = fallback.name(),
                "Primary token storage unavailable, using fallback"
            );
        }
        Self {
            primary,
            primary_usable,
            fallback,
        }
    }

    /// Cookie jar for `origin` with an in-memory session fallback
    pub fn for_origin(origin: &Url) -> Self {
        Self::new(
            Arc::new(CookieStorage::new(origin.clone())),
            Arc::new(SessionStorage::new()),
        )
    }

    /// Session storage only
    pub fn in_memory() -> Self {
        Self::single(Arc::new(SessionStorage::new()))
    }

    /// A store backed by one mechanism for tokens and user alike
    pub fn single(storage: Arc<dyn TokenStorage>) -> Self {
        Self {
            primary: Arc::clone(&storage),
            primary_usable: false,
            fallback: storage,
        }
    }

    /// Name of the mechanism new token writes go to
    pub fn active_storage(&self) -> &'static str {
        if self.primary_usable {
            self.primary.name()
        } else {
            self.fallback.name()
        }
    }

    /// Persist both tokens.
    ///
    /// The access token lives for `expires_in`, the refresh token for twice that.
    pub fn set_token(&self, token: &AuthToken) -> Result<()> {
        let access_age = Duration::from_secs(token.expires_in);
        let refresh_age = Duration::from_secs(token.expires_in.saturating_mul(2));

        if self.primary_usable {
            match write_pair(self.primary.as_ref(), token, access_age, refresh_age) {
                Ok(()) => {
                    // Stale fallback copies must not outlive the primary entries.
                    let _ = self.fallback.remove(keys::ACCESS_TOKEN);
                    let _ = self.fallback.remove(keys::REFRESH_TOKEN);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        primary = self.primary.name(),
                        "Primary token storage failed ({}), falling back",
                        e
                    );
                    let _ = self.primary.remove(keys::ACCESS_TOKEN);
                    let _ = self.primary.remove(keys::REFRESH_TOKEN);
                }
            }
        }

        write_pair(self.fallback.as_ref(), token, access_age, refresh_age).inspect_err(|_| {
            let _ = self.fallback.remove(keys::ACCESS_TOKEN);
            let _ = self.fallback.remove(keys::REFRESH_TOKEN);
        })
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(keys::ACCESS_TOKEN)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(keys::REFRESH_TOKEN)
    }

    pub fn save_user(&self, user: &User) -> Result<()> {
        let json = serde_json::to_string(user)?;
        self.fallback.set(keys::USER, &json, None)
    }

    pub fn load_user(&self) -> Option<User> {
        let json = self.fallback.get(keys::USER)?;
        match serde_json::from_str(&json) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("Discarding unreadable stored user: {}", e);
                None
            }
        }
    }

    /// Expire the primary entries and delete the fallback keys, whichever is
    /// currently populated.
    pub fn clear(&self) {
        for key in [keys::ACCESS_TOKEN, keys::REFRESH_TOKEN] {
            if let Err(e) = self.primary.remove(key) {
                warn!(storage = self.primary.name(), key, "Failed to clear: {}", e);
            }
            if let Err(e) = self.fallback.remove(key) {
                warn!(storage = self.fallback.name(), key, "Failed to clear: {}", e);
            }
        }
        if let Err(e) = self.fallback.remove(keys::USER) {
            warn!(storage = self.fallback.name(), "Failed to clear stored user: {}", e);
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        self.primary.get(key).or_else(|| self.fallback.get(key))
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("primary", &self.primary.name())
            .field("primary_usable", &self.primary_usable)
            .field("fallback", &self.fallback.name())
            .finish()
    }
}

fn write_pair(
    storage: &dyn TokenStorage,
    token: &AuthToken,
    access_age: Duration,
    refresh_age: Duration,
) -> Result<()> {
    storage.set(keys::ACCESS_TOKEN, &token.access_token, Some(access_age))?;
    storage.set(keys::REFRESH_TOKEN, &token.refresh_token, Some(refresh_age))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Storage that accepts the first `budget` writes and then fails
    struct FlakyStorage {
        inner: SessionStorage,
        budget: AtomicUsize,
    }

    impl FlakyStorage {
        fn new(budget: usize) -> Self {
            Self {
                inner: SessionStorage::new(),
                budget: AtomicUsize::new(budget),
            }
        }
    }

    impl TokenStorage for FlakyStorage {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn probe(&self) -> bool {
            true
        }

        fn set(&self, key: &str, value: &str, max_age: Option<Duration>) -> Result<()> {
            let left = self.budget.load(Ordering::SeqCst);
            if left == 0 {
                return Err(SfAuthError::Storage("quota exceeded".to_string()));
            }
            self.budget.store(left - 1, Ordering::SeqCst);
            self.inner.set(key, value, max_age)
        }

        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }
    }

    fn https_origin() -> Url {
        Url::parse("https://dashboard.securetflow.test/").unwrap()
    }

    #[test]
    fn test_round_trip_in_memory() {
        let store = TokenStore::in_memory();
        let token = AuthToken::new("T1", "R1", 3600);

        store.set_token(&token).unwrap();

        assert_eq!(store.access_token().as_deref(), Some("T1"));
        assert_eq!(store.refresh_token().as_deref(), Some("R1"));
    }

    #[test]
    fn test_cookie_storage_round_trip_over_https() {
        let storage = CookieStorage::new(https_origin());
        assert!(storage.probe());

        storage.set("auth_token", "abc.def", Some(Duration::from_secs(60))).unwrap();
        assert_eq!(storage.get("auth_token").as_deref(), Some("abc.def"));

        storage.remove("auth_token").unwrap();
        assert_eq!(storage.get("auth_token"), None);
    }

    #[test]
    fn test_cookie_primary_is_preferred_when_usable() {
        let fallback = Arc::new(SessionStorage::new());
        let store = TokenStore::new(Arc::new(CookieStorage::new(https_origin())), fallback.clone());
        assert_eq!(store.active_storage(), "cookie");

        store.set_token(&AuthToken::new("T1", "R1", 3600)).unwrap();

        assert_eq!(store.access_token().as_deref(), Some("T1"));
        assert_eq!(fallback.get(keys::ACCESS_TOKEN), None);
    }

    #[test]
    fn test_partial_primary_write_falls_back_fully() {
        let primary = Arc::new(FlakyStorage::new(1));
        let fallback = Arc::new(SessionStorage::new());
        let store = TokenStore::new(primary.clone(), fallback.clone());

        store.set_token(&AuthToken::new("T1", "R1", 3600)).unwrap();

        assert_eq!(primary.get(keys::ACCESS_TOKEN), None);
        assert_eq!(primary.get(keys::REFRESH_TOKEN), None);
        assert_eq!(fallback.get(keys::ACCESS_TOKEN).as_deref(), Some("T1"));
        assert_eq!(fallback.get(keys::REFRESH_TOKEN).as_deref(), Some("R1"));
    }

    #[test]
    fn test_clear_twice_leaves_nothing() {
        let store = TokenStore::for_origin(&https_origin());
        store.set_token(&AuthToken::new("T1", "R1", 3600)).unwrap();

        for _ in 0..2 {
            store.clear();
            assert_eq!(store.access_token(), None);
            assert_eq!(store.refresh_token(), None);
        }
    }

    #[test]
    fn test_clear_removes_both_mechanisms() {
        let primary = Arc::new(SessionStorage::new());
        let fallback = Arc::new(SessionStorage::new());
        primary.set(keys::ACCESS_TOKEN, "P", None).unwrap();
        fallback.set(keys::ACCESS_TOKEN, "F", None).unwrap();
        fallback.set(keys::USER, "{}", None).unwrap();
        let store = TokenStore::new(primary.clone(), fallback.clone());

        store.clear();

        assert_eq!(primary.get(keys::ACCESS_TOKEN), None);
        assert_eq!(fallback.get(keys::ACCESS_TOKEN), None);
        assert_eq!(fallback.get(keys::USER), None);
    }
}
