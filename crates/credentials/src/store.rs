use agentdesk_core::CredentialPair;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::cookie_jar::{Cookie, CookieJar};
use crate::mirror::DurableMirror;
use crate::CredentialError;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Monotonic counter bumped on every change to the stored credentials.
pub type TokenRevision = u64;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::days(1),
            refresh: Duration::days(7),
        }
    }
}

/// Cookie-backed access/refresh token storage.
///
/// The in-memory jar is authoritative. Every write is mirrored to the optional
/// durable mirror; mirror failures are logged and never undo the jar update,
/// and a jar with unwritten changes never adopts the disk state.
pub struct TokenStore {
    jar: Mutex<CookieJar>,
    mirror: Option<DurableMirror>,
    lifetimes: TokenLifetimes,
    clock: Arc<dyn Clock>,
    revision: watch::Sender<TokenRevision>,
    unsynced: AtomicBool,
}

impl TokenStore {
    pub fn in_memory() -> Self {
        Self::build(None, TokenLifetimes::default(), Arc::new(SystemClock))
    }

    pub fn with_clock(lifetimes: TokenLifetimes, clock: Arc<dyn Clock>) -> Self {
        Self::build(None, lifetimes, clock)
    }

    /// Open a store backed by `mirror`, loading whatever live entries it holds.
    pub fn restore(mirror: DurableMirror, lifetimes: TokenLifetimes) -> Result<Self, CredentialError> {
        Self::restore_with_clock(mirror, lifetimes, Arc::new(SystemClock))
    }

    pub fn restore_with_clock(
        mirror: DurableMirror,
        lifetimes: TokenLifetimes,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CredentialError> {
        let jar = read_mirror(&mirror, clock.now())?;
        let store = Self::build(Some(mirror), lifetimes, clock);
        *store.jar.lock() = jar;
        tracing::debug!("Restored token store, access token present: {}", store.has_access_token());
        Ok(store)
    }

    fn build(mirror: Option<DurableMirror>, lifetimes: TokenLifetimes, clock: Arc<dyn Clock>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            jar: Mutex::new(CookieJar::new()),
            mirror,
            lifetimes,
            clock,
            revision,
            unsynced: AtomicBool::new(false),
        }
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    /// Write both tokens together. `None` for refresh removes any previous one.
    pub fn set_tokens(&self, access: &str, refresh: Option<&str>) {
        let now = self.clock.now();
        let mut jar = self.jar.lock();
        jar.set(ACCESS_TOKEN_COOKIE, Cookie::new(access, now + self.lifetimes.access));
        match refresh {
            Some(refresh) => jar.set(
                REFRESH_TOKEN_COOKIE,
                Cookie::new(refresh, now + self.lifetimes.refresh),
            ),
            None => {
                jar.remove(REFRESH_TOKEN_COOKIE);
            }
        }
        self.bump();
        self.flush(&jar);
    }

    pub fn set_pair(&self, pair: &CredentialPair) {
        self.set_tokens(&pair.access_token, pair.refresh_token.as_deref());
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(ACCESS_TOKEN_COOKIE)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_COOKIE)
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token().is_some()
    }

    pub fn credentials(&self) -> Option<CredentialPair> {
        let access = self.access_token()?;
        Some(CredentialPair::new(access, self.refresh_token()))
    }

    pub fn clear_tokens(&self) {
        let mut jar = self.jar.lock();
        jar.clear();
        self.bump();
        self.flush(&jar);
    }

    /// Clear everything, but only if `access` is still the stored access token.
    /// Returns whether the clear happened.
    pub fn clear_if_access_token(&self, access: &str) -> bool {
        let mut jar = self.jar.lock();
        let current = jar.peek(ACCESS_TOKEN_COOKIE).map(|c| c.value.as_str());
        if current != Some(access) {
            return false;
        }
        jar.clear();
        self.bump();
        self.flush(&jar);
        true
    }

    /// Clear everything, but only if the store is still at `revision`.
    /// Returns whether the clear happened.
    pub fn clear_if_revision(&self, revision: TokenRevision) -> bool {
        let mut jar = self.jar.lock();
        if self.revision() != revision {
            return false;
        }
        jar.clear();
        self.bump();
        self.flush(&jar);
        true
    }

    /// Whether the last mirror write failed, leaving the jar ahead of the disk.
    pub fn is_unsynced(&self) -> bool {
        self.unsynced.load(Ordering::SeqCst)
    }

    // Called with the jar locked so a concurrent sync never sees the jar and
    // the disk disagree mid-write.
    fn flush(&self, jar: &CookieJar) {
        let Some(mirror) = &self.mirror else {
            return;
        };
        match write_mirror(mirror, jar) {
            Ok(()) => self.unsynced.store(false, Ordering::SeqCst),
            Err(e) => {
                self.unsynced.store(true, Ordering::SeqCst);
                tracing::warn!("Failed to mirror tokens to {:?}: {}", mirror.path(), e);
            }
        }
    }

    pub fn revision(&self) -> TokenRevision {
        *self.revision.borrow()
    }

    /// Change notifications; the value is the store revision.
    pub fn subscribe(&self) -> watch::Receiver<TokenRevision> {
        self.revision.subscribe()
    }

    /// Re-read the durable mirror and adopt its contents if they differ from the
    /// jar. Returns whether anything changed. Without a mirror this is a no-op.
    ///
    /// If an earlier write never reached the disk, the jar is pushed to the
    /// mirror instead and nothing is adopted.
    pub fn sync_from_mirror(&self) -> Result<bool, CredentialError> {
        let Some(mirror) = &self.mirror else {
            return Ok(false);
        };

        let mut jar = self.jar.lock();
        if self.unsynced.load(Ordering::SeqCst) {
            write_mirror(mirror, &jar)?;
            self.unsynced.store(false, Ordering::SeqCst);
            tracing::info!("Wrote pending credential changes to {:?}", mirror.path());
            return Ok(false);
        }

        let on_disk = read_mirror(mirror, self.clock.now())?;
        if *jar == on_disk {
            return Ok(false);
        }

        *jar = on_disk;
        self.bump();
        tracing::info!("Adopted credential change from {:?}", mirror.path());
        Ok(true)
    }

    fn read(&self, name: &str) -> Option<String> {
        let now = self.clock.now();
        let mut jar = self.jar.lock();
        let (value, evicted) = jar.get(name, now);
        let value = value.map(|c| c.value.clone());
        if evicted {
            tracing::debug!("Cookie {} expired", name);
            self.bump();
        }
        value
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}

fn write_mirror(mirror: &DurableMirror, jar: &CookieJar) -> Result<(), CredentialError> {
    for name in [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE] {
        match jar.peek(name) {
            Some(cookie) => mirror.store(name, cookie)?,
            None => mirror.delete(name)?,
        }
    }
    Ok(())
}

fn read_mirror(mirror: &DurableMirror, now: DateTime<Utc>) -> Result<CookieJar, CredentialError> {
    let mut jar = CookieJar::new();
    for name in [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE] {
        if let Some(cookie) = mirror.load(name)? {
            if !cookie.is_expired_at(now) {
                jar.set(name, cookie);
            }
        }
    }
    Ok(jar)
}
