//! Credential pool
//!
//! One slot per configured session identifier. Each slot holds the latest
//! bearer token acquired through a [`TokenSource`]:
//! - Refreshed together on a timer, or early on request
//! - A failed acquisition keeps the slot's previous token
//! - Loops read their slot's token at the start of every placement

use crate::error::CredentialError;
use crate::types::Credential;
use async_trait::async_trait;
use cw_canvas::BearerProvider;
use futures::future::join_all;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Default interval between credential refreshes
pub const DEFAULT_CREDENTIAL_REFRESH: Duration = Duration::from_secs(30 * 60);

/// Default retry interval while some slot holds no token
pub const DEFAULT_CREDENTIAL_RETRY: Duration = Duration::from_secs(15);

/// Default page embedding the access token
pub const DEFAULT_SESSION_PAGE: &str = "https://www.reddit.com/r/place/";

/// Split a `;`-delimited session list, dropping blanks
#[must_use]
pub fn parse_sessions(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Turns a session identifier into a bearer token
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Acquire a fresh bearer token for `session`
    async fn acquire(&self, session: &str) -> Result<String, CredentialError>;
}

/// Session identifiers are already bearer tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTokenSource;

#[async_trait]
impl TokenSource for PassthroughTokenSource {
    async fn acquire(&self, session: &str) -> Result<String, CredentialError> {
        let token = session.trim();
        if token.is_empty() {
            return Err(CredentialError::TokenNotFound);
        }
        Ok(token.to_string())
    }
}

/// Scrapes the token the canvas page embeds for a logged-in session
#[derive(Debug, Clone)]
pub struct SessionPageTokenSource {
    client: reqwest::Client,
    page_url: String,
}

impl SessionPageTokenSource {
    /// Create source reading `page_url`
    #[must_use]
    pub fn new(client: reqwest::Client, page_url: impl Into<String>) -> Self {
        Self {
            client,
            page_url: page_url.into(),
        }
    }
}

/// Value of the first `"accessToken":"…"` pair in `page`
#[must_use]
pub fn extract_access_token(page: &str) -> Option<&str> {
    const MARKER: &str = "\"accessToken\":\"";
    let start = page.find(MARKER)? + MARKER.len();
    let rest = &page[start..];
    let token = &rest[..rest.find('"')?];
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl TokenSource for SessionPageTokenSource {
    async fn acquire(&self, session: &str) -> Result<String, CredentialError> {
        let page = self
            .client
            .get(&self.page_url)
            .header(reqwest::header::COOKIE, format!("reddit_session={session}"))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| CredentialError::Request(e.to_string()))?
            .text()
            .await
            .map_err(|e| CredentialError::Request(e.to_string()))?;

        extract_access_token(&page)
            .map(str::to_string)
            .ok_or(CredentialError::TokenNotFound)
    }
}

struct Slot {
    session: String,
    account: String,
    current: RwLock<Option<Credential>>,
}

/// Bearer tokens for every configured account
pub struct CredentialPool {
    source: Arc<dyn TokenSource>,
    slots: Vec<Slot>,
    refresh_requested: Notify,
}

impl CredentialPool {
    /// Create pool with one empty slot per session
    ///
    /// # Errors
    /// [`CredentialError::NoSessions`] if `sessions` is empty
    pub fn new(sessions: Vec<String>, source: Arc<dyn TokenSource>) -> Result<Self, CredentialError> {
        if sessions.is_empty() {
            return Err(CredentialError::NoSessions);
        }

        let slots = sessions
            .into_iter()
            .enumerate()
            .map(|(i, session)| Slot {
                session,
                account: format!("account {}", i + 1),
                current: RwLock::new(None),
            })
            .collect();

        Ok(Self {
            source,
            slots,
            refresh_requested: Notify::new(),
        })
    }

    /// Number of slots
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; a pool has at least one slot
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current credential of `slot`, if acquired
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<Credential> {
        self.slots.get(slot)?.current.read().clone()
    }

    /// Whether any slot holds a token
    #[must_use]
    pub fn any_ready(&self) -> bool {
        self.slots.iter().any(|s| s.current.read().is_some())
    }

    /// Whether every slot holds a token
    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.slots.iter().all(|s| s.current.read().is_some())
    }

    /// Acquire a new token for one slot
    ///
    /// # Errors
    /// Unknown slot or acquisition failure; the old token stays in place
    pub async fn refresh_slot(&self, slot: usize) -> Result<Credential, CredentialError> {
        let entry = self.slots.get(slot).ok_or(CredentialError::UnknownSlot(slot))?;

        let token = self.source.acquire(&entry.session).await?;
        let credential = Credential::new(entry.account.clone(), token);
        *entry.current.write() = Some(credential.clone());
        Ok(credential)
    }

    /// Refresh every slot concurrently
    ///
    /// # Returns
    /// Number of slots refreshed successfully
    pub async fn refresh_all(&self) -> usize {
        let results = join_all((0..self.slots.len()).map(|slot| self.refresh_slot(slot))).await;

        let mut refreshed = 0;
        for (slot, result) in self.slots.iter().zip(results) {
            match result {
                Ok(_) => {
                    refreshed += 1;
                    tracing::debug!(credential = %slot.account, "Access token refreshed");
                }
                Err(err) => {
                    tracing::warn!(credential = %slot.account, error = %err, "Could not refresh access token");
                }
            }
        }

        tracing::info!(refreshed, total = self.slots.len(), "Access tokens refreshed");
        refreshed
    }

    /// Ask the refresher to run now; never blocks
    pub fn request_refresh(&self) {
        self.refresh_requested.notify_one();
    }

    /// Refresh every `interval`, or sooner when requested
    ///
    /// While any slot is still empty the period drops to `retry`.
    pub fn spawn_refresher(self: &Arc<Self>, interval: Duration, retry: Duration) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let wait = if pool.all_ready() { interval } else { retry.min(interval) };
                tokio::select! {
                    () = tokio::time::sleep(wait) => {}
                    () = pool.refresh_requested.notified() => {
                        tracing::info!("Credential refresh requested");
                    }
                }
                pool.refresh_all().await;
            }
        })
    }
}

impl BearerProvider for CredentialPool {
    fn bearer_token(&self) -> Option<String> {
        self.slots
            .iter()
            .find_map(|s| s.current.read().as_ref().map(|c| c.token().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Issues `<session>-<n>` tokens; fails while `fail` is set
    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn acquire(&self, session: &str) -> Result<String, CredentialError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(CredentialError::Request("connection refused".into()));
            }
            Ok(format!("{session}-{n}"))
        }
    }

    fn sessions(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parse_sessions_drops_blanks() {
        assert_eq!(parse_sessions(" a ; b;;c; "), sessions(&["a", "b", "c"]));
        assert!(parse_sessions(" ; ").is_empty());
    }

    #[test]
    fn extract_access_token_reads_embedded_value() {
        let page = r#"<script>{"user":{"session":{"accessToken":"abc-123","expires":1}}}</script>"#;
        assert_eq!(extract_access_token(page), Some("abc-123"));
        assert_eq!(extract_access_token("<html></html>"), None);
        assert_eq!(extract_access_token(r#""accessToken":"""#), None);
    }

    #[test]
    fn empty_pool_is_rejected() {
        let err = CredentialPool::new(Vec::new(), Arc::new(PassthroughTokenSource)).err();
        assert_eq!(err, Some(CredentialError::NoSessions));
    }

    #[tokio::test]
    async fn passthrough_uses_session_as_token() {
        let pool = CredentialPool::new(sessions(&["tok-a", "tok-b"]), Arc::new(PassthroughTokenSource)).unwrap();
        assert!(!pool.any_ready());
        assert!(pool.bearer_token().is_none());

        assert_eq!(pool.refresh_all().await, 2);

        let second = pool.get(1).unwrap();
        assert_eq!(second.account(), "account 2");
        assert_eq!(second.token(), "tok-b");
        assert_eq!(pool.bearer_token().as_deref(), Some("tok-a"));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_token() {
        let source = Arc::new(CountingSource::default());
        let pool = CredentialPool::new(sessions(&["s"]), source.clone()).unwrap();

        pool.refresh_all().await;
        source.fail.store(true, Ordering::SeqCst);
        assert_eq!(pool.refresh_all().await, 0);

        assert_eq!(pool.get(0).unwrap().token(), "s-0");
    }

    #[tokio::test]
    async fn unknown_slot_is_an_error() {
        let pool = CredentialPool::new(sessions(&["s"]), Arc::new(PassthroughTokenSource)).unwrap();
        assert_eq!(pool.refresh_slot(3).await.err(), Some(CredentialError::UnknownSlot(3)));
        assert!(pool.get(3).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn request_wakes_refresher_early() {
        let source = Arc::new(CountingSource::default());
        let pool = Arc::new(CredentialPool::new(sessions(&["s"]), source.clone()).unwrap());

        let handle = pool.spawn_refresher(DEFAULT_CREDENTIAL_REFRESH, DEFAULT_CREDENTIAL_RETRY);
        pool.request_refresh();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pool.get(0).unwrap().token(), "s-0");

        tokio::time::sleep(DEFAULT_CREDENTIAL_REFRESH).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn empty_slots_are_retried_until_filled() {
        let source = Arc::new(CountingSource::default());
        source.fail.store(true, Ordering::SeqCst);
        let pool = Arc::new(CredentialPool::new(sessions(&["s"]), source.clone()).unwrap());
        assert_eq!(pool.refresh_all().await, 0);

        let handle = pool.spawn_refresher(DEFAULT_CREDENTIAL_REFRESH, DEFAULT_CREDENTIAL_RETRY);
        tokio::time::sleep(DEFAULT_CREDENTIAL_RETRY + Duration::from_secs(1)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(!pool.all_ready());

        source.fail.store(false, Ordering::SeqCst);
        tokio::time::sleep(DEFAULT_CREDENTIAL_RETRY).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(pool.get(0).unwrap().token(), "s-2");

        // Filled slots fall back to the long period
        tokio::time::sleep(DEFAULT_CREDENTIAL_RETRY * 4).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        handle.abort();
    }
}
