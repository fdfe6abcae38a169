//! Certificate cache keyed by public key URL.
//!
//! Entries live for the lifetime of the process and are only ever replaced:
//! by a successful background refresh, or by repopulation after an earlier
//! fetch failed and left the key absent.
//!
//! # Concurrency
//!
//! [`CertificateCache::get_or_fetch`] coalesces concurrent first use of a key
//! into a single call to the [`CertificateSource`]. Every waiter observes the
//! same certificate or the same error, and a failed fetch caches nothing.
//! Lookups for unrelated keys never wait on each other.
//!
//! Readers hold an `Arc<Certificate>`, so a refresh swapping an entry hands
//! them either the old or the new certificate, never a mix.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::certificate::Certificate;
use crate::error::{AuthError, AuthResult};
use crate::fetch::CertificateSource;

/// Canonical form of a certificate URL: the URL with its query and fragment
/// removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_url(url: &str) -> Self {
        let end = url.find(['?', '#']).unwrap_or(url.len());
        Self(url[..end].to_string())
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

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Outcome of one refresh pass over every cached key.
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Keys whose entry was replaced.
    pub refreshed: Vec<CacheKey>,

    /// Keys left unchanged because the fetch failed.
    pub failed: Vec<(CacheKey, AuthError)>,
}

struct RefreshTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Process-local certificate cache.
pub struct CertificateCache {
    entries: Cache<CacheKey, Arc<Certificate>>,
    source: Arc<dyn CertificateSource>,
    refresh: Mutex<Option<RefreshTask>>,
}

impl CertificateCache {
    pub fn new(source: Arc<dyn CertificateSource>) -> Self {
        Self {
            entries: Cache::builder().name("gamecenter-certificates").build(),
            source,
            refresh: Mutex::new(None),
        }
    }

    /// Return the cached certificate, fetching it on first use.
    pub async fn get_or_fetch(&self, key: &CacheKey) -> AuthResult<Arc<Certificate>> {
        let source = Arc::clone(&self.source);
        let url = key.as_str().to_string();

        self.entries
            .try_get_with(key.clone(), async move {
                source.fetch(&url).await.map(Arc::new)
            })
            .await
            .map_err(|e| AuthError::clone(&e))
    }

    /// Insert or replace an entry.
    pub async fn put(&self, key: CacheKey, certificate: Certificate) {
        self.entries.insert(key, Arc::new(certificate)).await;
    }

    /// Cached certificate for `key`, without fetching.
    pub async fn get(&self, key: &CacheKey) -> Option<Arc<Certificate>> {
        self.entries.get(key).await
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Snapshot of the cached keys.
    pub fn keys(&self) -> BTreeSet<CacheKey> {
        snapshot_keys(&self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Eagerly load certificates. Failures are logged and left for lazy retry.
    ///
    /// Returns the number of URLs that are cached afterwards.
    pub async fn preload(&self, urls: &[String]) -> usize {
        let mut loaded = 0;

        for url in urls {
            let key = CacheKey::from_url(url);
            match self.get_or_fetch(&key).await {
                Ok(certificate) => {
                    debug!(key = %key, subject = certificate.subject(), "preloaded certificate");
                    loaded += 1;
                }
                Err(e) => {
                    error!(
                        key = %key,
                        error = %e,
                        "failed to preload certificate, verification will retry on first use"
                    );
                }
            }
        }

        loaded
    }

    /// Run one refresh pass now.
    pub async fn refresh_all(&self) -> RefreshReport {
        refresh_entries(self.entries.clone(), Arc::clone(&self.source)).await
    }

    /// Start refreshing every cached key once per `period`.
    ///
    /// The first pass runs one full period after the call. Starting an
    /// already running refresh is a no-op. Must be called from within a
    /// tokio runtime.
    pub async fn start_refresh(&self, period: Duration) -> AuthResult<()> {
        if period.is_zero() {
            return Err(AuthError::Config {
                message: "refresh period must be non-zero".to_string(),
            });
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| AuthError::Config {
            message: format!("certificate refresh needs a tokio runtime: {}", e),
        })?;

        let mut refresh = self.refresh.lock().await;
        if refresh
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
        {
            debug!("certificate refresh already running");
            return Ok(());
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = runtime.spawn(run_refresh_loop(
            self.entries.clone(),
            Arc::clone(&self.source),
            period,
            shutdown_rx,
        ));

        info!(
            period_secs = period.as_secs(),
            "started certificate refresh"
        );
        *refresh = Some(RefreshTask { shutdown, handle });
        Ok(())
    }

    /// Stop background refresh and wait for the loop to exit.
    ///
    /// A pass already in progress completes first. Stopping when refresh was
    /// never started, or was already stopped, does nothing.
    pub async fn stop_refresh(&self) {
        let Some(task) = self.refresh.lock().await.take() else {
            return;
        };

        let _ = task.shutdown.send(true);
        if let Err(e) = task.handle.await {
            error!(error = %e, "certificate refresh task ended abnormally");
        }
        info!("stopped certificate refresh");
    }

    pub async fn is_refreshing(&self) -> bool {
        self.refresh
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }
}

impl fmt::Debug for CertificateCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateCache")
            .field("keys", &self.keys())
            .finish_non_exhaustive()
    }
}

fn snapshot_keys(entries: &Cache<CacheKey, Arc<Certificate>>) -> BTreeSet<CacheKey> {
    entries
        .iter()
        .map(|(key, _)| CacheKey::clone(&key))
        .collect()
}

async fn run_refresh_loop(
    entries: Cache<CacheKey, Arc<Certificate>>,
    source: Arc<dyn CertificateSource>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            // Also fires when the sender is dropped with the cache.
            _ = shutdown.changed() => break,
        }

        // A panicking source must not take the loop down with it.
        let pass = tokio::spawn(refresh_entries(entries.clone(), Arc::clone(&source)));
        match pass.await {
            Ok(report) => debug!(
                refreshed = report.refreshed.len(),
                failed = report.failed.len(),
                "certificate refresh pass complete"
            ),
            Err(e) => error!(error = %e, "certificate refresh pass aborted"),
        }
    }

    debug!("certificate refresh loop exited");
}

async fn refresh_entries(
    entries: Cache<CacheKey, Arc<Certificate>>,
    source: Arc<dyn CertificateSource>,
) -> RefreshReport {
    let mut report = RefreshReport::default();

    for key in snapshot_keys(&entries) {
        debug!(key = %key, "refreshing certificate");

        match source.fetch(key.as_str()).await {
            Ok(certificate) => {
                if let Some(previous) = entries.get(&key).await {
                    if previous.fingerprint() != certificate.fingerprint() {
                        info!(
                            key = %key,
                            previous = previous.fingerprint(),
                            current = certificate.fingerprint(),
                            "certificate rotated"
                        );
                    }
                }
                entries.insert(key.clone(), Arc::new(certificate)).await;
                report.refreshed.push(key);
            }
            Err(e) => {
                error!(key = %key, error = %e, "failed refreshing certificate");
                report.failed.push((key, e));
            }
        }
    }

    report
}
