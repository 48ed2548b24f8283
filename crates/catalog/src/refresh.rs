//! Catalog refresh with single-flight fetches.
//!
//! The first caller of [`CatalogRefresher::refresh`] performs the fetch;
//! callers arriving while it is pending wait on the same result instead of
//! issuing their own request.

use crate::model::Catalog;
use crate::provider::CatalogProvider;
use ads_core::config::CatalogRefreshConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Server asked us to come back soon.
    #[error("catalog server busy: {0}")]
    RetryShort(String),

    #[error("catalog fetch failed: {0}")]
    Failed(String),
}

/// Where catalogs come from (network, file, fixture).
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self) -> Result<Catalog, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Installed { version: u32 },
    /// Same version as the installed snapshot; nothing replaced.
    Unchanged { version: u32 },
    RetryShort,
    Failed(String),
}

impl RefreshOutcome {
    fn label(&self) -> &'static str {
        match self {
            RefreshOutcome::Installed { .. } => "installed",
            RefreshOutcome::Unchanged { .. } => "unchanged",
            RefreshOutcome::RetryShort => "retry_short",
            RefreshOutcome::Failed(_) => "failed",
        }
    }
}

pub struct CatalogRefresher<S> {
    source: S,
    provider: Arc<CatalogProvider>,
    config: CatalogRefreshConfig,
    pending: Mutex<Option<broadcast::Sender<RefreshOutcome>>>,
}

/// Clears the pending slot even if the leading caller is dropped mid-fetch,
/// which closes the channel and releases any waiters.
struct PendingGuard<'a> {
    slot: &'a Mutex<Option<broadcast::Sender<RefreshOutcome>>>,
}

impl PendingGuard<'_> {
    fn complete(self, outcome: &RefreshOutcome) {
        if let Some(tx) = self.slot.lock().take() {
            let _ = tx.send(outcome.clone());
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}

impl<S: CatalogSource> CatalogRefresher<S> {
    pub fn new(source: S, provider: Arc<CatalogProvider>, config: CatalogRefreshConfig) -> Self {
        Self {
            source,
            provider,
            config,
            pending: Mutex::new(None),
        }
    }

    pub fn provider(&self) -> &Arc<CatalogProvider> {
        &self.provider
    }

    pub async fn refresh(&self) -> RefreshOutcome {
        let waiter = {
            let mut pending = self.pending.lock();
            match pending.as_ref() {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    *pending = Some(tx);
                    None
                }
            }
        };

        if let Some(mut rx) = waiter {
            debug!("Catalog fetch in progress");
            return rx
                .recv()
                .await
                .unwrap_or_else(|e| RefreshOutcome::Failed(format!("refresh abandoned: {e}")));
        }

        let guard = PendingGuard {
            slot: &self.pending,
        };
        let outcome = self.fetch_and_install().await;
        metrics::counter!("ads.catalog.refresh", "outcome" => outcome.label()).increment(1);
        guard.complete(&outcome);
        outcome
    }

    async fn fetch_and_install(&self) -> RefreshOutcome {
        match self.source.fetch().await {
            Ok(catalog) => {
                let current = self.provider.current();
                if current.version == catalog.version && current.catalog_id == catalog.catalog_id {
                    debug!(version = catalog.version, "Catalog unchanged");
                    return RefreshOutcome::Unchanged {
                        version: catalog.version,
                    };
                }
                let version = catalog.version;
                self.provider.install(catalog);
                RefreshOutcome::Installed { version }
            }
            Err(FetchError::RetryShort(reason)) => {
                info!(reason = %reason, "Catalog server asked for a short retry");
                RefreshOutcome::RetryShort
            }
            Err(FetchError::Failed(reason)) => {
                warn!(reason = %reason, "Couldn't fetch catalog");
                RefreshOutcome::Failed(reason)
            }
        }
    }

    /// Delay before the next refresh attempt.
    pub fn next_delay(&self, outcome: &RefreshOutcome, rng: &mut impl Rng) -> Duration {
        let secs = match outcome {
            RefreshOutcome::RetryShort => self.config.retry_short_secs,
            RefreshOutcome::Failed(_) => {
                let delay = self.config.failure_delay_secs;
                rng.gen_range(delay / 2..=delay)
            }
            RefreshOutcome::Installed { .. } | RefreshOutcome::Unchanged { .. } => {
                self.config.success_base_secs + rng.gen_range(0..=self.config.jitter_secs)
            }
        };
        Duration::from_secs(secs)
    }
}

impl<S: CatalogSource + 'static> CatalogRefresher<S> {
    /// Refresh forever on a background task, pacing by [`Self::next_delay`].
    pub fn spawn_refresh_loop(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let outcome = self.refresh().await;
                let delay = self.next_delay(&outcome, &mut rand::thread_rng());
                info!(delay_secs = delay.as_secs(), outcome = outcome.label(), "Catalog refresh scheduled");
                tokio::time::sleep(delay).await;
            }
        })
    }
}
