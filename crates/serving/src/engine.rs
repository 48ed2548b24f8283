use ads_catalog::{CatalogProvider, CreativeSet};
use ads_core::{AppConfig, EventLog};
use ads_frequency_capping::{allow_list, deny_reasons, Decision, PermissionRuleEngine};
use ads_rl_engine::{EpsilonGreedySelector, Selection};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one full serving request.
#[derive(Debug, Clone, Serialize)]
pub struct ServeOutcome {
    pub selection: Selection,
    pub evaluated: usize,
    pub eligible: usize,
    /// `(creative_set_id, reason)` for each excluded set.
    pub denied: Vec<(String, String)>,
}

/// Shared across serving requests. Holds no lock across an event log query.
pub struct AdServingEngine<L: ?Sized> {
    catalogs: Arc<CatalogProvider>,
    event_log: Arc<L>,
    config: AppConfig,
    rules: PermissionRuleEngine,
    selector: EpsilonGreedySelector,
}

impl<L: EventLog + ?Sized> AdServingEngine<L> {
    pub fn new(catalogs: Arc<CatalogProvider>, event_log: Arc<L>, config: AppConfig) -> Self {
        let rules = PermissionRuleEngine::from_config(&config.frequency_caps, &config.platform);
        Self {
            catalogs,
            event_log,
            config,
            rules,
            selector: EpsilonGreedySelector::new(),
        }
    }

    pub fn with_rules(mut self, rules: PermissionRuleEngine) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &PermissionRuleEngine {
        &self.rules
    }

    pub fn selector(&self) -> &EpsilonGreedySelector {
        &self.selector
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn evaluate_eligibility(
        &self,
        creative_sets: &[CreativeSet],
        now: DateTime<Utc>,
    ) -> Vec<(CreativeSet, Decision)> {
        self.rules
            .evaluate_all(creative_sets, self.event_log.as_ref(), now)
            .await
    }

    /// Evaluate every creative set of the current catalog snapshot.
    pub async fn evaluate_catalog(&self, now: DateTime<Utc>) -> Vec<(CreativeSet, Decision)> {
        let catalog = self.catalogs.current();
        self.evaluate_eligibility(catalog.creative_sets(), now).await
    }

    pub async fn select_ad(&self, eligible: &[CreativeSet], now: DateTime<Utc>) -> Selection {
        let stats_ready = self.refresh_bandit_state(eligible, now).await;
        let mut rng = rand::thread_rng();
        self.choose(eligible, stats_ready, &mut rng)
    }

    /// [`Self::select_ad`] with a caller-supplied random source.
    pub async fn select_ad_with_rng<R: Rng + Send>(
        &self,
        eligible: &[CreativeSet],
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Selection {
        let stats_ready = self.refresh_bandit_state(eligible, now).await;
        self.choose(eligible, stats_ready, rng)
    }

    /// Run the rule pipeline over the current catalog, then select.
    pub async fn serve(&self, now: DateTime<Utc>) -> ServeOutcome {
        let results = self.evaluate_catalog(now).await;
        let eligible = allow_list(&results);
        let denied = deny_reasons(&results);
        let selection = self.select_ad(&eligible, now).await;

        info!(
            evaluated = results.len(),
            eligible = eligible.len(),
            selected = selection.creative_set().map(|s| s.creative_set_id.as_str()),
            "Serving decision made"
        );

        ServeOutcome {
            selection,
            evaluated: results.len(),
            eligible: eligible.len(),
            denied,
        }
    }

    /// Returns false when the statistics could not be derived.
    async fn refresh_bandit_state(&self, eligible: &[CreativeSet], now: DateTime<Utc>) -> bool {
        if eligible.is_empty() || !self.config.bandit.enabled {
            return true;
        }
        let catalog = self.catalogs.current();
        let lookback = Duration::days(i64::from(self.config.bandit.lookback_days));
        let window = Duration::hours(i64::from(self.config.attribution.default_window_hours));
        match self
            .selector
            .refresh(&catalog, self.event_log.as_ref(), now, lookback, window)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Bandit state unavailable, selecting uniformly");
                false
            }
        }
    }

    fn choose<R: Rng + ?Sized>(
        &self,
        eligible: &[CreativeSet],
        stats_ready: bool,
        rng: &mut R,
    ) -> Selection {
        if stats_ready {
            self.selector.select(eligible, &self.config.bandit, rng)
        } else {
            self.selector.select_uniform(eligible, rng)
        }
    }
}
