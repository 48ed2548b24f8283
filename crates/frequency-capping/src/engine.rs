//! Permission rule pipeline. A creative set is eligible only when every
//! registered rule allows it; evaluation stops at the first deny.

use crate::decision::Decision;
use crate::permission_rules::PermissionRule;
use ads_catalog::CreativeSet;
use ads_core::config::FrequencyCapConfig;
use ads_core::{AdsError, EventLog};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};

pub struct PermissionRuleEngine {
    rules: Vec<PermissionRule>,
    /// Most recent deny reason per rule name.
    last_messages: DashMap<&'static str, String>,
}

impl PermissionRuleEngine {
    pub fn new(mut rules: Vec<PermissionRule>) -> Self {
        rules.sort_by_key(PermissionRule::order);
        Self {
            rules,
            last_messages: DashMap::new(),
        }
    }

    /// Standard pipeline. Global caps configured as zero are left out.
    pub fn from_config(caps: &FrequencyCapConfig, platform: &str) -> Self {
        let mut rules = vec![
            PermissionRule::SupportedOs {
                platform: platform.to_string(),
            },
            PermissionRule::HasSegments,
            PermissionRule::PerDayFrequencyCap,
            PermissionRule::TotalMaxFrequencyCap,
        ];
        if caps.per_hour > 0 {
            rules.push(PermissionRule::PerHourFrequencyCap { cap: caps.per_hour });
        }
        if caps.per_week > 0 {
            rules.push(PermissionRule::PerWeekFrequencyCap { cap: caps.per_week });
        }
        if caps.dismissed_per_day > 0 {
            rules.push(PermissionRule::DismissedFrequencyCap {
                cap: caps.dismissed_per_day,
            });
        }
        if caps.new_tab_page_ads_per_day > 0 {
            rules.push(PermissionRule::NewTabPageAdsPerDay {
                cap: caps.new_tab_page_ads_per_day,
            });
        }
        Self::new(rules)
    }

    pub fn rules(&self) -> &[PermissionRule] {
        &self.rules
    }

    /// Apply every rule to `set`. Collaborator failures deny.
    pub async fn evaluate<L: EventLog + ?Sized>(
        &self,
        set: &CreativeSet,
        log: &L,
        now: DateTime<Utc>,
    ) -> Decision {
        for rule in &self.rules {
            let decision = match rule.evaluate(set, log, now).await {
                Ok(decision) => decision,
                Err(e) => {
                    let failure = AdsError::rule_failed(rule.name(), &e);
                    warn!(
                        creative_set_id = %set.creative_set_id,
                        rule = rule.name(),
                        error = %e,
                        "Permission rule could not complete, denying"
                    );
                    metrics::counter!("ads.rules.failed", "rule" => rule.name()).increment(1);
                    Decision::Deny(failure.to_string())
                }
            };

            if let Decision::Deny(reason) = &decision {
                debug!(
                    creative_set_id = %set.creative_set_id,
                    rule = rule.name(),
                    reason = %reason,
                    "Creative set denied"
                );
                metrics::counter!("ads.rules.deny", "rule" => rule.name()).increment(1);
                self.last_messages.insert(rule.name(), reason.clone());
                return decision;
            }
        }

        metrics::counter!("ads.rules.allow").increment(1);
        Decision::Allow
    }

    /// Evaluate each candidate, preserving input order.
    pub async fn evaluate_all<L: EventLog + ?Sized>(
        &self,
        sets: &[CreativeSet],
        log: &L,
        now: DateTime<Utc>,
    ) -> Vec<(CreativeSet, Decision)> {
        let mut results = Vec::with_capacity(sets.len());
        for set in sets {
            let decision = self.evaluate(set, log, now).await;
            results.push((set.clone(), decision));
        }
        results
    }

    /// Last deny reason reported by the rule with this name.
    pub fn last_message(&self, rule_name: &str) -> Option<String> {
        self.last_messages.get(rule_name).map(|m| m.clone())
    }
}
