//! Epsilon-greedy selection over segment arms.
//!
//! Eligible creative sets are grouped into arms by primary segment. An arm's
//! representative is its lexicographically smallest creative set id, which
//! also orders arms canonically. With probability epsilon a uniformly random
//! arm is explored; otherwise the arm with the highest mean reward is
//! exploited, ties going to the smallest representative.

use crate::bandit_state::BanditState;
use ads_catalog::{Catalog, CreativeSet};
use ads_core::config::FeatureConfig;
use ads_core::{AdEventType, AdsError, AdsResult, EventFilter, EventLog};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "creative_set")]
pub enum SelectionResult {
    Selected(CreativeSet),
    NoneEligible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    Explore,
    Exploit,
    /// Bandit disabled: first selectable set in canonical order.
    Deterministic,
    /// Reward statistics unavailable: uniform over arms.
    Uniform,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub result: SelectionResult,
    /// `None` when nothing was eligible.
    pub mode: Option<SelectionMode>,
}

impl Selection {
    fn none() -> Self {
        metrics::counter!("ads.selector.none_eligible").increment(1);
        Self {
            result: SelectionResult::NoneEligible,
            mode: None,
        }
    }

    fn selected(set: &CreativeSet, mode: SelectionMode) -> Self {
        Self {
            result: SelectionResult::Selected(set.clone()),
            mode: Some(mode),
        }
    }

    pub fn creative_set(&self) -> Option<&CreativeSet> {
        match &self.result {
            SelectionResult::Selected(set) => Some(set),
            SelectionResult::NoneEligible => None,
        }
    }
}

struct Arm<'a> {
    segment: &'a str,
    /// Sorted by creative set id; never empty.
    sets: Vec<&'a CreativeSet>,
}

impl<'a> Arm<'a> {
    fn representative(&self) -> &'a CreativeSet {
        self.sets[0]
    }
}

/// Arms in canonical order. Sets without segments belong to no arm.
fn arms(eligible: &[CreativeSet]) -> Vec<Arm<'_>> {
    let mut by_segment: BTreeMap<&str, Vec<&CreativeSet>> = BTreeMap::new();
    for set in eligible {
        if let Some(segment) = set.primary_segment() {
            by_segment.entry(segment).or_default().push(set);
        }
    }
    let mut arms: Vec<Arm<'_>> = by_segment
        .into_iter()
        .map(|(segment, mut sets)| {
            sets.sort_by(|a, b| a.creative_set_id.cmp(&b.creative_set_id));
            Arm { segment, sets }
        })
        .collect();
    arms.sort_by(|a, b| {
        a.representative()
            .creative_set_id
            .cmp(&b.representative().creative_set_id)
    });
    arms
}

pub struct EpsilonGreedySelector {
    state: RwLock<Arc<BanditState>>,
}

impl EpsilonGreedySelector {
    pub fn new() -> Self {
        Self::with_state(BanditState::default())
    }

    pub fn with_state(state: BanditState) -> Self {
        Self {
            state: RwLock::new(Arc::new(state)),
        }
    }

    /// Last published statistics.
    pub fn state(&self) -> Arc<BanditState> {
        self.state.read().clone()
    }

    pub fn publish(&self, state: BanditState) {
        *self.state.write() = Arc::new(state);
    }

    /// Rebuild statistics from served/clicked/converted events in
    /// `[now - lookback, now)` and publish them. A lookback reaching past the
    /// representable time range is a configuration error.
    pub async fn refresh<L: EventLog + ?Sized>(
        &self,
        catalog: &Catalog,
        log: &L,
        now: DateTime<Utc>,
        lookback: Duration,
        attribution_window: Duration,
    ) -> AdsResult<Arc<BanditState>> {
        let start = now.checked_sub_signed(lookback).ok_or_else(|| {
            AdsError::Config(format!("bandit lookback of {lookback} is out of range"))
        })?;
        let filter = EventFilter::new(start, now)
            .event_type(AdEventType::Served)
            .event_type(AdEventType::Clicked)
            .event_type(AdEventType::Converted);
        let events = log.query(&filter).await?;
        let state = Arc::new(BanditState::from_events(catalog, &events, attribution_window));
        debug!(arms = state.len(), events = events.len(), "Bandit state rebuilt");
        *self.state.write() = state.clone();
        Ok(state)
    }

    /// Pick one creative set using the published statistics.
    pub fn select<F, R>(&self, eligible: &[CreativeSet], features: &F, rng: &mut R) -> Selection
    where
        F: FeatureConfig + ?Sized,
        R: Rng + ?Sized,
    {
        let arms = arms(eligible);
        if arms.is_empty() {
            return Selection::none();
        }

        if !features.is_bandit_enabled() {
            return Selection::selected(arms[0].representative(), SelectionMode::Deterministic);
        }

        if rng.gen::<f64>() < features.epsilon() {
            metrics::counter!("ads.selector.explore").increment(1);
            return Selection::selected(pick_uniform(&arms, rng), SelectionMode::Explore);
        }

        let state = self.state();
        let mut best = &arms[0];
        let mut best_mean = state.mean_reward(best.segment);
        for arm in &arms[1..] {
            let mean = state.mean_reward(arm.segment);
            if mean > best_mean {
                best = arm;
                best_mean = mean;
            }
        }
        debug!(segment = best.segment, mean_reward = best_mean, "Exploiting best arm");
        metrics::counter!("ads.selector.exploit").increment(1);
        Selection::selected(best.representative(), SelectionMode::Exploit)
    }

    /// Uniform choice over arms, used when statistics cannot be derived.
    pub fn select_uniform<R: Rng + ?Sized>(&self, eligible: &[CreativeSet], rng: &mut R) -> Selection {
        let arms = arms(eligible);
        if arms.is_empty() {
            return Selection::none();
        }
        metrics::counter!("ads.selector.fallback").increment(1);
        Selection::selected(pick_uniform(&arms, rng), SelectionMode::Uniform)
    }
}

impl Default for EpsilonGreedySelector {
    fn default() -> Self {
        Self::new()
    }
}

fn pick_uniform<'a, R: Rng + ?Sized>(arms: &[Arm<'a>], rng: &mut R) -> &'a CreativeSet {
    let arm = &arms[rng.gen_range(0..arms.len())];
    arm.sets[rng.gen_range(0..arm.sets.len())]
}
