//! Per-segment reward statistics, rebuilt from the ad event log.
//!
//! Every `Served` event is one pull on the arm of its creative set (the
//! set's primary segment). A pull earns a reward of 1 when a `Clicked` or
//! qualifying `Converted` event for the same set follows it inside the
//! attribution window. Rebuilding is a pure function of the event set.

use ads_catalog::{Catalog, CreativeSet};
use ads_core::{AdEvent, AdEventType};
use chrono::{DateTime, Duration, Utc};
use globset::{Glob, GlobMatcher};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArmStats {
    pub pulls: u64,
    pub rewards: u64,
}

impl ArmStats {
    pub fn mean_reward(&self) -> f64 {
        if self.pulls == 0 {
            return 0.0;
        }
        self.rewards as f64 / self.pulls as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BanditState {
    arms: BTreeMap<String, ArmStats>,
}

struct ConversionWindow {
    matcher: GlobMatcher,
    window: Duration,
}

impl BanditState {
    pub fn from_arms(arms: impl IntoIterator<Item = (String, ArmStats)>) -> Self {
        Self {
            arms: arms.into_iter().collect(),
        }
    }

    /// Fold `events` into per-arm statistics. Events are de-duplicated by
    /// [`AdEvent::dedup_key`] and events for sets missing from `catalog` are ignored.
    pub fn from_events(catalog: &Catalog, events: &[AdEvent], default_window: Duration) -> Self {
        let mut seen = HashSet::new();
        let mut by_set: HashMap<&str, Vec<&AdEvent>> = HashMap::new();
        for event in events {
            if seen.insert(event.dedup_key()) {
                by_set
                    .entry(event.creative_set_id.as_str())
                    .or_default()
                    .push(event);
            }
        }

        let mut arms: BTreeMap<String, ArmStats> = BTreeMap::new();
        for (creative_set_id, mut set_events) in by_set {
            let Ok(set) = catalog.get(creative_set_id) else {
                continue;
            };
            let Some(segment) = set.primary_segment() else {
                continue;
            };
            set_events.sort_by_key(|e| e.timestamp);

            let stats = attribute(set, &set_events, default_window);
            let arm = arms.entry(segment.to_string()).or_default();
            arm.pulls += stats.pulls;
            arm.rewards += stats.rewards;
        }

        Self { arms }
    }

    pub fn get(&self, arm: &str) -> Option<ArmStats> {
        self.arms.get(arm).copied()
    }

    /// Unknown arms have a mean reward of zero.
    pub fn mean_reward(&self, arm: &str) -> f64 {
        self.get(arm).map(|s| s.mean_reward()).unwrap_or(0.0)
    }

    pub fn arms(&self) -> impl Iterator<Item = (&str, &ArmStats)> {
        self.arms.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.arms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arms.is_empty()
    }
}

/// Pulls and rewards for one creative set; `events` sorted by time.
fn attribute(set: &CreativeSet, events: &[&AdEvent], default_window: Duration) -> ArmStats {
    let conversions = compile_conversions(set);
    let served: Vec<DateTime<Utc>> = events
        .iter()
        .filter(|e| e.event_type == AdEventType::Served)
        .map(|e| e.timestamp)
        .collect();
    let mut rewarded = vec![false; served.len()];

    for event in events {
        let window = match event.event_type {
            AdEventType::Clicked => Some(default_window),
            AdEventType::Converted => conversion_window(set, &conversions, event, default_window),
            _ => None,
        };
        let Some(window) = window else {
            continue;
        };

        // Latest unrewarded pull with served <= event < served + window.
        let upto = served.partition_point(|ts| *ts <= event.timestamp);
        let pull = (0..upto)
            .rev()
            .take_while(|&i| event.timestamp < served[i] + window)
            .find(|&i| !rewarded[i]);
        if let Some(idx) = pull {
            rewarded[idx] = true;
        }
    }

    ArmStats {
        pulls: served.len() as u64,
        rewards: rewarded.iter().filter(|r| **r).count() as u64,
    }
}

fn compile_conversions(set: &CreativeSet) -> Vec<ConversionWindow> {
    set.conversions
        .iter()
        .filter_map(|c| match Glob::new(&c.url_pattern) {
            Ok(glob) => Some(ConversionWindow {
                matcher: glob.compile_matcher(),
                window: Duration::days(i64::from(c.observation_window_days)),
            }),
            Err(e) => {
                warn!(
                    creative_set_id = %set.creative_set_id,
                    pattern = %c.url_pattern,
                    error = %e,
                    "Skipping conversion with invalid url pattern"
                );
                None
            }
        })
        .collect()
}

/// Sets with conversion definitions only credit conversions whose URL matches
/// one of them; the widest matching observation window applies. Definitions
/// that failed to compile match nothing.
fn conversion_window(
    set: &CreativeSet,
    conversions: &[ConversionWindow],
    event: &AdEvent,
    default_window: Duration,
) -> Option<Duration> {
    if set.conversions.is_empty() {
        return Some(default_window);
    }
    let url = event.url.as_deref()?;
    conversions
        .iter()
        .filter(|c| c.matcher.is_match(url))
        .map(|c| c.window)
        .max()
}
