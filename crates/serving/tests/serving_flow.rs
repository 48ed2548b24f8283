//! End-to-end serving flow: catalog snapshot + event log + rules + selector.

use ads_catalog::{Catalog, CatalogProvider, CreativeSet};
use ads_core::{
    AdEvent, AdEventType, AdType, AdsError, AdsResult, AppConfig, EventFilter, EventLog,
    InMemoryEventLog,
};
use ads_frequency_capping::{allow_list, Decision, PermissionRule, PermissionRuleEngine};
use ads_rl_engine::{SelectionMode, SelectionResult};
use ads_serving::AdServingEngine;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

fn now() -> DateTime<Utc> {
    "2024-09-02T18:30:00Z".parse().expect("timestamp")
}

fn served(id: &str, at: DateTime<Utc>) -> AdEvent {
    AdEvent::new(id, AdType::AdNotification, AdEventType::Served, at)
}

fn clicked(id: &str, at: DateTime<Utc>) -> AdEvent {
    AdEvent::new(id, AdType::AdNotification, AdEventType::Clicked, at)
}

fn caps_only() -> PermissionRuleEngine {
    PermissionRuleEngine::new(vec![
        PermissionRule::HasSegments,
        PermissionRule::PerDayFrequencyCap,
        PermissionRule::TotalMaxFrequencyCap,
    ])
}

fn build<L: EventLog>(sets: Vec<CreativeSet>, log: L, config: AppConfig) -> AdServingEngine<L> {
    let catalog = Catalog::new("catalog", 1, sets).expect("catalog");
    AdServingEngine::new(
        Arc::new(CatalogProvider::new(catalog)),
        Arc::new(log),
        config,
    )
    .with_rules(caps_only())
}

#[tokio::test]
async fn per_day_cap_flips_at_exactly_n_serves() {
    let per_day = 4;
    let set = CreativeSet::new("cs-1", per_day, 1_000).with_segment("sports");
    let log = InMemoryEventLog::with_events(
        (1..per_day).map(|i| served("cs-1", now() - Duration::hours(i64::from(i)))),
    );
    let engine = build(vec![set.clone()], log, AppConfig::default());

    let results = engine.evaluate_eligibility(&[set.clone()], now()).await;
    assert_eq!(results[0].1, Decision::Allow);

    let log = InMemoryEventLog::with_events(
        (1..=per_day).map(|i| served("cs-1", now() - Duration::hours(i64::from(i)))),
    );
    let engine = build(vec![set.clone()], log, AppConfig::default());
    let results = engine.evaluate_eligibility(&[set], now()).await;
    assert_eq!(
        results[0].1,
        Decision::Deny("creativeSetId cs-1 has exceeded the frequency cap of 4".into())
    );
}

#[tokio::test]
async fn default_pipeline_honours_per_day_cap_with_recent_serves() {
    let set = CreativeSet::new("cs-1", 3, 1_000).with_segment("sports");
    let recent = [now() - Duration::minutes(30), now() - Duration::hours(5)];
    let log = Arc::new(InMemoryEventLog::with_events(recent.map(|at| served("cs-1", at))));
    let catalog = Catalog::new("catalog", 1, vec![set.clone()]).expect("catalog");
    let engine = AdServingEngine::new(
        Arc::new(CatalogProvider::new(catalog)),
        log.clone(),
        AppConfig::default(),
    );

    let results = engine.evaluate_eligibility(&[set.clone()], now()).await;
    assert_eq!(results[0].1, Decision::Allow);

    log.append(served("cs-1", now() - Duration::minutes(10)))
        .await
        .expect("append");
    let results = engine.evaluate_eligibility(&[set], now()).await;
    assert_eq!(
        results[0].1,
        Decision::Deny("creativeSetId cs-1 has exceeded the frequency cap of 3".into())
    );
}

#[tokio::test]
async fn serves_older_than_the_rolling_day_are_forgotten() {
    let set = CreativeSet::new("cs-1", 3, 1_000).with_segment("sports");
    let log = InMemoryEventLog::with_events((0..3).map(|_| served("cs-1", now() - Duration::hours(25))));
    let engine = build(vec![set.clone()], log, AppConfig::default());

    let results = engine.evaluate_eligibility(&[set], now()).await;
    assert!(results[0].1.is_allowed());
}

#[tokio::test]
async fn total_max_zero_is_never_eligible() {
    let set = CreativeSet::new("cs-1", 10, 0).with_segment("sports");
    let engine = build(vec![set.clone()], InMemoryEventLog::new(), AppConfig::default());
    let results = engine.evaluate_eligibility(&[set], now()).await;
    assert!(!results[0].1.is_allowed());
}

#[tokio::test]
async fn empty_inputs() {
    let engine = build(Vec::new(), InMemoryEventLog::new(), AppConfig::default());
    assert!(engine.evaluate_eligibility(&[], now()).await.is_empty());

    let selection = engine.select_ad(&[], now()).await;
    assert_eq!(selection.result, SelectionResult::NoneEligible);

    let outcome = engine.serve(now()).await;
    assert_eq!(outcome.selection.result, SelectionResult::NoneEligible);
}

struct BrokenLog;

#[async_trait]
impl EventLog for BrokenLog {
    async fn query(&self, _filter: &EventFilter) -> AdsResult<Vec<AdEvent>> {
        Err(AdsError::EventLogUnavailable("disk detached".into()))
    }

    async fn append(&self, _event: AdEvent) -> AdsResult<()> {
        Err(AdsError::EventLogUnavailable("disk detached".into()))
    }
}

#[tokio::test]
async fn unreachable_log_shows_no_ad() {
    let sets = vec![
        CreativeSet::new("cs-1", 5, 50).with_segment("sports"),
        CreativeSet::new("cs-2", 5, 50).with_segment("travel"),
    ];
    let engine = build(sets, BrokenLog, AppConfig::default());

    let outcome = engine.serve(now()).await;
    assert_eq!(outcome.eligible, 0);
    assert_eq!(outcome.denied.len(), 2);
    assert!(outcome.denied[0].1.contains("per_day_frequency_cap"));
    assert_eq!(outcome.selection.result, SelectionResult::NoneEligible);
}

#[tokio::test]
async fn selector_degrades_to_uniform_when_stats_unavailable() {
    let sets = vec![
        CreativeSet::new("cs-1", 5, 50).with_segment("sports"),
        CreativeSet::new("cs-2", 5, 50).with_segment("travel"),
    ];
    let engine = build(sets.clone(), BrokenLog, AppConfig::default());

    let mut rng = StdRng::seed_from_u64(17);
    let selection = engine.select_ad_with_rng(&sets, now(), &mut rng).await;
    assert_eq!(selection.mode, Some(SelectionMode::Uniform));
    assert!(selection.creative_set().is_some());
}

#[tokio::test]
async fn oversized_lookback_degrades_to_uniform() {
    let sets = vec![
        CreativeSet::new("cs-1", 5, 50).with_segment("sports"),
        CreativeSet::new("cs-2", 5, 50).with_segment("travel"),
    ];
    let mut config = AppConfig::default();
    config.bandit.lookback_days = u32::MAX;
    let engine = build(sets.clone(), InMemoryEventLog::new(), config);

    let mut rng = StdRng::seed_from_u64(23);
    let selection = engine.select_ad_with_rng(&sets, now(), &mut rng).await;
    assert_eq!(selection.mode, Some(SelectionMode::Uniform));
    assert!(selection.creative_set().is_some());
}

#[tokio::test]
async fn disabled_bandit_repeats_the_same_choice() {
    let sets = vec![
        CreativeSet::new("cs-zeta", 5, 50).with_segment("travel"),
        CreativeSet::new("cs-alpha", 5, 50).with_segment("sports"),
    ];
    let mut config = AppConfig::default();
    config.bandit.enabled = false;
    let engine = build(sets.clone(), InMemoryEventLog::new(), config);

    for _ in 0..10 {
        let selection = engine.select_ad(&sets, now()).await;
        assert_eq!(
            selection.creative_set().map(|s| s.creative_set_id.as_str()),
            Some("cs-alpha")
        );
    }
}

#[tokio::test]
async fn greedy_selection_follows_click_history() {
    let sets = vec![
        CreativeSet::new("cs-a", 50, 500).with_segment("sports"),
        CreativeSet::new("cs-b", 50, 500).with_segment("travel"),
    ];
    let mut events = Vec::new();
    for day in 2..6 {
        let at = now() - Duration::days(day);
        events.push(served("cs-a", at));
        events.push(served("cs-b", at));
        events.push(clicked("cs-b", at + Duration::minutes(5)));
    }
    let mut config = AppConfig::default();
    config.bandit.epsilon = 0.0;
    let engine = build(sets, InMemoryEventLog::with_events(events), config);

    let outcome = engine.serve(now()).await;
    assert_eq!(outcome.eligible, 2);
    assert_eq!(outcome.selection.mode, Some(SelectionMode::Exploit));
    assert_eq!(
        outcome.selection.creative_set().map(|s| s.creative_set_id.as_str()),
        Some("cs-b")
    );
    let state = engine.selector().state();
    assert!((state.mean_reward("travel") - 1.0).abs() < f64::EPSILON);
    assert_eq!(state.mean_reward("sports"), 0.0);
}

#[tokio::test]
async fn catalog_swap_applies_to_later_requests() {
    let provider = Arc::new(CatalogProvider::new(
        Catalog::new(
            "catalog",
            1,
            vec![CreativeSet::new("cs-old", 5, 50).with_segment("sports")],
        )
        .expect("catalog"),
    ));
    let engine = AdServingEngine::new(
        provider.clone(),
        Arc::new(InMemoryEventLog::new()),
        AppConfig::default(),
    )
    .with_rules(caps_only());

    let before = engine.evaluate_catalog(now()).await;
    assert_eq!(before[0].0.creative_set_id, "cs-old");

    provider.install(
        Catalog::new(
            "catalog",
            2,
            vec![CreativeSet::new("cs-new", 5, 50).with_segment("sports")],
        )
        .expect("catalog"),
    );
    let after = engine.evaluate_catalog(now()).await;
    assert_eq!(allow_list(&after)[0].creative_set_id, "cs-new");
}

#[tokio::test]
async fn concurrent_requests_share_one_engine() {
    let sets: Vec<_> = (0..6)
        .map(|i| CreativeSet::new(format!("cs-{i}"), 100, 1_000).with_segment(format!("segment-{i}")))
        .collect();
    let log = Arc::new(InMemoryEventLog::new());
    let catalog = Catalog::new("catalog", 1, sets).expect("catalog");
    let engine = Arc::new(
        AdServingEngine::new(Arc::new(CatalogProvider::new(catalog)), log.clone(), AppConfig::default())
            .with_rules(caps_only()),
    );

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let engine = engine.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let outcome = engine.serve(now()).await;
                if let Some(set) = outcome.selection.creative_set() {
                    log.append(served(&set.creative_set_id, now() - Duration::seconds(1)))
                        .await
                        .expect("append");
                }
                outcome
            })
        })
        .collect();

    for handle in handles {
        let outcome = handle.await.expect("task");
        assert!(outcome.selection.creative_set().is_some());
    }
    assert_eq!(log.len(), 32);
}
