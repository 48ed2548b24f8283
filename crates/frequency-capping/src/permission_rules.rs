//! Permission rules. Each rule reads the creative set and the ad event log
//! and allows or denies with a human-readable reason.

use crate::decision::Decision;
use ads_catalog::CreativeSet;
use ads_core::{AdEventType, AdType, AdsResult, EventFilter, EventLog};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Trailing counting windows. All are rolling, ending at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CappingWindow {
    PerHour,
    PerDay,
    PerWeek,
    /// From the creative set's `created_at` up to now.
    SinceCreation,
}

impl CappingWindow {
    pub fn start(&self, now: DateTime<Utc>, set: &CreativeSet) -> DateTime<Utc> {
        match self {
            CappingWindow::PerHour => now - Duration::hours(1),
            CappingWindow::PerDay => now - Duration::days(1),
            CappingWindow::PerWeek => now - Duration::weeks(1),
            CappingWindow::SinceCreation => set.created_at.min(now),
        }
    }
}

/// Registered in [`PermissionRule::order`] sequence by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule")]
pub enum PermissionRule {
    SupportedOs { platform: String },
    HasSegments,
    PerHourFrequencyCap { cap: u32 },
    PerDayFrequencyCap,
    PerWeekFrequencyCap { cap: u32 },
    TotalMaxFrequencyCap,
    DismissedFrequencyCap { cap: u32 },
    NewTabPageAdsPerDay { cap: u32 },
}

impl PermissionRule {
    pub fn name(&self) -> &'static str {
        match self {
            PermissionRule::SupportedOs { .. } => "supported_os",
            PermissionRule::HasSegments => "has_segments",
            PermissionRule::PerHourFrequencyCap { .. } => "per_hour_frequency_cap",
            PermissionRule::PerDayFrequencyCap => "per_day_frequency_cap",
            PermissionRule::PerWeekFrequencyCap { .. } => "per_week_frequency_cap",
            PermissionRule::TotalMaxFrequencyCap => "total_max_frequency_cap",
            PermissionRule::DismissedFrequencyCap { .. } => "dismissed_frequency_cap",
            PermissionRule::NewTabPageAdsPerDay { .. } => "new_tab_page_ads_per_day",
        }
    }

    /// Position in the evaluation pipeline. Targeting gates run before any
    /// rule that needs the event log.
    pub fn order(&self) -> u8 {
        match self {
            PermissionRule::SupportedOs { .. } => 0,
            PermissionRule::HasSegments => 1,
            PermissionRule::PerHourFrequencyCap { .. } => 2,
            PermissionRule::PerDayFrequencyCap => 3,
            PermissionRule::PerWeekFrequencyCap { .. } => 4,
            PermissionRule::TotalMaxFrequencyCap => 5,
            PermissionRule::DismissedFrequencyCap { .. } => 6,
            PermissionRule::NewTabPageAdsPerDay { .. } => 7,
        }
    }

    pub async fn evaluate<L: EventLog + ?Sized>(
        &self,
        set: &CreativeSet,
        log: &L,
        now: DateTime<Utc>,
    ) -> AdsResult<Decision> {
        match self {
            PermissionRule::SupportedOs { platform } => Ok(if set.supports_os(platform) {
                Decision::Allow
            } else {
                Decision::Deny(format!(
                    "creativeSetId {} does not support {}",
                    set.creative_set_id, platform
                ))
            }),
            PermissionRule::HasSegments => Ok(if set.segments.is_empty() {
                Decision::Deny(format!(
                    "creativeSetId {} has no segments",
                    set.creative_set_id
                ))
            } else {
                Decision::Allow
            }),
            PermissionRule::PerHourFrequencyCap { cap } => {
                creative_set_cap(set, log, now, CappingWindow::PerHour, AdEventType::Served, *cap)
                    .await
                    .map(|d| d.qualified("per hour"))
            }
            PermissionRule::PerDayFrequencyCap => {
                creative_set_cap(
                    set,
                    log,
                    now,
                    CappingWindow::PerDay,
                    AdEventType::Served,
                    set.per_day,
                )
                .await
            }
            PermissionRule::PerWeekFrequencyCap { cap } => {
                creative_set_cap(set, log, now, CappingWindow::PerWeek, AdEventType::Served, *cap)
                    .await
                    .map(|d| d.qualified("per week"))
            }
            PermissionRule::TotalMaxFrequencyCap => {
                creative_set_cap(
                    set,
                    log,
                    now,
                    CappingWindow::SinceCreation,
                    AdEventType::Served,
                    set.total_max,
                )
                .await
            }
            PermissionRule::DismissedFrequencyCap { cap } => {
                creative_set_cap(
                    set,
                    log,
                    now,
                    CappingWindow::PerDay,
                    AdEventType::Dismissed,
                    *cap,
                )
                .await
                .map(|d| d.qualified("dismissals per day"))
            }
            PermissionRule::NewTabPageAdsPerDay { cap } => {
                if set.creative_new_tab_page_ads.is_empty() {
                    return Ok(Decision::Allow);
                }
                if *cap > 0 {
                    let filter = EventFilter::new(CappingWindow::PerDay.start(now, set), now)
                        .event_type(AdEventType::Viewed)
                        .ad_type(AdType::NewTabPageAd);
                    let viewed = log.query(&filter).await?.len();
                    if viewed < *cap as usize {
                        return Ok(Decision::Allow);
                    }
                }
                Ok(Decision::Deny(
                    "You have exceeded the allowed new tab page ads per day".to_string(),
                ))
            }
        }
    }
}

/// Count `event_type` events of this set inside `window` and compare with `cap`.
/// A cap of zero denies without consulting the log.
async fn creative_set_cap<L: EventLog + ?Sized>(
    set: &CreativeSet,
    log: &L,
    now: DateTime<Utc>,
    window: CappingWindow,
    event_type: AdEventType,
    cap: u32,
) -> AdsResult<Decision> {
    if cap > 0 {
        let filter = EventFilter::new(window.start(now, set), now)
            .event_type(event_type)
            .creative_set(set.creative_set_id.clone());
        let count = log.query(&filter).await?.len();
        if count < cap as usize {
            return Ok(Decision::Allow);
        }
    }
    Ok(Decision::Deny(format!(
        "creativeSetId {} has exceeded the frequency cap of {}",
        set.creative_set_id, cap
    )))
}
