//! Ad lifecycle facts recorded by the serving pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdType {
    AdNotification,
    NewTabPageAd,
    PromotedContentAd,
    InlineContentAd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdEventType {
    Served,
    Viewed,
    Clicked,
    Dismissed,
    Converted,
}

/// Immutable record of one ad lifecycle action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdEvent {
    /// Unique per appended fact; replays of the same fact share it. Absent
    /// for records imported without one, see [`AdEvent::dedup_key`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub creative_set_id: String,
    pub ad_type: AdType,
    pub event_type: AdEventType,
    pub timestamp: DateTime<Utc>,
    /// Landing URL that triggered a `Converted` event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl AdEvent {
    pub fn new(
        creative_set_id: impl Into<String>,
        ad_type: AdType,
        event_type: AdEventType,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Some(Uuid::new_v4()),
            creative_set_id: creative_set_id.into(),
            ad_type,
            event_type,
            timestamp,
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Identity used to collapse replays. Events without an id are keyed by
    /// a name-based UUID over their content, so the same record loaded twice
    /// maps to the same key.
    pub fn dedup_key(&self) -> Uuid {
        if let Some(id) = self.id {
            return id;
        }
        let fingerprint = format!(
            "{}|{:?}|{:?}|{}|{}",
            self.creative_set_id,
            self.ad_type,
            self.event_type,
            self.timestamp.to_rfc3339(),
            self.url.as_deref().unwrap_or_default()
        );
        Uuid::new_v5(&Uuid::NAMESPACE_OID, fingerprint.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let ts = "2024-03-01T12:00:00Z".parse::<DateTime<Utc>>().expect("ts");
        let event = AdEvent::new("cs-1", AdType::NewTabPageAd, AdEventType::Served, ts);
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["ad_type"], "new_tab_page_ad");
        assert_eq!(json["event_type"], "served");
        assert!(json.get("url").is_none());
    }

    const CONVERTED: &str = r#"{"creative_set_id":"cs-1","ad_type":"ad_notification","event_type":"converted","timestamp":"2024-03-01T12:00:00Z","url":"https://shop.example.com/thanks"}"#;

    #[test]
    fn test_missing_id_keys_on_content() {
        let first: AdEvent = serde_json::from_str(CONVERTED).expect("deserialize");
        let second: AdEvent = serde_json::from_str(CONVERTED).expect("deserialize");
        assert!(first.id.is_none());
        assert_eq!(first.url.as_deref(), Some("https://shop.example.com/thanks"));
        assert_eq!(first.dedup_key(), second.dedup_key());

        let other = AdEvent {
            url: Some("https://shop.example.com/other".into()),
            ..second
        };
        assert_ne!(first.dedup_key(), other.dedup_key());
    }

    #[test]
    fn test_explicit_id_wins() {
        let ts = "2024-03-01T12:00:00Z".parse::<DateTime<Utc>>().expect("ts");
        let event = AdEvent::new("cs-1", AdType::AdNotification, AdEventType::Served, ts);
        assert_eq!(Some(event.dedup_key()), event.id);
    }
}
