//! Catalog snapshot: creative sets with their caps, targeting and
//! conversion definitions. Immutable once constructed.

use ads_core::{AdsError, AdsResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSegment {
    pub code: String,
    /// Taxonomy path, parent first: `technology & computing-computing`.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogOs {
    pub code: String,
    pub name: String,
}

/// Opaque reference to a creative ad payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreativeAdRef {
    pub creative_instance_id: String,
}

/// Reward attribution rule. Never consulted for eligibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversion {
    #[serde(default = "default_conversion_type")]
    pub conversion_type: String,
    /// Glob over landing URLs, e.g. `https://*.example.com/thanks*`.
    pub url_pattern: String,
    pub observation_window_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreativeSet {
    pub creative_set_id: String,
    /// Impressions allowed in any trailing 24 hours; 0 allows none.
    #[serde(default)]
    pub per_day: u32,
    /// Impressions allowed since `created_at`; 0 allows none.
    #[serde(default)]
    pub total_max: u32,
    #[serde(default)]
    pub segments: Vec<CatalogSegment>,
    #[serde(default)]
    pub oses: Vec<CatalogOs>,
    #[serde(default)]
    pub creative_ad_notifications: Vec<CreativeAdRef>,
    #[serde(default)]
    pub creative_new_tab_page_ads: Vec<CreativeAdRef>,
    #[serde(default)]
    pub conversions: Vec<Conversion>,
    #[serde(default = "default_created_at")]
    pub created_at: DateTime<Utc>,
}

fn default_conversion_type() -> String {
    "postview".to_string()
}

fn default_created_at() -> DateTime<Utc> {
    DateTime::<Utc>::MIN_UTC
}

impl CreativeSet {
    pub fn new(creative_set_id: impl Into<String>, per_day: u32, total_max: u32) -> Self {
        Self {
            creative_set_id: creative_set_id.into(),
            per_day,
            total_max,
            segments: Vec::new(),
            oses: Vec::new(),
            creative_ad_notifications: Vec::new(),
            creative_new_tab_page_ads: Vec::new(),
            conversions: Vec::new(),
            created_at: default_created_at(),
        }
    }

    pub fn with_segment(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.segments.push(CatalogSegment {
            code: name.clone(),
            name,
        });
        self
    }

    pub fn with_os(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.oses.push(CatalogOs {
            code: name.clone(),
            name,
        });
        self
    }

    pub fn with_conversion(mut self, url_pattern: impl Into<String>, window_days: u32) -> Self {
        self.conversions.push(Conversion {
            conversion_type: default_conversion_type(),
            url_pattern: url_pattern.into(),
            observation_window_days: window_days,
        });
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Bandit arm identity. `None` for sets that can never be selected.
    pub fn primary_segment(&self) -> Option<&str> {
        self.segments.first().map(|s| s.name.as_str())
    }

    /// `technology` matches both `technology` and `technology-computing`.
    pub fn matches_segment(&self, segment: &str) -> bool {
        self.segments.iter().any(|s| {
            s.name.eq_ignore_ascii_case(segment)
                || s
                    .name
                    .to_ascii_lowercase()
                    .strip_prefix(&segment.to_ascii_lowercase())
                    .is_some_and(|rest| rest.starts_with('-'))
        })
    }

    /// A set without OS targets runs everywhere.
    pub fn supports_os(&self, os: &str) -> bool {
        self.oses.is_empty()
            || self
                .oses
                .iter()
                .any(|o| o.code.eq_ignore_ascii_case(os) || o.name.eq_ignore_ascii_case(os))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub catalog_id: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub ping_ms: u64,
    #[serde(default)]
    creative_sets: Vec<CreativeSet>,
}

impl Catalog {
    pub fn new(
        catalog_id: impl Into<String>,
        version: u32,
        creative_sets: Vec<CreativeSet>,
    ) -> AdsResult<Self> {
        let catalog = Self {
            catalog_id: catalog_id.into(),
            version,
            ping_ms: 0,
            creative_sets,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_json(json: &str) -> AdsResult<Self> {
        let catalog: Catalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> AdsResult<()> {
        let mut seen = HashSet::new();
        for set in &self.creative_sets {
            if set.creative_set_id.is_empty() {
                return Err(AdsError::InvalidCatalog(
                    "creative set with empty id".to_string(),
                ));
            }
            if !seen.insert(set.creative_set_id.as_str()) {
                return Err(AdsError::InvalidCatalog(format!(
                    "duplicate creative set id {}",
                    set.creative_set_id
                )));
            }
        }
        Ok(())
    }

    pub fn creative_sets(&self) -> &[CreativeSet] {
        &self.creative_sets
    }

    pub fn get(&self, creative_set_id: &str) -> AdsResult<&CreativeSet> {
        self.creative_sets
            .iter()
            .find(|s| s.creative_set_id == creative_set_id)
            .ok_or_else(|| AdsError::NotFound(format!("creative set {creative_set_id}")))
    }

    pub fn filter_by_segment(&self, segment: &str) -> Vec<&CreativeSet> {
        self.creative_sets
            .iter()
            .filter(|s| s.matches_segment(segment))
            .collect()
    }

    pub fn filter_by_os(&self, os: &str) -> Vec<&CreativeSet> {
        self.creative_sets
            .iter()
            .filter(|s| s.supports_os(os))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.creative_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creative_sets.is_empty()
    }
}
