use serde::Deserialize;

/// Root engine configuration. Loaded from environment variables
/// with the prefix `ADS_ENGINE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Operating system identifier matched against catalog OS targets.
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default)]
    pub bandit: BanditFeatureConfig,
    #[serde(default)]
    pub attribution: AttributionConfig,
    #[serde(default)]
    pub frequency_caps: FrequencyCapConfig,
    #[serde(default)]
    pub catalog: CatalogRefreshConfig,
}

/// Feature switches consumed by the selector.
pub trait FeatureConfig: Send + Sync {
    fn is_bandit_enabled(&self) -> bool;

    /// Exploration probability, always within `[0, 1]`.
    fn epsilon(&self) -> f64;
}

#[derive(Debug, Clone, Deserialize)]
pub struct BanditFeatureConfig {
    #[serde(default = "default_bandit_enabled")]
    pub enabled: bool,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Days of event history folded into the bandit state.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttributionConfig {
    #[serde(default = "default_window_hours")]
    pub default_window_hours: u32,
}

/// Global caps. A value of zero leaves the corresponding rule unregistered;
/// per-set `per_day`/`total_max` caps come from the catalog instead.
#[derive(Debug, Clone, Deserialize)]
pub struct FrequencyCapConfig {
    #[serde(default)]
    pub per_hour: u32,
    #[serde(default)]
    pub per_week: u32,
    #[serde(default = "default_new_tab_page_ads_per_day")]
    pub new_tab_page_ads_per_day: u32,
    #[serde(default)]
    pub dismissed_per_day: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogRefreshConfig {
    #[serde(default = "default_retry_short_secs")]
    pub retry_short_secs: u64,
    #[serde(default = "default_failure_delay_secs")]
    pub failure_delay_secs: u64,
    #[serde(default = "default_success_base_secs")]
    pub success_base_secs: u64,
    #[serde(default = "default_jitter_secs")]
    pub jitter_secs: u64,
}

impl FeatureConfig for BanditFeatureConfig {
    fn is_bandit_enabled(&self) -> bool {
        self.enabled
    }

    fn epsilon(&self) -> f64 {
        if self.epsilon.is_nan() {
            return default_epsilon();
        }
        self.epsilon.clamp(0.0, 1.0)
    }
}

// Default functions
fn default_platform() -> String {
    "linux".to_string()
}
fn default_bandit_enabled() -> bool {
    true
}
fn default_epsilon() -> f64 {
    0.25
}
fn default_lookback_days() -> u32 {
    30
}
fn default_window_hours() -> u32 {
    48
}
fn default_new_tab_page_ads_per_day() -> u32 {
    20
}
fn default_retry_short_secs() -> u64 {
    90
}
fn default_failure_delay_secs() -> u64 {
    10 * 60
}
fn default_success_base_secs() -> u64 {
    3 * 60 * 60
}
fn default_jitter_secs() -> u64 {
    10 * 60
}

impl Default for BanditFeatureConfig {
    fn default() -> Self {
        Self {
            enabled: default_bandit_enabled(),
            epsilon: default_epsilon(),
            lookback_days: default_lookback_days(),
        }
    }
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            default_window_hours: default_window_hours(),
        }
    }
}

impl Default for FrequencyCapConfig {
    fn default() -> Self {
        Self {
            per_hour: 0,
            per_week: 0,
            new_tab_page_ads_per_day: default_new_tab_page_ads_per_day(),
            dismissed_per_day: 0,
        }
    }
}

impl Default for CatalogRefreshConfig {
    fn default() -> Self {
        Self {
            retry_short_secs: default_retry_short_secs(),
            failure_delay_secs: default_failure_delay_secs(),
            success_base_secs: default_success_base_secs(),
            jitter_secs: default_jitter_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            bandit: BanditFeatureConfig::default(),
            attribution: AttributionConfig::default(),
            frequency_caps: FrequencyCapConfig::default(),
            catalog: CatalogRefreshConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("ADS_ENGINE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
