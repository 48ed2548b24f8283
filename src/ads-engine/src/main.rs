//! Ads engine. Runs one eligibility + selection decision against a catalog
//! and an ad event history supplied as JSON files.

use ads_catalog::{Catalog, CatalogProvider};
use ads_core::config::AppConfig;
use ads_core::{AdEvent, InMemoryEventLog};
use ads_serving::AdServingEngine;
use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ads-engine")]
#[command(about = "Decide whether an ad may be shown and which creative set to serve")]
#[command(version)]
struct Cli {
    /// Catalog snapshot (JSON)
    #[arg(long)]
    catalog: PathBuf,

    /// Ad event history (JSON array)
    #[arg(long)]
    events: Option<PathBuf>,

    /// Evaluation time, RFC 3339 (defaults to now)
    #[arg(long)]
    now: Option<DateTime<Utc>>,

    /// Exploration probability (overrides config)
    #[arg(long, env = "ADS_ENGINE__BANDIT__EPSILON")]
    epsilon: Option<f64>,

    /// Serve the first eligible creative set instead of running the bandit
    #[arg(long, default_value_t = false)]
    disable_bandit: bool,

    /// Operating system identifier (overrides config)
    #[arg(long, env = "ADS_ENGINE__PLATFORM")]
    platform: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ads_engine=info,ads_serving=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(epsilon) = cli.epsilon {
        config.bandit.epsilon = epsilon;
    }
    if cli.disable_bandit {
        config.bandit.enabled = false;
    }
    if let Some(platform) = cli.platform {
        config.platform = platform;
    }

    info!(
        platform = %config.platform,
        bandit_enabled = config.bandit.enabled,
        epsilon = config.bandit.epsilon,
        "Configuration loaded"
    );

    let catalog_json = std::fs::read_to_string(&cli.catalog)
        .with_context(|| format!("reading catalog {}", cli.catalog.display()))?;
    let catalog = Catalog::from_json(&catalog_json).context("parsing catalog")?;

    let events: Vec<AdEvent> = match &cli.events {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading events {}", path.display()))?;
            serde_json::from_str(&json).context("parsing events")?
        }
        None => Vec::new(),
    };
    info!(creative_sets = catalog.len(), events = events.len(), "Inputs loaded");

    let engine = AdServingEngine::new(
        Arc::new(CatalogProvider::new(catalog)),
        Arc::new(InMemoryEventLog::with_events(events)),
        config,
    );

    let now = cli.now.unwrap_or_else(Utc::now);
    let outcome = engine.serve(now).await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
