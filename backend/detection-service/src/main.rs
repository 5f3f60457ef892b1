//! Detection Service - Main entry point
//!
//! One-shot worker around the AI detection pipeline.
//!
//! # Modes
//! - `detect` (default): Run detection over `--images` and print the
//!   result plus assembled booking line items as JSON
//! - `stats`: Print the current budget snapshot
//! - `reset-hourly` / `reset-daily`: Clear the usage counters

use anyhow::{bail, Context, Result};
use std::env;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use detection_service::{
    map_category, BookingLineItem, BudgetTracker, CategoryEntry, Config, DetectionCache,
    DetectionOrchestrator, ImageReference, ItemAssembler, KeyValueStore, MemoryStore,
    OpenAiVisionClient, RedisStore, Taxonomy, VisionDetector,
};

/// Service run mode
#[derive(Debug, Clone, PartialEq)]
enum RunMode {
    /// Default: one-shot detection over CLI-supplied image references
    Detect,
    /// Print the budget snapshot
    Stats,
    /// Clear the hourly usage counter
    ResetHourly,
    /// Clear the daily usage counter
    ResetDaily,
}

impl RunMode {
    fn from_args() -> Self {
        let args: Vec<String> = env::args().collect();

        for i in 0..args.len() {
            if args[i] == "--mode" && i + 1 < args.len() {
                return match args[i + 1].as_str() {
                    "detect" => RunMode::Detect,
                    "stats" => RunMode::Stats,
                    "reset-hourly" => RunMode::ResetHourly,
                    "reset-daily" => RunMode::ResetDaily,
                    other => {
                        warn!("Unknown mode '{}', using default 'detect'", other);
                        RunMode::Detect
                    }
                };
            }
        }

        RunMode::Detect
    }
}

fn arg_value(name: &str) -> Option<String> {
    let args: Vec<String> = env::args().collect();
    for i in 0..args.len() {
        if args[i] == name && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "detection_service=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mode = RunMode::from_args();
    info!("Starting Detection Service in {:?} mode", mode);

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    // Shared store for the cache and budget counters
    let store: Arc<dyn KeyValueStore> = if config.redis_url.is_empty() {
        warn!("REDIS_URL not set, using in-process store");
        Arc::new(MemoryStore::new())
    } else {
        let pool = redis_utils::RedisPool::connect(&config.redis_url)
            .await
            .map_err(|e| {
                error!("Failed to connect to Redis: {}", e);
                anyhow::anyhow!("Redis connection error: {}", e)
            })?;
        Arc::new(RedisStore::new(pool.manager()))
    };

    let budget = BudgetTracker::new(store.clone(), &config);

    match mode {
        RunMode::Detect => run_detect_mode(&config, store, budget).await,
        RunMode::Stats => {
            let stats = budget.stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        RunMode::ResetHourly => {
            budget.reset_hourly().await;
            Ok(())
        }
        RunMode::ResetDaily => {
            budget.reset_daily().await;
            Ok(())
        }
    }
}

/// Run one detection and print the result plus assembled line items.
async fn run_detect_mode(
    config: &Config,
    store: Arc<dyn KeyValueStore>,
    budget: BudgetTracker,
) -> Result<()> {
    let raw_images = arg_value("--images")
        .context("--images is required in detect mode (comma-separated URLs or data URIs)")?;
    let images: Vec<ImageReference> = raw_images
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ImageReference::parse)
        .collect();
    if images.is_empty() {
        bail!("No image references provided");
    }

    let booking_id: i64 = match arg_value("--booking-id") {
        Some(raw) => raw.parse().context("Invalid --booking-id")?,
        None => 0,
    };

    let taxonomy = load_taxonomy(config)?;

    let vision = Arc::new(OpenAiVisionClient::new(config));
    if !vision.is_configured() {
        info!("OpenAI API key not configured - the deterministic stub will be used");
    }

    let orchestrator = DetectionOrchestrator::new(
        vision,
        DetectionCache::new(store),
        budget,
        config,
    );

    let result = orchestrator.detect_items(&images).await;

    // Map and assemble per item, the way the booking flow consumes results.
    let line_items: Vec<BookingLineItem> = result
        .enhanced_items
        .iter()
        .map(|item| {
            let mapping = map_category(item, &taxonomy);
            let mut line = ItemAssembler::to_line_item(
                item,
                booking_id,
                mapping.category_id,
                mapping.size_id,
            );
            line.ai_metadata = ItemAssembler::to_metadata_json(item);
            line
        })
        .collect();

    info!(
        items = result.items.len(),
        from_cache = result.from_cache,
        manual_input_required = result.manual_input_required,
        manual_review_required = result.manual_review_required,
        "Detection finished"
    );

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "detection": result,
            "line_items": line_items,
        }))?
    );

    Ok(())
}

fn load_taxonomy(config: &Config) -> Result<Taxonomy> {
    match &config.taxonomy_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read taxonomy file {path}"))?;
            let categories: Vec<CategoryEntry> =
                serde_json::from_str(&raw).context("Invalid taxonomy file")?;
            info!(categories = categories.len(), "Taxonomy loaded from file");
            Ok(Taxonomy::new(categories))
        }
        None => Ok(Taxonomy::default_catalog()),
    }
}
