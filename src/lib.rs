pub mod calibration;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod sensing;
pub mod settings;
pub mod study;
pub mod tracking;
mod utils;

use std::path::PathBuf;

use anyhow::Context;
use settings::SettingsStore;

pub use pipeline::{StudyPipeline, StudyReport};

const DEFAULT_SETTINGS_FILE: &str = "physio_settings.json";

pub fn run() -> anyhow::Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("physio-tracker starting up...");

    let settings_path = std::env::var_os("PHYSIO_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
    let settings_store = SettingsStore::new(settings_path)?;
    let settings = settings_store.get().with_env_overrides();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let plan = study::StudyPlan::default();
    let report = runtime.block_on(study::run_study(
        &settings,
        study::default_sensor(rand::random()),
        study::default_scene(),
        &plan,
    ))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to serialise study report")?
    );
    Ok(())
}
