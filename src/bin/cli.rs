//! Tyrecast CLI - Command-line interface for dataset building and predictions

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tyrecast::assets::{AssetConfig, ModelAssets};
use tyrecast::data::laps;
use tyrecast::data::{write_dataset, LapFeatureExtractor, LapTable, TelemetryFetcher, TelemetryStore};
use tyrecast::predictor;

#[derive(Parser)]
#[command(name = "tyrecast")]
#[command(author, version, about = "Tyre compound dataset and prediction CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a per-lap feature dataset for one driver
    Extract {
        /// Path to the session lap table CSV (all drivers)
        #[arg(short, long)]
        laps: PathBuf,

        /// Target driver code (e.g. LEC)
        #[arg(short, long)]
        driver: String,

        /// Directory of per-lap telemetry CSVs (<DRIVER>_lap_<N>.csv)
        #[arg(short, long)]
        telemetry: Option<PathBuf>,

        /// Output dataset CSV path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List driver codes present in a lap table
    Drivers {
        /// Path to the session lap table CSV
        #[arg(short, long)]
        laps: PathBuf,
    },

    /// Predict the tyre compound from a JSON file of raw field values
    Predict {
        /// JSON object mapping field names to raw values
        #[arg(short, long)]
        input: PathBuf,

        /// Directory holding scaler.json, the encoders and model.onnx
        #[arg(long, default_value = "assets")]
        asset_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    println!("{}", "Tyrecast CLI".cyan().bold());
    println!();

    match cli.command {
        Commands::Extract {
            laps,
            driver,
            telemetry,
            output,
        } => run_extract(&laps, &driver, telemetry.as_deref(), &output),
        Commands::Drivers { laps } => run_drivers(&laps),
        Commands::Predict { input, asset_dir } => run_predict(&input, &asset_dir),
    }
}

fn run_extract(
    laps_path: &Path,
    driver: &str,
    telemetry_dir: Option<&Path>,
    output: &Path,
) -> Result<()> {
    println!("{}: {} from {:?}", "Extracting".green(), driver, laps_path);

    let table = LapTable::load(laps_path)
        .with_context(|| format!("Failed to load lap table from {:?}", laps_path))?;
    let extractor = LapFeatureExtractor::new(&table);

    let store = telemetry_dir.map(TelemetryStore::new);
    let fetcher = store.as_ref().map(|s| s as &dyn TelemetryFetcher);

    let lap_numbers = extractor.driver_laps(driver);
    if lap_numbers.is_empty() {
        println!(
            "{}",
            format!("No laps found for driver {}.", driver).red()
        );
    }

    let pb = ProgressBar::new(lap_numbers.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut rows = Vec::with_capacity(lap_numbers.len());
    for lap in &lap_numbers {
        pb.set_message(format!("lap {}", lap));
        if let Some(row) = extractor.derive_lap(driver, *lap, fetcher) {
            rows.push(row);
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    write_dataset(&rows, output)
        .with_context(|| format!("Failed to write dataset to {:?}", output))?;

    println!(
        "{} {} laps -> {}",
        "Saved".green().bold(),
        rows.len(),
        output.display()
    );
    Ok(())
}

fn run_drivers(laps_path: &Path) -> Result<()> {
    let table = LapTable::load(laps_path)
        .with_context(|| format!("Failed to load lap table from {:?}", laps_path))?;

    let driver_col = table.resolve(laps::DRIVER_COLUMNS);
    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in 0..table.height() {
        if let Some(code) = laps::as_code(&table.value(driver_col, row)) {
            *counts.entry(code).or_default() += 1;
        }
    }

    if counts.is_empty() {
        println!("{}", "No drivers found.".red());
        return Ok(());
    }

    let mut drivers: Vec<(String, usize)> = counts.into_iter().collect();
    drivers.sort();

    println!("{}", "Drivers:".yellow().bold());
    println!("{:>8} {:>6}", "code", "laps");
    println!("{}", "-".repeat(16));
    for (code, count) in drivers {
        println!("{:>8} {:>6}", code, count);
    }
    Ok(())
}

fn run_predict(input: &Path, asset_dir: &Path) -> Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read input from {:?}", input))?;
    let raw: HashMap<String, serde_json::Value> =
        serde_json::from_str(&text).context("Input must be a JSON object of field values")?;

    let fields: HashMap<String, String> = raw
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect();

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message("Loading model assets...");

    let config = AssetConfig::new(asset_dir);
    let assets = ModelAssets::load(&config)
        .with_context(|| format!("Failed to load model assets from {:?}", asset_dir))?;
    pb.finish_and_clear();

    let prediction = predictor::predict(&assets, &fields)?;

    println!(
        "{}: {}  (soft probability {:.4})",
        "Predicted compound".green(),
        prediction.compound.to_uppercase().bold(),
        prediction.probability
    );
    Ok(())
}
