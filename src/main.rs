use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use daily_divergence::config::{self, Settings};
use daily_divergence::models::{Dataset, StatsCache};
use daily_divergence::{db, divergence, ingest, report, similarity, stats};

#[derive(Parser)]
#[command(name = "daily-divergence")]
#[command(about = "Point-in-time statistics and divergence tracking for a daily log", long_about = None)]
struct Cli {
    /// Read days from this CSV instead of Postgres
    #[arg(long, global = true)]
    csv: Option<PathBuf>,
    #[arg(long, global = true, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Import days from a CSV file into Postgres
    Import {
        #[arg(long)]
        file: PathBuf,
    },
    /// Show the statistics computed for a day
    Cache {
        /// Defaults to the latest day
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Compare the overall rating with the objective index
    Divergence {
        /// Defaults to the latest day
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Classify every day instead of one
        #[arg(long, conflicts_with = "date")]
        all: bool,
        #[arg(long)]
        caution: Option<f64>,
        #[arg(long)]
        alert: Option<f64>,
    },
    /// Find historical days with a similar category profile
    Similar {
        #[arg(long)]
        date: NaiveDate,
        /// Restrict the comparison to these categories (repeatable)
        #[arg(long = "category")]
        categories: Vec<String>,
        #[arg(long)]
        exclude_days: Option<i64>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long)]
        caution: Option<f64>,
        #[arg(long)]
        alert: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = config::load_settings(&cli.config)
        .with_context(|| format!("failed to load settings from {}", cli.config.display()))?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Import { file } => {
            let dataset = ingest::load_csv(&file)?;
            let pool = connect().await?;
            let inserted = db::import_dataset(&pool, &dataset).await?;
            println!("Imported {inserted} days from {}.", file.display());
        }
        Commands::Cache { date } => {
            let (_, cache) = load(cli.csv.as_deref()).await?;
            let Some(date) = date.or(cache.last_date()) else {
                println!("No days recorded.");
                return Ok(());
            };
            let entry = cache
                .get(date)
                .with_context(|| format!("no statistics for {date}"))?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(entry)?);
                return Ok(());
            }

            println!("Statistics for {date}:");
            println!("- raw average {}", format_optional(entry.raw_avg));
            println!("- index z {}", format_optional(entry.index_z));
            println!("- overall z {}", format_optional(entry.overall_z));
            let mut ranked: Vec<_> = entry.ranks.iter().collect();
            ranked.sort_by_key(|(_, rank)| **rank);
            for (name, rank) in ranked {
                println!("  #{rank} {name}: z {:+.2}", entry.z_scores[name]);
            }
        }
        Commands::Divergence {
            date,
            all,
            caution,
            alert,
        } => {
            let thresholds = thresholds(&settings, caution, alert)?;
            let (_, cache) = load(cli.csv.as_deref()).await?;

            if all {
                let timeline = divergence::divergence_timeline(&cache, &thresholds);
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&timeline)?);
                    return Ok(());
                }
                for (date, result) in &timeline {
                    println!(
                        "{date} gap {:+.2} ({})",
                        result.gap,
                        result.status.as_str()
                    );
                }
                return Ok(());
            }

            let Some(date) = date.or(cache.last_date()) else {
                println!("No days recorded.");
                return Ok(());
            };
            match divergence::classify_divergence(&cache, date, &thresholds) {
                Some(result) if cli.json => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                Some(result) => {
                    println!(
                        "{date}: overall z {:.2}, index z {:.2}, gap {:+.2}, divergence {:.2} ({})",
                        result.overall_z,
                        result.index_z,
                        result.gap,
                        result.divergence,
                        result.status.as_str()
                    );
                }
                None => println!("{date}: not enough data."),
            }
        }
        Commands::Similar {
            date,
            categories,
            exclude_days,
            limit,
        } => {
            let (dataset, cache) = load(cli.csv.as_deref()).await?;
            let query = similarity::SimilarityQuery {
                reference: date,
                categories: if categories.is_empty() {
                    dataset.categories.clone()
                } else {
                    categories
                },
                exclude_window_days: exclude_days
                    .unwrap_or(settings.similarity.exclude_window_days),
                top_n: limit.unwrap_or(settings.similarity.top_n),
            };

            let Some(matches) = similarity::find_similar_days(&cache, &dataset.records, &query)
            else {
                println!("No statistics for {date}.");
                return Ok(());
            };

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&matches)?);
                return Ok(());
            }
            if matches.is_empty() {
                println!("No comparable days found.");
                return Ok(());
            }

            println!("Days most like {date}:");
            for found in &matches {
                println!(
                    "- {} similarity {:.1}% (distance {:.2} over {} categories), overall {}: {}",
                    found.date,
                    found.similarity,
                    found.distance,
                    found.categories_compared,
                    found.overall,
                    found.note
                );
            }
        }
        Commands::Report {
            out,
            caution,
            alert,
        } => {
            let thresholds = thresholds(&settings, caution, alert)?;
            let (dataset, cache) = load(cli.csv.as_deref()).await?;
            let report = report::build_report(&dataset, &cache, &settings, &thresholds);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set unless --csv is given")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load(csv: Option<&Path>) -> anyhow::Result<(Dataset, StatsCache)> {
    let dataset = match csv {
        Some(path) => ingest::load_csv(path)?,
        None => db::fetch_dataset(&connect().await?).await?,
    };
    let cache = stats::build_cache(&dataset.records, &dataset.categories)?;
    Ok((dataset, cache))
}

fn thresholds(
    settings: &Settings,
    caution: Option<f64>,
    alert: Option<f64>,
) -> anyhow::Result<divergence::Thresholds> {
    let thresholds = divergence::Thresholds::new(
        caution.unwrap_or(settings.divergence.caution),
        alert.unwrap_or(settings.divergence.alert),
    )?;
    Ok(thresholds)
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |value| format!("{value:.2}"))
}
