use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use exam_analytics::db;
use exam_analytics::export;
use exam_analytics::models::SubjectSet;
use exam_analytics::progress::progress_analysis;
use exam_analytics::ranks::historical_ranks;
use exam_analytics::report;
use exam_analytics::settings::parse_full_score;
use exam_analytics::snapshot::period_snapshot;
use exam_analytics::thresholds::{ThresholdEntry, ThresholdMode};

#[derive(Parser)]
#[command(name = "exam-analytics")]
#[command(about = "Exam rank, distribution and progress analytics for Group Scholar", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo roster and thresholds
    Seed,
    /// Merge a JSON export into the stored roster
    Import {
        #[arg(long)]
        json: PathBuf,
    },
    /// Update the admission thresholds
    Configure {
        #[arg(long, default_value = "rank")]
        mode: ThresholdMode,
        /// Category cutoff as Label=value, tightest first
        #[arg(long = "threshold")]
        thresholds: Vec<ThresholdEntry>,
        /// Rank lines for class comparisons
        #[arg(long = "compare")]
        comparison_thresholds: Vec<u32>,
        /// Full score override as Subject=value
        #[arg(long = "full-score", value_parser = parse_full_score)]
        full_scores: Vec<(String, f64)>,
    },
    /// Generate a markdown report for one period
    Report {
        #[arg(long)]
        period: String,
        #[arg(long = "class")]
        classes: Vec<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Show the biggest rank climbs between two periods
    Progress {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Write rank progress between two periods as CSV
    Export {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Write one period's ranked results as CSV
    Snapshot {
        #[arg(long)]
        period: String,
        #[arg(long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::debug!("Starting exam-analytics v{}", env!("CARGO_PKG_VERSION"));

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { json } => {
            let imported = db::import_json(&pool, &json).await?;
            println!("Imported {imported} students from {}.", json.display());
        }
        Commands::Configure {
            mode,
            thresholds,
            comparison_thresholds,
            full_scores,
        } => {
            let mut settings = db::load_workspace(&pool).await?.settings;
            settings.mode = mode;
            settings.thresholds = thresholds;
            if !comparison_thresholds.is_empty() {
                settings.comparison_thresholds = comparison_thresholds;
            }
            settings.full_scores.extend(full_scores);
            db::save_settings(&pool, &settings).await?;
            println!(
                "Saved {} {} thresholds.",
                settings.thresholds.len(),
                settings.mode
            );
        }
        Commands::Report {
            period,
            classes,
            out,
        } => {
            let workspace = db::load_workspace(&pool).await?;
            let selected = (!classes.is_empty()).then_some(classes.as_slice());
            let report = report::build_report(
                &workspace.students,
                &period,
                selected,
                &workspace.settings,
                Utc::now().date_naive(),
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Progress { from, to, limit } => {
            let workspace = db::load_workspace(&pool).await?;
            let ranks = historical_ranks(&workspace.students);
            let rows = progress_analysis(&workspace.students, &from, &to, &ranks);

            if rows.is_empty() {
                println!("No students were ranked in both {from} and {to}.");
                return Ok(());
            }

            println!("Biggest rank climbs from {from} to {to}:");
            for row in rows.iter().take(limit) {
                println!(
                    "- {} ({}) {} -> {} ({:+}, coefficient {:.2}, streak {})",
                    row.name,
                    row.class_name,
                    row.rank_from,
                    row.rank_to,
                    row.rank_change,
                    row.coefficient,
                    row.streak
                );
            }
        }
        Commands::Export { from, to, out } => {
            let workspace = db::load_workspace(&pool).await?;
            let ranks = historical_ranks(&workspace.students);
            let rows = progress_analysis(&workspace.students, &from, &to, &ranks);
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            export::write_progress_csv(file, &rows)?;
            println!("Wrote {} rows to {}.", rows.len(), out.display());
        }
        Commands::Snapshot { period, out } => {
            let workspace = db::load_workspace(&pool).await?;
            let ranks = historical_ranks(&workspace.students);
            let rows = period_snapshot(&workspace.students, &period, &ranks);
            let subjects = SubjectSet::from_students(&workspace.students);
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            export::write_period_csv(file, &rows, &subjects)?;
            println!("Wrote {period} results to {}.", out.display());
        }
    }

    Ok(())
}
