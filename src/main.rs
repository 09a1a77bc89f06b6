use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod aggregate;
mod dataset;
mod db;
mod filters;
mod models;
mod report;

use filters::DashboardFilters;
use models::DashboardData;

#[derive(Parser)]
#[command(name = "call-eval-dashboard")]
#[command(about = "Dashboard analytics aggregator for call evaluations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FilterArgs {
    /// Organization id (hyphenated UUID)
    #[arg(long)]
    org: String,
    /// Window start, RFC 3339 or YYYY-MM-DD (default: 30 days ago)
    #[arg(long)]
    start_date: Option<String>,
    /// Window end, RFC 3339 or YYYY-MM-DD (default: now)
    #[arg(long)]
    end_date: Option<String>,
    /// Comma-separated technician ids; malformed entries are dropped
    #[arg(long)]
    technician_ids: Option<String>,
    /// Comma-separated criteria ids; malformed entries are dropped
    #[arg(long)]
    criteria_ids: Option<String>,
    /// Include synthetic mock calls, excluded by default
    #[arg(long)]
    include_mock: bool,
}

impl FilterArgs {
    fn resolve(&self) -> anyhow::Result<DashboardFilters> {
        filters::resolve(
            &self.org,
            self.start_date.as_deref(),
            self.end_date.as_deref(),
            self.technician_ids.as_deref(),
            self.criteria_ids.as_deref(),
            if self.include_mock { Some("false") } else { None },
            Utc::now(),
        )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import evaluation results from a CSV file
    Import {
        #[arg(long)]
        org: String,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Compute the dashboard aggregate and emit it as JSON
    Dashboard {
        #[command(flatten)]
        filters: FilterArgs,
        /// Write the payload to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Render the dashboard aggregate as a markdown report
    Report {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = "dashboard.md")]
        out: PathBuf,
    },
}

/// One aggregation pass. The current window, the comparison window, and the
/// reference lists are independent reads, so they are fetched concurrently;
/// any failure aborts the whole request.
async fn load_dashboard(
    pool: &PgPool,
    filters: &DashboardFilters,
) -> anyhow::Result<DashboardData> {
    let (technicians, criteria, current, previous) = tokio::try_join!(
        db::fetch_technicians(pool, filters.organization_id),
        db::fetch_criteria(pool, filters.organization_id),
        db::fetch_period_data(pool, filters, filters.start, filters.end),
        db::fetch_period_data(pool, filters, filters.prev_start, filters.prev_end),
    )?;

    Ok(aggregate::build_dashboard(
        filters,
        &current,
        &previous,
        &technicians,
        &criteria,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
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
            println!("Seed data inserted (organization {}).", db::SEED_ORG_ID);
        }
        Commands::Import { org, csv } => {
            let org_id = filters::parse_entity_id(&org)
                .with_context(|| format!("invalid organization id: {org:?}"))?;
            let inserted = db::import_csv(&pool, org_id, &csv).await?;
            println!("Inserted {inserted} results from {}.", csv.display());
        }
        Commands::Dashboard { filters, out } => {
            let filters = filters.resolve()?;
            let data = load_dashboard(&pool, &filters).await?;
            let payload = serde_json::to_string_pretty(&data)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, payload)?;
                    println!("Dashboard written to {}.", path.display());
                }
                None => println!("{payload}"),
            }
        }
        Commands::Report { filters, out } => {
            let filters = filters.resolve()?;
            let data = load_dashboard(&pool, &filters).await?;
            std::fs::write(&out, report::build_report(&filters, &data))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
