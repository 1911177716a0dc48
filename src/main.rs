mod align;
mod config;
mod error;
mod loader;
mod metrics;
mod models;
mod notion;
mod pipeline;
mod sources;
mod utils;

use anyhow::{Context, Result, bail};
use chrono::{Days, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;
use crate::loader::prices::PriceStore;
use crate::notion::upsert::UpsertClient;
use crate::notion::{NotionClient, schema};
use crate::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "hh-sync", about = "Solar HH generation → document store sync", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Integration token (falls back to config, then .env)
    #[arg(long, env = "NOTION_TOKEN", global = true, hide_env_values = true)]
    notion_token: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Sync a date range into the collection (default: the two most recent days)
    Sync {
        /// First date to sync (YYYY-MM-DD); defaults to `end` minus `days`
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last date to sync (YYYY-MM-DD); defaults to yesterday
        #[arg(long)]
        end: Option<NaiveDate>,

        /// How many days to cover when --start is omitted
        #[arg(long, default_value_t = 2)]
        days: u32,

        /// Exit non-zero when any day has no source data
        #[arg(long)]
        strict: bool,

        /// Never invoke the scraper; use only files already on disk
        #[arg(long)]
        no_scrape: bool,
    },

    /// Parse and compute one day locally without writing anywhere
    Show { date: NaiveDate },

    /// Print the collection schema as the API reports it
    Schema,

    /// Add any missing columns to the collection
    EnsureSchema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "solar_hh_sync=info,warn",
        1 => "solar_hh_sync=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load()?;
    if let Some(token) = cli.notion_token {
        config.notion.token = token;
    }

    match cli.command {
        Command::Sync {
            start,
            end,
            days,
            strict,
            no_scrape,
        } => {
            let today = Utc::now().date_naive();
            let end = match end {
                Some(d) => d,
                None => today
                    .checked_sub_days(Days::new(1))
                    .context("calendar underflow")?,
            };
            let start = match start {
                Some(d) => d,
                None => end
                    .checked_sub_days(Days::new(days.saturating_sub(1) as u64))
                    .context("date range underflow")?,
            };
            let dates = utils::date_span(start, end);
            if dates.is_empty() {
                bail!("empty date range: {} to {}", start, end);
            }

            if no_scrape {
                config.sources.scrape_command = None;
            }
            let strict = strict || config.pipeline.strict_scrape;

            info!("Syncing {} day(s): {} → {}", dates.len(), start, end);
            let summary = {
                let _t = utils::Timer::start("HH sync");
                let pipeline = Pipeline::new(config)?;
                pipeline.run(&dates).await
            };

            println!("─────────────────────────────────");
            println!("  HH Sync — Run Summary");
            println!("─────────────────────────────────");
            println!("  Dates processed  : {}", summary.processed);
            println!("  OK               : {}", summary.ok);
            println!("  Scrape failures  : {}", summary.scrape_fail);
            println!("  Other failures   : {}", summary.other_fail);
            println!("  Total generation : {:.2} kWh", summary.total_kwh);
            println!("─────────────────────────────────");

            let code = summary.exit_code(strict);
            if code != 0 {
                std::process::exit(code);
            }
        }

        Command::Show { date } => {
            let path = config
                .sources
                .generation_dir
                .join(sources::generation_csv_name(date));
            let values = loader::parse_interval_file(&path)
                .with_context(|| format!("could not parse {:?}", path))?;

            let prices = PriceStore::new(
                &config.sources.prices_dir,
                &config.sources.combined_prices_file,
            );
            let irradiance = match &config.sources.irradiance_csv {
                Some(p) => loader::report::load_irradiance(p)?.get(&date).copied(),
                None => None,
            };

            let record = align::align(date, align::series_map(&values), prices.load_day(date));
            let record = metrics::enrich(record, &config.site, irradiance);

            println!("─────────────────────────────────");
            println!("  {} — {}", record.date, config.site.station_name);
            println!("─────────────────────────────────");
            println!("  Periods with data : {}/48", record.generation.len());
            println!("  Total generation  : {:.4} kWh", record.total_kwh);
            match record.revenue_gbp {
                Some(rev) => println!("  Revenue           : £{:.4}", rev),
                None => println!("  Revenue           : — (no matching prices)"),
            }
            for (name, value) in &record.derived {
                println!("  {} : {}", name, value);
            }
            println!("─────────────────────────────────");
        }

        Command::Schema => {
            let client = NotionClient::new(&config.notion)?;
            let body = client.collection_schema(&config.notion.collection_id).await?;
            match schema::SchemaSnapshot::from_response(&body) {
                schema::SchemaSnapshot::Unknown => {
                    println!("Schema unavailable (response had no properties).")
                }
                schema::SchemaSnapshot::Known(props) => {
                    println!("{} columns:", props.len());
                    for (name, kind) in &props {
                        println!("  {:<28} {}", name, kind.as_str());
                    }
                }
            }
        }

        Command::EnsureSchema => {
            let client = NotionClient::new(&config.notion)?;
            let upsert = UpsertClient::new(client, config.notion.collection_id.clone());
            let added = upsert.ensure_schema().await?;
            if added == 0 {
                println!("Schema already complete.");
            } else {
                println!("Added {} missing column(s).", added);
            }
        }
    }

    Ok(())
}
