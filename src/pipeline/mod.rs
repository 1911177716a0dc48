//! Pipeline orchestrator: walks a date range through source → parse → metrics → upsert.
//!
//! Each date is handled independently; a bad day is recorded and the run
//! moves on. Re-running any range is safe because every write goes
//! through the keyed upsert.

use crate::align;
use crate::config::AppConfig;
use crate::error::SourceError;
use crate::loader::{self, prices::PriceStore, report};
use crate::metrics;
use crate::notion::upsert::UpsertClient;
use crate::notion::{NotionClient, fields};
use crate::sources::{self, DirSource, ElexonFetcher, GenerationSource, ScraperCommand};
use anyhow::{Context, Result, ensure};
use chrono::NaiveDate;
use rand::RngExt;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What happened to a single date.
#[derive(Debug, Clone, PartialEq)]
pub enum DayOutcome {
    Synced { total_kwh: f64, matched_prices: usize },
    ScrapeFailed,
    ParseFailed(String),
    WriteFailed(String),
}

pub struct Pipeline {
    config: AppConfig,
    generation: Box<dyn GenerationSource>,
    prices: PriceStore,
    fetcher: Option<ElexonFetcher>,
    upsert: UpsertClient,
    irradiance: BTreeMap<NaiveDate, f64>,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Result<Self> {
        ensure!(
            !config.notion.token.is_empty(),
            "no API token configured (set NOTION_TOKEN)"
        );
        ensure!(
            !config.notion.collection_id.is_empty(),
            "notion.collection_id is not configured"
        );

        let generation: Box<dyn GenerationSource> = match &config.sources.scrape_command {
            Some(cmd) if !cmd.trim().is_empty() => Box::new(ScraperCommand::new(
                &config.sources.generation_dir,
                cmd,
                Duration::from_secs(config.sources.scrape_timeout_secs),
            )),
            _ => Box::new(DirSource::new(&config.sources.generation_dir)),
        };
        sources::check_data_dir(&config.sources.generation_dir, "generation");

        let prices = PriceStore::new(
            &config.sources.prices_dir,
            &config.sources.combined_prices_file,
        );

        let fetcher = if config.sources.fetch_prices {
            Some(
                ElexonFetcher::new(
                    &config.sources.elexon_base_url,
                    &config.sources.prices_dir,
                    config.sources.fetch_timeout_secs,
                )
                .context("Failed to build price fetcher")?,
            )
        } else {
            None
        };

        let client = NotionClient::new(&config.notion).context("Failed to build API client")?;
        let upsert = UpsertClient::new(client, config.notion.collection_id.clone());

        let irradiance = match &config.sources.irradiance_csv {
            Some(path) => report::load_irradiance(path)
                .with_context(|| format!("Failed to load irradiance report {:?}", path))?,
            None => BTreeMap::new(),
        };

        Ok(Self {
            config,
            generation,
            prices,
            fetcher,
            upsert,
            irradiance,
        })
    }

    /// Sync every date in order, pacing the writes so the API is never hammered.
    pub async fn run(&self, dates: &[NaiveDate]) -> RunSummary {
        let mut summary = RunSummary::default();
        let total = dates.len();
        let day_timeout = Duration::from_secs(self.config.pipeline.day_timeout_secs);

        for (i, &date) in dates.iter().enumerate() {
            let outcome = match tokio::time::timeout(day_timeout, self.sync_day(date)).await {
                Ok(outcome) => outcome,
                Err(_) => DayOutcome::WriteFailed(format!("timed out after {:?}", day_timeout)),
            };

            match &outcome {
                DayOutcome::Synced {
                    total_kwh,
                    matched_prices,
                } => info!(
                    "[{:>3}/{:>3}] {}  OK  gen={:.2} kWh  ssp={}/48",
                    i + 1,
                    total,
                    date,
                    total_kwh,
                    matched_prices
                ),
                DayOutcome::ScrapeFailed => {
                    warn!("[{:>3}/{:>3}] {}  no interval data", i + 1, total, date)
                }
                DayOutcome::ParseFailed(reason) => {
                    warn!("[{:>3}/{:>3}] {}  parse failed: {}", i + 1, total, date, reason)
                }
                DayOutcome::WriteFailed(reason) => {
                    warn!("[{:>3}/{:>3}] {}  write failed: {}", i + 1, total, date, reason)
                }
            }
            summary.record(&outcome);

            if i + 1 < total {
                let jitter = rand::rng().random_range(0..=self.config.pipeline.jitter_ms);
                let pause = Duration::from_millis(self.config.pipeline.write_delay_ms + jitter);
                tokio::time::sleep(pause).await;
            }
        }

        summary
    }

    /// One date, end to end. Never propagates; every failure maps to an outcome.
    pub async fn sync_day(&self, date: NaiveDate) -> DayOutcome {
        let path = match self.generation.ensure_day(date).await {
            Ok(path) => path,
            Err(SourceError::ScrapeDisabled { .. }) => {
                debug!("{}: no interval CSV and scraping is disabled", date);
                return DayOutcome::ScrapeFailed;
            }
            Err(e) => {
                warn!("{}: {}", date, e);
                return DayOutcome::ScrapeFailed;
            }
        };

        // Prices are best-effort: a day with generation but no prices
        // still syncs, it just gets no revenue.
        if let Some(fetcher) = &self.fetcher {
            if let Err(e) = fetcher.ensure_day(date).await {
                debug!("{}: price fetch skipped: {:#}", date, e);
            }
        }

        let values = match loader::parse_interval_file(&path) {
            Ok(values) => values,
            Err(e) => return DayOutcome::ParseFailed(e.to_string()),
        };

        let generation = align::series_map(&values);
        let price = self.prices.load_day(date);
        if price.is_empty() {
            debug!("{}: no price series", date);
        }
        let record = align::align(date, generation, price);

        let record = metrics::enrich(record, &self.config.site, self.irradiance.get(&date).copied());
        if record.revenue_gbp.is_none() && !record.price.is_empty() {
            debug!("{}: price series has no overlap with generation", date);
        }
        let matched_prices = record
            .generation
            .keys()
            .filter(|p| record.price.contains_key(p))
            .count();

        let fields = fields::day_fields(&record, &self.config.site.station_name);
        match self.upsert.upsert(&record.key(), &fields).await {
            Ok(_) => DayOutcome::Synced {
                total_kwh: record.total_kwh,
                matched_prices,
            },
            Err(e) => DayOutcome::WriteFailed(e.to_string()),
        }
    }
}

/// Tally of one run, printed at the end and folded into the exit code.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub processed: usize,
    pub ok: usize,
    pub scrape_fail: usize,
    pub other_fail: usize,
    pub total_kwh: f64,
}

impl RunSummary {
    fn record(&mut self, outcome: &DayOutcome) {
        self.processed += 1;
        match outcome {
            DayOutcome::Synced { total_kwh, .. } => {
                self.ok += 1;
                self.total_kwh += total_kwh;
            }
            DayOutcome::ScrapeFailed => self.scrape_fail += 1,
            DayOutcome::ParseFailed(_) | DayOutcome::WriteFailed(_) => self.other_fail += 1,
        }
    }

    /// Parse and write failures always fail the run; missing source data
    /// only does so when strict mode asks for it.
    pub fn exit_code(&self, strict: bool) -> i32 {
        if self.other_fail > 0 {
            return 1;
        }
        if strict && self.scrape_fail > 0 {
            return 1;
        }
        0
    }
}
