//! Collaborators that make sure the per-day input files exist locally.
//!
//! Scraping itself (portal login, browser automation) lives in an
//! external command; this side of the boundary only knows how to ask for
//! a date and check the directory afterwards. Price CSVs come straight
//! from the settlement API over HTTP.

use crate::error::SourceError;
use crate::loader::prices;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info, warn};

/// File name of one day's interval export, e.g. `stark_hh_data_2025-12-01.csv`.
pub fn generation_csv_name(date: NaiveDate) -> String {
    format!("stark_hh_data_{}.csv", date.format("%Y-%m-%d"))
}

// ── Generation source ─────────────────────────────────────────────────────────

/// Swappable provider of local interval CSVs.
#[async_trait]
pub trait GenerationSource: Send + Sync {
    /// Return the path of the interval CSV for `date`, producing it first
    /// if the implementation can.
    async fn ensure_day(&self, date: NaiveDate) -> Result<PathBuf, SourceError>;
}

/// Directory-only source: the CSV must already be on disk.
pub struct DirSource {
    dir: PathBuf,
}

impl DirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl GenerationSource for DirSource {
    async fn ensure_day(&self, date: NaiveDate) -> Result<PathBuf, SourceError> {
        let path = self.dir.join(generation_csv_name(date));
        if path.is_file() {
            Ok(path)
        } else {
            Err(SourceError::ScrapeDisabled { date })
        }
    }
}

/// Runs the configured scraper command when the CSV is missing.
///
/// The command is invoked as `<command> --date <date> --output-dir <dir>`
/// and owns everything portal-side; success is judged solely by whether
/// the expected file exists afterwards.
pub struct ScraperCommand {
    dir: PathBuf,
    command: String,
    timeout: Duration,
}

impl ScraperCommand {
    pub fn new(dir: impl Into<PathBuf>, command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            command: command.into(),
            timeout,
        }
    }

    async fn run_scraper(&self, date: NaiveDate) -> Result<(), SourceError> {
        let mut parts = self.command.split_whitespace();
        let Some(program) = parts.next() else {
            return Err(SourceError::ScrapeFailed {
                date,
                reason: "scrape command is empty".to_string(),
            });
        };

        let mut command = tokio::process::Command::new(program);
        command
            .args(parts)
            .arg("--date")
            .arg(date.to_string())
            .arg("--output-dir")
            .arg(&self.dir);

        info!("scraping {} via `{}`", date, self.command);
        let output = match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(SourceError::ScrapeFailed {
                    date,
                    reason: format!("could not spawn `{}`: {}", self.command, e),
                });
            }
            Err(_) => {
                return Err(SourceError::ScrapeFailed {
                    date,
                    reason: format!("timed out after {:?}", self.timeout),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr.lines().last().unwrap_or("").chars().take(200).collect();
            return Err(SourceError::ScrapeFailed {
                date,
                reason: format!("exit status {}: {}", output.status, tail),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl GenerationSource for ScraperCommand {
    async fn ensure_day(&self, date: NaiveDate) -> Result<PathBuf, SourceError> {
        let path = self.dir.join(generation_csv_name(date));
        if path.is_file() {
            debug!("{}: interval CSV already on disk", date);
            return Ok(path);
        }

        self.run_scraper(date).await?;

        if path.is_file() {
            Ok(path)
        } else {
            Err(SourceError::DataUnavailable { date })
        }
    }
}

// ── Settlement price fetcher ──────────────────────────────────────────────────

/// Downloads the daily system-prices CSV when it is not already on disk.
///
/// Failures here are best-effort by contract: the caller logs and moves
/// on, and revenue for the day stays blank.
pub struct ElexonFetcher {
    http: reqwest::Client,
    base_url: String,
    dir: PathBuf,
}

impl ElexonFetcher {
    pub fn new(base_url: &str, dir: impl Into<PathBuf>, timeout_secs: u64) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .gzip(true)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            dir: dir.into(),
        })
    }

    fn url(&self, date: NaiveDate) -> String {
        format!(
            "{}/balancing/settlement/system-prices/{}?format=csv",
            self.base_url, date
        )
    }

    /// Fetch one day's prices, skipping the download when the file exists.
    /// Transient failures are retried twice at a fixed interval.
    pub async fn ensure_day(&self, date: NaiveDate) -> Result<PathBuf> {
        let path = self.dir.join(prices::daily_csv_name(date));
        if path.is_file() {
            debug!("{}: price CSV already on disk", date);
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("could not create {:?}", self.dir))?;

        let url = self.url(date);
        let strategy = FixedInterval::from_millis(500).take(2);
        let body = Retry::spawn(strategy, || async {
            let response = self.http.get(&url).send().await?.error_for_status()?;
            response.text().await
        })
        .await
        .with_context(|| format!("price fetch failed for {}", date))?;

        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("could not write {:?}", path))?;
        debug!("{}: fetched {} bytes of price data", date, body.len());

        // Politeness toward the API after a real download
        sleep(Duration::from_millis(200)).await;
        Ok(path)
    }
}

/// Warn-once helper for a missing data directory, so sync runs against a
/// fresh checkout explain themselves.
pub fn check_data_dir(dir: &Path, what: &str) {
    if !dir.is_dir() {
        warn!("{} directory {:?} does not exist yet", what, dir);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
