use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Local interval data could not be produced for a date.
///
/// Everything in here is scrape-class: the pipeline counts these
/// separately from parse and write failures.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no interval CSV for {date} and no scraper command is configured")]
    ScrapeDisabled { date: NaiveDate },

    #[error("scraper command failed for {date}: {reason}")]
    ScrapeFailed { date: NaiveDate, reason: String },

    #[error("interval CSV for {date} still missing after scrape")]
    DataUnavailable { date: NaiveDate },
}

/// A local CSV could not be turned into usable data.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no header row found (expected a row starting with `Period`)")]
    MissingHeader,

    #[error("no parsable settlement periods")]
    Empty,

    #[error("price CSV is missing required columns")]
    MissingPriceColumns,

    #[error("report CSV is missing the Date or irradiance column")]
    MissingReportColumns,

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Failures talking to the document store API.
///
/// Schema introspection failures never surface through this type from the
/// write path: the schema cache swallows them and falls back to its
/// fail-open sentinel.
#[derive(Debug, Error)]
pub enum NotionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("remote rejected the call: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected response shape: {0}")]
    Decode(String),
}

pub type NotionResult<T> = Result<T, NotionError>;
