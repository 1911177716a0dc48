use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub notion: NotionConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Document-store API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotionConfig {
    #[serde(default = "default_notion_base_url")]
    pub base_url: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Integration token. Usually supplied via `NOTION_TOKEN` rather than a file.
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub collection_id: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

/// Where the per-day input files come from
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcesConfig {
    #[serde(default = "default_generation_dir")]
    pub generation_dir: PathBuf,

    /// External scraper invoked as `<cmd> --date <d> --output-dir <dir>`.
    /// Leave unset to sync only what is already on disk.
    #[serde(default)]
    pub scrape_command: Option<String>,

    #[serde(default = "default_scrape_timeout_secs")]
    pub scrape_timeout_secs: u64,

    #[serde(default = "default_prices_dir")]
    pub prices_dir: PathBuf,

    #[serde(default = "default_combined_prices_file")]
    pub combined_prices_file: PathBuf,

    #[serde(default = "default_elexon_base_url")]
    pub elexon_base_url: String,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub fetch_prices: bool,

    #[serde(default)]
    pub irradiance_csv: Option<PathBuf>,
}

/// Per-site constants for the derived metrics
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    #[serde(default = "default_station_name")]
    pub station_name: String,

    /// Installed DC capacity. Metrics needing it stay blank when unset.
    #[serde(default)]
    pub capacity_kwp: Option<f64>,
}

/// Pacing and failure policy for a sync run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_write_delay_ms")]
    pub write_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_day_timeout_secs")]
    pub day_timeout_secs: u64,

    #[serde(default)]
    pub strict_scrape: bool,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_notion_base_url() -> String {
    "https://api.notion.com".to_string()
}
fn default_api_version() -> String {
    "2022-06-28".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    4
}
fn default_backoff_base_ms() -> u64 {
    3000
}
fn default_generation_dir() -> PathBuf {
    PathBuf::from("data/generation")
}
fn default_scrape_timeout_secs() -> u64 {
    180
}
fn default_prices_dir() -> PathBuf {
    PathBuf::from("data/prices")
}
fn default_combined_prices_file() -> PathBuf {
    PathBuf::from("data/prices/combined_system_prices.csv")
}
fn default_elexon_base_url() -> String {
    "https://data.elexon.co.uk/bmrs/api/v1".to_string()
}
fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_station_name() -> String {
    "Point Lane".to_string()
}
fn default_write_delay_ms() -> u64 {
    350
}
fn default_jitter_ms() -> u64 {
    150
}
fn default_day_timeout_secs() -> u64 {
    300
}
fn default_true() -> bool {
    true
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("HHSYNC").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|_| AppConfig::default());
        Ok(app_cfg)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            notion: NotionConfig::default(),
            sources: SourcesConfig::default(),
            site: SiteConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            base_url: default_notion_base_url(),
            api_version: default_api_version(),
            token: String::new(),
            collection_id: String::new(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            generation_dir: default_generation_dir(),
            scrape_command: None,
            scrape_timeout_secs: default_scrape_timeout_secs(),
            prices_dir: default_prices_dir(),
            combined_prices_file: default_combined_prices_file(),
            elexon_base_url: default_elexon_base_url(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            fetch_prices: true,
            irradiance_csv: None,
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            station_name: default_station_name(),
            capacity_kwp: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            write_delay_ms: default_write_delay_ms(),
            jitter_ms: default_jitter_ms(),
            day_timeout_secs: default_day_timeout_secs(),
            strict_scrape: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_usable() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.notion.api_version, "2022-06-28");
        assert_eq!(cfg.notion.max_attempts, 4);
        assert!(cfg.sources.fetch_prices);
        assert!(cfg.sources.scrape_command.is_none());
        assert_eq!(cfg.pipeline.write_delay_ms, 350);
        assert!(!cfg.pipeline.strict_scrape);
    }

    #[test]
    fn test_partial_toml_fills_in_defaults() {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(
                "[notion]\ncollection_id = \"abc123\"\n\n[site]\ncapacity_kwp = 500.0\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let app: AppConfig = cfg.try_deserialize().unwrap();

        assert_eq!(app.notion.collection_id, "abc123");
        assert_eq!(app.notion.base_url, "https://api.notion.com");
        assert_eq!(app.site.capacity_kwp, Some(500.0));
        assert_eq!(app.site.station_name, "Point Lane");
        assert_eq!(app.pipeline.day_timeout_secs, 300);
    }
}
