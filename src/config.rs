// Configuration loaded from environment variables (.env honored by binaries)

use crate::error::LoadError;
use crate::geometry::DEFAULT_STEP_DEG;
use crate::lines::{ColorMode, EnrichOptions, DEFAULT_LINE_WIDTH};
use crate::source::Source;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub alias_source: Source,
    pub generation_source: Source,
    pub lines_source: Source,
    pub prices_source: Source,
    pub price_refresh: Duration,
    pub line_width: f32,
    /// None disables tessellation
    pub tessellate_step_deg: Option<f64>,
    pub color_mode: ColorMode,
    pub addr: SocketAddr,
    pub static_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `GRIDFLOW_ALIAS_SOURCE` | alias CSV path or URL | `data/barra_alias.csv` |
    /// | `GRIDFLOW_GENERATION_SOURCE` | generation barra JSON list | `public/generation_barras.json` |
    /// | `GRIDFLOW_LINES_SOURCE` | line GeoJSON | `public/lines_barras.geojson` |
    /// | `GRIDFLOW_PRICES_SOURCE` | price feed JSON | `public/prices_sample.json` |
    /// | `GRIDFLOW_PRICE_REFRESH_SECS` | price refresh period | `300` |
    /// | `GRIDFLOW_LINE_WIDTH` | rendered line width | `10` |
    /// | `GRIDFLOW_TESSELLATE_STEP_DEG` | piece length, `0` disables | `0.05` |
    /// | `GRIDFLOW_COLOR_MODE` | `voltage` or `price` | `voltage` |
    /// | `GRIDFLOW_ADDR` | server bind address | `0.0.0.0:3000` |
    /// | `GRIDFLOW_STATIC_DIR` | directory served under `/static` | `public` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` with an injectable variable lookup
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let source = |key: &'static str, default: &str| {
            Source::parse(&var(key, default)).map_err(|e| ConfigError::InvalidSource(key, e))
        };

        let alias_source = source("GRIDFLOW_ALIAS_SOURCE", "data/barra_alias.csv")?;
        let generation_source =
            source("GRIDFLOW_GENERATION_SOURCE", "public/generation_barras.json")?;
        let lines_source = source("GRIDFLOW_LINES_SOURCE", "public/lines_barras.geojson")?;
        let prices_source = source("GRIDFLOW_PRICES_SOURCE", "public/prices_sample.json")?;

        let refresh_secs: u64 = var("GRIDFLOW_PRICE_REFRESH_SECS", "300")
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber("GRIDFLOW_PRICE_REFRESH_SECS"))?;
        if refresh_secs == 0 {
            return Err(ConfigError::InvalidNumber("GRIDFLOW_PRICE_REFRESH_SECS"));
        }

        let line_width: f32 = var("GRIDFLOW_LINE_WIDTH", &DEFAULT_LINE_WIDTH.to_string())
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber("GRIDFLOW_LINE_WIDTH"))?;
        if !(line_width > 0.0) {
            return Err(ConfigError::InvalidNumber("GRIDFLOW_LINE_WIDTH"));
        }

        let step: f64 = var("GRIDFLOW_TESSELLATE_STEP_DEG", &DEFAULT_STEP_DEG.to_string())
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber("GRIDFLOW_TESSELLATE_STEP_DEG"))?;
        let tessellate_step_deg = if step > 0.0 { Some(step) } else { None };

        let color_mode = var("GRIDFLOW_COLOR_MODE", "voltage")
            .parse()
            .map_err(ConfigError::InvalidColorMode)?;

        let addr = var("GRIDFLOW_ADDR", "0.0.0.0:3000")
            .parse()
            .map_err(|_| ConfigError::InvalidAddr)?;

        let static_dir = PathBuf::from(var("GRIDFLOW_STATIC_DIR", "public"));

        Ok(Config {
            alias_source,
            generation_source,
            lines_source,
            prices_source,
            price_refresh: Duration::from_secs(refresh_secs),
            line_width,
            tessellate_step_deg,
            color_mode,
            addr,
            static_dir,
        })
    }

    /// Enrichment options with an optional color mode override
    pub fn enrich_options(&self, mode: Option<ColorMode>) -> EnrichOptions {
        EnrichOptions {
            mode: mode.unwrap_or(self.color_mode),
            width: self.line_width,
            tessellate_step_deg: self.tessellate_step_deg,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0}: {1}")]
    InvalidSource(&'static str, LoadError),

    #[error("{0} must be a positive number")]
    InvalidNumber(&'static str),

    #[error("GRIDFLOW_COLOR_MODE: {0}")]
    InvalidColorMode(String),

    #[error("Invalid GRIDFLOW_ADDR format")]
    InvalidAddr,
}
