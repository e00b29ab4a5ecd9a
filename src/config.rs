use std::path::PathBuf;

use crate::error::{AppError, Result};

pub const DSR_BASE_URL: &str = "https://dsrdata.com.au";
pub const SEARCH_PATH: &str = "/DSRWeb/secure/getMatchingMkts.json";
pub const CHART_PATH: &str = "/DSRWeb/secure/getHistoricalChart.png";

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
pub const SHEET_TITLE: &str = "DSR Data";

/// Server-side row ceiling for one search query. A page this size may be truncated.
pub const PAGE_CAP: usize = 250;

/// Primary scoring dimension walk: `[floor, floor+width-1]`, ... while start <= ceiling.
pub const DSR_FLOOR: u32 = 30;
pub const DSR_CEILING: u32 = 75;
pub const DSR_WINDOW_WIDTH: u32 = 2;

/// Renter percentage axis bounds.
pub const RENTERS_MIN: u32 = 0;
pub const RENTERS_MAX: u32 = 100;

/// Level-2 and level-3 split counts for the renter axis.
pub const RENTER_QUARTERS: u32 = 4;
pub const RENTER_MICRO_SPLITS: u32 = 5;

/// Randomised pause after every remote call, in milliseconds.
pub const REQUEST_DELAY_MIN_MS: u64 = 2_000;
pub const REQUEST_DELAY_MAX_MS: u64 = 5_000;

/// Property type code sent with every search (houses).
pub const PROPERTY_TYPE: &str = "H";

/// Space between and around stacked chart images, in pixels.
pub const CHART_PADDING: u32 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub cookies_path: PathBuf,
    pub log_level: String,
    /// Append-only log for ERROR lines (ERROR_LOG_PATH)
    pub error_log_path: PathBuf,
    /// Append-only log of every query that hit the page cap (CAP_LOG_PATH)
    pub cap_log_path: PathBuf,
    pub output_dir: PathBuf,
    pub dsr_floor: u32,
    pub dsr_ceiling: u32,
    pub dsr_window_width: u32,
    pub page_cap: usize,
    pub request_delay_min_ms: u64,
    pub request_delay_max_ms: u64,
    pub property_type: String,
    /// Existing spreadsheet to mirror into (SHEET_ID). A new one is created when unset.
    pub sheet_id: Option<String>,
    pub sheet_tab: String,
    pub google_token_path: PathBuf,
    pub chart_temp_dir: PathBuf,
    pub chart_output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DSR_BASE_URL.to_string(),
            cookies_path: PathBuf::from("cookies.json"),
            log_level: "info".to_string(),
            error_log_path: PathBuf::from("error.log"),
            cap_log_path: PathBuf::from("logs.txt"),
            output_dir: PathBuf::from("output"),
            dsr_floor: DSR_FLOOR,
            dsr_ceiling: DSR_CEILING,
            dsr_window_width: DSR_WINDOW_WIDTH,
            page_cap: PAGE_CAP,
            request_delay_min_ms: REQUEST_DELAY_MIN_MS,
            request_delay_max_ms: REQUEST_DELAY_MAX_MS,
            property_type: PROPERTY_TYPE.to_string(),
            sheet_id: None,
            sheet_tab: "Sheet1".to_string(),
            google_token_path: PathBuf::from("token.json"),
            chart_temp_dir: PathBuf::from("tmp"),
            chart_output_dir: PathBuf::from("images"),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let cfg = Self {
            base_url: std::env::var("DSR_BASE_URL")
                .unwrap_or_else(|_| DSR_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            cookies_path: env_path("COOKIES_PATH", "cookies.json"),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            error_log_path: env_path("ERROR_LOG_PATH", "error.log"),
            cap_log_path: env_path("CAP_LOG_PATH", "logs.txt"),
            output_dir: env_path("OUTPUT_DIR", "output"),
            dsr_floor: env_parse("DSR_FLOOR", DSR_FLOOR)?,
            dsr_ceiling: env_parse("DSR_CEILING", DSR_CEILING)?,
            dsr_window_width: env_parse("DSR_WINDOW_WIDTH", DSR_WINDOW_WIDTH)?,
            page_cap: env_parse("PAGE_CAP", PAGE_CAP)?,
            request_delay_min_ms: env_parse("REQUEST_DELAY_MIN_MS", REQUEST_DELAY_MIN_MS)?,
            request_delay_max_ms: env_parse("REQUEST_DELAY_MAX_MS", REQUEST_DELAY_MAX_MS)?,
            property_type: std::env::var("PROPERTY_TYPE")
                .unwrap_or_else(|_| PROPERTY_TYPE.to_string()),
            sheet_id: std::env::var("SHEET_ID")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            sheet_tab: std::env::var("SHEET_TAB").unwrap_or_else(|_| "Sheet1".to_string()),
            google_token_path: env_path("GOOGLE_TOKEN_PATH", "token.json"),
            chart_temp_dir: env_path("CHART_TEMP_DIR", "tmp"),
            chart_output_dir: env_path("CHART_OUTPUT_DIR", "images"),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dsr_floor > self.dsr_ceiling {
            return Err(AppError::Config(format!(
                "DSR_FLOOR ({}) must not exceed DSR_CEILING ({})",
                self.dsr_floor, self.dsr_ceiling
            )));
        }
        if self.dsr_window_width == 0 {
            return Err(AppError::Config("DSR_WINDOW_WIDTH must be at least 1".to_string()));
        }
        if self.page_cap == 0 {
            return Err(AppError::Config("PAGE_CAP must be at least 1".to_string()));
        }
        if self.request_delay_min_ms > self.request_delay_max_ms {
            return Err(AppError::Config(
                "REQUEST_DELAY_MIN_MS must not exceed REQUEST_DELAY_MAX_MS".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    PathBuf::from(std::env::var(key).unwrap_or_else(|_| default.to_string()))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} must be a valid number, got {raw:?}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.dsr_floor, 30);
        assert_eq!(cfg.dsr_ceiling, 75);
        assert_eq!(cfg.page_cap, 250);
    }

    #[test]
    fn inverted_delay_range_is_rejected() {
        let cfg = Config {
            request_delay_min_ms: 10,
            request_delay_max_ms: 5,
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn zero_width_is_rejected() {
        let cfg = Config { dsr_window_width: 0, ..Config::default() };
        assert!(matches!(cfg.validate(), Err(AppError::Config(_))));
    }
}
