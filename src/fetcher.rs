use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{Config, SEARCH_PATH};
use crate::error::{AppError, Result};
use crate::session::Session;
use crate::types::{FetchFailure, FetchOutcome, QueryWindow, ResultRecord};

// ---------------------------------------------------------------------------
// MarketSource
// ---------------------------------------------------------------------------

/// Anything that can answer one filtered search query.
#[allow(async_fn_in_trait)]
pub trait MarketSource {
    async fn fetch(&self, window: &QueryWindow) -> FetchOutcome;
}

// ---------------------------------------------------------------------------
// Request document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayColumn {
    pub name: &'static str,
    pub sort_order: u32,
    pub descending: bool,
}

const fn col(name: &'static str, sort_order: u32, descending: bool) -> DisplayColumn {
    DisplayColumn { name, sort_order, descending }
}

/// Fixed column/sort-order schema the search endpoint expects.
pub const DISPLAY_COLUMNS: [DisplayColumn; 16] = [
    col("state", 35, false),
    col("post_code", 36, false),
    col("prop_type_code", 37, false),
    col("locality", 38, false),
    col("acr", 39, true),
    col("discount", 40, false),
    col("dom", 41, false),
    col("dsr", 42, true),
    col("median_12", 43, true),
    col("osi", 44, true),
    col("renters", 45, false),
    col("som_perc", 46, false),
    col("sr", 47, true),
    col("tv", 48, true),
    col("vacancy", 49, false),
    col("yield", 50, true),
];

#[derive(Debug, Serialize)]
pub struct SearchRequest {
    request: RequestBody,
}

#[derive(Debug, Serialize)]
struct RequestBody {
    #[serde(rename = "type")]
    kind: &'static str,
    criteria: Criteria,
    display: DisplayBlock,
}

#[derive(Debug, Serialize)]
struct Criteria {
    and: Vec<Criterion>,
}

#[derive(Debug, Serialize)]
struct Criterion {
    state: StateFilter,
    prop_type_code: ValueFilter,
    dsr: RangeFilter,
    renters: RangeFilter,
}

#[derive(Debug, Serialize)]
struct StateFilter {
    val: String,
    capital_cities_only: &'static str,
}

#[derive(Debug, Serialize)]
struct ValueFilter {
    val: String,
}

/// Bounds are sent as strings.
#[derive(Debug, Serialize)]
struct RangeFilter {
    min: String,
    max: String,
}

impl RangeFilter {
    fn new(min: u32, max: u32) -> Self {
        Self { min: min.to_string(), max: max.to_string() }
    }
}

#[derive(Debug)]
struct DisplayBlock(&'static [DisplayColumn]);

#[derive(Serialize)]
struct DisplayEntry {
    sort_order: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort_dir: Option<&'static str>,
}

impl Serialize for DisplayBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for c in self.0 {
            let entry = DisplayEntry {
                sort_order: c.sort_order.to_string(),
                sort_dir: c.descending.then_some("desc"),
            };
            map.serialize_entry(c.name, &entry)?;
        }
        map.end()
    }
}

impl SearchRequest {
    /// Build the filter document for one window, validating the window and the
    /// display schema.
    pub fn for_window(window: &QueryWindow, property_type: &str) -> Result<Self> {
        validate_window(window)?;
        validate_display(&DISPLAY_COLUMNS)?;
        Ok(Self {
            request: RequestBody {
                kind: "matching_mkts",
                criteria: Criteria {
                    and: vec![Criterion {
                        state: StateFilter {
                            val: window.region_value().to_string(),
                            capital_cities_only: "false",
                        },
                        prop_type_code: ValueFilter { val: property_type.to_string() },
                        dsr: RangeFilter::new(window.score_min, window.score_max),
                        renters: RangeFilter::new(window.renters_min, window.renters_max),
                    }],
                },
                display: DisplayBlock(&DISPLAY_COLUMNS),
            },
        })
    }
}

fn validate_window(window: &QueryWindow) -> Result<()> {
    if window.score_min > window.score_max {
        return Err(AppError::InvalidWindow(format!(
            "score_min {} exceeds score_max {}",
            window.score_min, window.score_max
        )));
    }
    if window.renters_min > window.renters_max || window.renters_max > 100 {
        return Err(AppError::InvalidWindow(format!(
            "renters range {}-{} is not within 0-100",
            window.renters_min, window.renters_max
        )));
    }
    Ok(())
}

fn validate_display(columns: &[DisplayColumn]) -> Result<()> {
    for pair in columns.windows(2) {
        if pair[1].sort_order != pair[0].sort_order + 1 {
            return Err(AppError::InvalidWindow(format!(
                "display column '{}' breaks the sort-order sequence",
                pair[1].name
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Response document
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawSearchResponse {
    response: RawResponseBody,
}

#[derive(Debug, Deserialize)]
struct RawResponseBody {
    mkt: Option<OneOrMany>,
    warnings: Option<RawWarnings>,
}

#[derive(Debug, Deserialize)]
struct RawWarnings {
    #[serde(rename = "WRN")]
    wrn: Option<serde_json::Value>,
}

/// `mkt` is an object when the server returns exactly one market.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<RawMarket>),
    One(Box<RawMarket>),
}

#[derive(Debug, Deserialize)]
struct RawMarket {
    st: Option<serde_json::Value>,
    pc: Option<serde_json::Value>,
    pt: Option<serde_json::Value>,
    lo: Option<serde_json::Value>,
    #[serde(default)]
    mkt_stats: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Default)]
pub struct ParsedResponse {
    pub records: Vec<ResultRecord>,
    pub warning: Option<String>,
}

/// Parse a search response body into flattened records stamped with `timestamp`.
pub fn parse_search_response(raw: &str, timestamp: &str) -> Result<ParsedResponse> {
    let parsed: RawSearchResponse = serde_json::from_str(raw)?;
    let body = parsed.response;

    let warning = body.warnings.and_then(|w| w.wrn).map(|v| text(Some(&v)));
    let markets = match body.mkt {
        Some(OneOrMany::Many(v)) => v,
        Some(OneOrMany::One(m)) => vec![*m],
        None => Vec::new(),
    };

    let records = markets.iter().map(|m| to_record(m, timestamp)).collect();
    Ok(ParsedResponse { records, warning })
}

fn to_record(m: &RawMarket, timestamp: &str) -> ResultRecord {
    let stat = |key: &str| text(m.mkt_stats.get(key));
    ResultRecord {
        timestamp: timestamp.to_string(),
        state: text(m.st.as_ref()),
        post_code: text(m.pc.as_ref()),
        property_type: text(m.pt.as_ref()),
        suburb: text(m.lo.as_ref()),
        auction_clearance_rate: stat("ACR"),
        avg_vendor_discount: stat("DISCOUNT"),
        days_on_market: stat("DOM"),
        demand_to_supply_ratio: stat("DSR"),
        median_12_months: stat("MEDIAN_12"),
        online_search_interest: stat("OSI"),
        percent_renters: stat("RENTERS"),
        percent_stock_on_market: stat("SOM_PERC"),
        statistical_reliability: stat("SR"),
        typical_value: stat("TV"),
        vacancy_rate: stat("VACANCY"),
        gross_rental_yield: stat("YIELD"),
    }
}

/// Render a JSON scalar as CSV text. Null and missing become empty.
fn text(v: Option<&serde_json::Value>) -> String {
    match v {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Pacing
// ---------------------------------------------------------------------------

/// Uniformly random pause between remote calls.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    min_ms: u64,
    max_ms: u64,
}

impl Pacer {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms: max_ms.max(min_ms) }
    }

    pub fn next_delay(&self) -> Duration {
        if self.max_ms == self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::random_range(self.min_ms..=self.max_ms))
    }

    pub async fn pause(&self) {
        let delay = self.next_delay();
        if delay.is_zero() {
            return;
        }
        info!(
            "Sleeping for {:.2} seconds to avoid hitting the server too hard",
            delay.as_secs_f64()
        );
        tokio::time::sleep(delay).await;
    }
}

// ---------------------------------------------------------------------------
// HttpMarketSource
// ---------------------------------------------------------------------------

/// Search endpoint client. Every call is followed by a paced pause.
pub struct HttpMarketSource<'a> {
    session: &'a Session,
    property_type: String,
    page_cap: usize,
    pacer: Pacer,
    cap_log: PathBuf,
}

impl<'a> HttpMarketSource<'a> {
    pub fn new(session: &'a Session, cfg: &Config) -> Self {
        Self {
            session,
            property_type: cfg.property_type.clone(),
            page_cap: cfg.page_cap,
            pacer: Pacer::new(cfg.request_delay_min_ms, cfg.request_delay_max_ms),
            cap_log: cfg.cap_log_path.clone(),
        }
    }

    async fn query(&self, window: &QueryWindow) -> FetchOutcome {
        let body = match SearchRequest::for_window(window, &self.property_type) {
            Ok(b) => b,
            Err(e) => return FetchOutcome::Failed(FetchFailure::Parse(e.to_string())),
        };
        let url = format!("{}{}", self.session.base_url, SEARCH_PATH);

        let resp = match self
            .session
            .client
            .post(&url)
            .query(&[("access_token", self.session.access_token.as_str())])
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return FetchOutcome::Failed(FetchFailure::Transport(e.to_string())),
        };

        let status = resp.status();
        info!("Url: {url}, Status: {}", status.as_u16());
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return FetchOutcome::Failed(FetchFailure::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            return FetchOutcome::Failed(FetchFailure::Status(status.as_u16()));
        }

        let raw = match resp.text().await {
            Ok(t) => t,
            Err(e) => return FetchOutcome::Failed(FetchFailure::Transport(e.to_string())),
        };
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let parsed = match parse_search_response(&raw, &timestamp) {
            Ok(p) => p,
            Err(e) => return FetchOutcome::Failed(FetchFailure::Parse(e.to_string())),
        };

        if let Some(w) = &parsed.warning {
            warn!(window = %window, "Warnings: {w}");
        }
        FetchOutcome::from_records(parsed.records, self.page_cap)
    }

    fn log_cap_hit(&self, window: &QueryWindow, count: usize) {
        let path = &self.cap_log;
        let line = format!(
            "{} - Hit {}+ results limit: {window}, Results: {count}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.page_cap,
        );
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = written {
            warn!("Failed to append to cap log {}: {e}", path.display());
        }
    }
}

impl MarketSource for HttpMarketSource<'_> {
    async fn fetch(&self, window: &QueryWindow) -> FetchOutcome {
        debug!(window = %window, "Fetching");
        let outcome = self.query(window).await;
        match &outcome {
            FetchOutcome::Records(page) => {
                info!(window = %window, count = page.records.len(), "Markets found: {}", page.records.len());
                if page.hit_cap {
                    warn!(window = %window, "Hit {}+ results limit - logging to cap log", self.page_cap);
                    self.log_cap_hit(window, page.records.len());
                }
            }
            FetchOutcome::Empty => info!(window = %window, "No markets found"),
            FetchOutcome::Failed(reason) => error!(window = %window, "Fetch failed: {reason}"),
        }
        self.pacer.pause().await;
        outcome
    }
}
