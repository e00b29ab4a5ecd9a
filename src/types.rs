use serde::{Deserialize, Serialize};

use crate::config::{RENTERS_MAX, RENTERS_MIN};

// ---------------------------------------------------------------------------
// Region
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    Qld,
    Nsw,
    Vic,
    Wa,
    Sa,
    Tas,
    Nt,
    Act,
}

impl Region {
    /// Per-region query order used by the segmentation cascade.
    pub const ALL: [Region; 8] = [
        Region::Qld,
        Region::Nsw,
        Region::Vic,
        Region::Wa,
        Region::Sa,
        Region::Tas,
        Region::Nt,
        Region::Act,
    ];

    /// Filter value meaning "every region in one query".
    pub const ALL_VALUE: &'static str = "ACT,NSW,NT,QLD,SA,TAS,VIC,WA";

    pub fn code(self) -> &'static str {
        match self {
            Region::Qld => "QLD",
            Region::Nsw => "NSW",
            Region::Vic => "VIC",
            Region::Wa => "WA",
            Region::Sa => "SA",
            Region::Tas => "TAS",
            Region::Nt => "NT",
            Region::Act => "ACT",
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// QueryWindow
// ---------------------------------------------------------------------------

/// One fetch request's filter predicate. All bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryWindow {
    pub score_min: u32,
    pub score_max: u32,
    /// `None` queries every region at once.
    pub region: Option<Region>,
    pub renters_min: u32,
    pub renters_max: u32,
}

impl QueryWindow {
    /// All regions, full renter range.
    pub fn scores(score_min: u32, score_max: u32) -> Self {
        Self {
            score_min,
            score_max,
            region: None,
            renters_min: RENTERS_MIN,
            renters_max: RENTERS_MAX,
        }
    }

    pub fn in_region(self, region: Region) -> Self {
        Self { region: Some(region), ..self }
    }

    pub fn with_renters(self, renters_min: u32, renters_max: u32) -> Self {
        Self { renters_min, renters_max, ..self }
    }

    /// Collapse the score range to a single point.
    pub fn at_score(self, score: u32) -> Self {
        Self { score_min: score, score_max: score, ..self }
    }

    pub fn region_value(&self) -> &'static str {
        self.region.map(Region::code).unwrap_or(Region::ALL_VALUE)
    }
}

impl std::fmt::Display for QueryWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let region = self.region.map(Region::code).unwrap_or("ALL");
        write!(
            f,
            "DSR {}-{} | region {} | renters {}-{}",
            self.score_min, self.score_max, region, self.renters_min, self.renters_max
        )
    }
}

// ---------------------------------------------------------------------------
// ResultRecord
// ---------------------------------------------------------------------------

/// One flattened market row. Field renames are the persisted column headers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Post Code")]
    pub post_code: String,
    #[serde(rename = "Property Type")]
    pub property_type: String,
    #[serde(rename = "Suburb")]
    pub suburb: String,
    #[serde(rename = "Auction clearance rate")]
    pub auction_clearance_rate: String,
    #[serde(rename = "Avg vendor discount")]
    pub avg_vendor_discount: String,
    #[serde(rename = "Days on market")]
    pub days_on_market: String,
    #[serde(rename = "Demand to Supply Ratio")]
    pub demand_to_supply_ratio: String,
    #[serde(rename = "Median 12 months")]
    pub median_12_months: String,
    #[serde(rename = "Online search interest")]
    pub online_search_interest: String,
    #[serde(rename = "Percent renters in market")]
    pub percent_renters: String,
    #[serde(rename = "Percent stock on market")]
    pub percent_stock_on_market: String,
    #[serde(rename = "Statistical reliability")]
    pub statistical_reliability: String,
    #[serde(rename = "Typical value")]
    pub typical_value: String,
    #[serde(rename = "Vacancy rate")]
    pub vacancy_rate: String,
    #[serde(rename = "Gross rental yield")]
    pub gross_rental_yield: String,
}

impl ResultRecord {
    pub const HEADERS: [&'static str; 17] = [
        "Timestamp",
        "State",
        "Post Code",
        "Property Type",
        "Suburb",
        "Auction clearance rate",
        "Avg vendor discount",
        "Days on market",
        "Demand to Supply Ratio",
        "Median 12 months",
        "Online search interest",
        "Percent renters in market",
        "Percent stock on market",
        "Statistical reliability",
        "Typical value",
        "Vacancy rate",
        "Gross rental yield",
    ];

    /// Values in `HEADERS` order.
    pub fn values(&self) -> [&str; 17] {
        [
            &self.timestamp,
            &self.state,
            &self.post_code,
            &self.property_type,
            &self.suburb,
            &self.auction_clearance_rate,
            &self.avg_vendor_discount,
            &self.days_on_market,
            &self.demand_to_supply_ratio,
            &self.median_12_months,
            &self.online_search_interest,
            &self.percent_renters,
            &self.percent_stock_on_market,
            &self.statistical_reliability,
            &self.typical_value,
            &self.vacancy_rate,
            &self.gross_rental_yield,
        ]
    }
}

// ---------------------------------------------------------------------------
// Fetch results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ResultPage {
    pub records: Vec<ResultRecord>,
    /// Record count reached the page cap; the true result set may be larger.
    pub hit_cap: bool,
}

impl ResultPage {
    pub fn new(records: Vec<ResultRecord>, page_cap: usize) -> Self {
        let hit_cap = records.len() >= page_cap;
        Self { records, hit_cap }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// Connection, TLS or body read error.
    Transport(String),
    /// Non-success HTTP status other than an auth rejection.
    Status(u16),
    /// 401/403: the session is no longer valid.
    Unauthorized(u16),
    /// Response body was not the expected JSON document.
    Parse(String),
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchFailure::Transport(e) => write!(f, "transport error: {e}"),
            FetchFailure::Status(code) => write!(f, "HTTP status {code}"),
            FetchFailure::Unauthorized(code) => write!(f, "unauthorized (HTTP {code})"),
            FetchFailure::Parse(e) => write!(f, "parse error: {e}"),
        }
    }
}

/// Outcome of one search query. A failed query is never conflated with "no data".
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Records(ResultPage),
    Empty,
    Failed(FetchFailure),
}

impl FetchOutcome {
    pub fn from_records(records: Vec<ResultRecord>, page_cap: usize) -> Self {
        if records.is_empty() {
            FetchOutcome::Empty
        } else {
            FetchOutcome::Records(ResultPage::new(records, page_cap))
        }
    }

    pub fn hit_cap(&self) -> bool {
        matches!(self, FetchOutcome::Records(page) if page.hit_cap)
    }

    pub fn len(&self) -> usize {
        match self {
            FetchOutcome::Records(page) => page.records.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
