//! In-memory market source for cascade and driver tests.

use std::cell::RefCell;

use crate::config::PAGE_CAP;
use crate::fetcher::MarketSource;
use crate::types::{FetchOutcome, QueryWindow, ResultRecord};

/// Answers each query with whatever `respond` returns and remembers the call order.
pub struct ScriptedSource<F> {
    respond: F,
    calls: RefCell<Vec<QueryWindow>>,
}

impl<F: Fn(&QueryWindow) -> FetchOutcome> ScriptedSource<F> {
    pub fn new(respond: F) -> Self {
        Self { respond, calls: RefCell::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<QueryWindow> {
        self.calls.borrow().clone()
    }
}

impl<F: Fn(&QueryWindow) -> FetchOutcome> MarketSource for ScriptedSource<F> {
    async fn fetch(&self, window: &QueryWindow) -> FetchOutcome {
        self.calls.borrow_mut().push(*window);
        (self.respond)(window)
    }
}

/// `n` distinct records tagged with the window that produced them.
pub fn page(window: &QueryWindow, n: usize) -> FetchOutcome {
    let records = (0..n).map(|i| record(window, i)).collect();
    FetchOutcome::from_records(records, PAGE_CAP)
}

pub fn record(window: &QueryWindow, i: usize) -> ResultRecord {
    ResultRecord {
        timestamp: "2025-01-01 00:00:00".to_string(),
        state: window.region.map(|r| r.code()).unwrap_or("NSW").to_string(),
        post_code: format!("{}", 2000 + i),
        property_type: "H".to_string(),
        suburb: format!("{window} #{i}"),
        auction_clearance_rate: String::new(),
        avg_vendor_discount: "-4.1".to_string(),
        days_on_market: "35".to_string(),
        demand_to_supply_ratio: window.score_min.to_string(),
        median_12_months: String::new(),
        online_search_interest: String::new(),
        percent_renters: window.renters_min.to_string(),
        percent_stock_on_market: String::new(),
        statistical_reliability: String::new(),
        typical_value: "850000".to_string(),
        vacancy_rate: String::new(),
        gross_rental_yield: "4.2".to_string(),
    }
}
