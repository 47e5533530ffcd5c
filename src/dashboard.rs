use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::logs::{LogRecord, LogView};
use crate::remote::{ApiError, DashboardApi};

const DATE_PARAM_FORMAT: &str = "%Y-%m-%d";
const DEFAULT_LOOKBACK_DAYS: i64 = 3;
// Pushes the default end date forward to absorb client/server clock skew.
const DEFAULT_SKEW_HOURS: i64 = 12;

/// Calendar-date window for the log query. Either end may be unset while the
/// user is still picking a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn default_at<Tz: TimeZone>(now: DateTime<Tz>) -> Self {
        let from = now.clone() - Duration::days(DEFAULT_LOOKBACK_DAYS);
        let to = now + Duration::hours(DEFAULT_SKEW_HOURS);
        DateRange {
            from: Some(from.date_naive()),
            to: Some(to.date_naive()),
        }
    }

    /// Parses `YYYY-MM-DD` endpoints; blank strings count as unset.
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self, String> {
        let from = parse_date(from, "from")?;
        let to = parse_date(to, "to")?;
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(format!("from ({f}) is after to ({t})"));
            }
        }
        Ok(DateRange { from, to })
    }

    pub fn start_param(&self) -> String {
        format_param(self.from)
    }

    pub fn end_param(&self) -> String {
        format_param(self.to)
    }
}

fn parse_date(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>, String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, DATE_PARAM_FORMAT)
            .map(Some)
            .map_err(|e| format!("invalid {field} date {s:?}: {e}")),
    }
}

fn format_param(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format(DATE_PARAM_FORMAT).to_string())
        .unwrap_or_default()
}

/// Issued when a refetch starts. Only the ticket of the latest refetch may
/// write `records` when its response arrives.
#[derive(Debug, Clone, Copy)]
pub struct FetchTicket {
    seq: u64,
    pub range: DateRange,
}

#[derive(Debug)]
pub enum FetchOutcome {
    Applied { count: usize },
    Stale,
    Failed(ApiError),
}

impl FetchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Applied { .. } => "applied",
            FetchOutcome::Stale => "stale",
            FetchOutcome::Failed(_) => "failed",
        }
    }
}

/// Screen state behind the transaction log view.
///
/// `records` is only ever replaced with a fresh slice, so holders of an
/// earlier `Arc` keep a consistent snapshot and change detection can use
/// pointer equality.
#[derive(Debug)]
pub struct DashboardState {
    records: Arc<[LogRecord]>,
    loading: bool,
    search_query: String,
    date_range: DateRange,
    dismissing: BTreeSet<String>,
    show_error_summary: bool,
    latest_fetch: u64,
}

impl DashboardState {
    pub fn new(date_range: DateRange) -> Self {
        DashboardState {
            records: Arc::from(Vec::new()),
            loading: false,
            search_query: String::new(),
            date_range,
            dismissing: BTreeSet::new(),
            show_error_summary: true,
            latest_fetch: 0,
        }
    }

    pub fn records(&self) -> &Arc<[LogRecord]> {
        &self.records
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn date_range(&self) -> DateRange {
        self.date_range
    }

    pub fn dismissing(&self) -> &BTreeSet<String> {
        &self.dismissing
    }

    pub fn is_dismissing(&self, transaction_id: &str) -> bool {
        self.dismissing.contains(transaction_id)
    }

    pub fn show_error_summary(&self) -> bool {
        self.show_error_summary
    }

    pub fn view(&self) -> LogView<'_> {
        LogView::new(&self.records, &self.search_query)
    }

    /// Search is applied client-side only; it never triggers a refetch.
    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
    }

    pub fn toggle_error_summary(&mut self) -> bool {
        self.show_error_summary = !self.show_error_summary;
        self.show_error_summary
    }

    pub fn begin_fetch(&mut self, range: DateRange) -> FetchTicket {
        self.latest_fetch += 1;
        self.date_range = range;
        self.loading = true;
        FetchTicket {
            seq: self.latest_fetch,
            range,
        }
    }

    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<LogRecord>, ApiError>,
    ) -> FetchOutcome {
        if ticket.seq != self.latest_fetch {
            return FetchOutcome::Stale;
        }
        self.loading = false;
        match result {
            Ok(records) => {
                let count = records.len();
                self.records = Arc::from(records);
                FetchOutcome::Applied { count }
            }
            Err(e) => FetchOutcome::Failed(e),
        }
    }

    pub fn begin_dismiss(&mut self, transaction_id: &str) {
        self.dismissing.insert(transaction_id.to_string());
    }

    pub fn end_dismiss(&mut self, transaction_id: &str) {
        self.dismissing.remove(transaction_id);
    }

    /// Clears `errorCode`/`errorDetails` on every record of the transaction.
    /// Returns how many records were patched.
    pub fn clear_transaction_error(&mut self, transaction_id: &str) -> usize {
        let patched = self
            .records
            .iter()
            .filter(|r| r.transaction_id == transaction_id)
            .count();
        if patched > 0 {
            let next: Vec<LogRecord> = self
                .records
                .iter()
                .map(|r| {
                    if r.transaction_id == transaction_id {
                        r.with_error_cleared()
                    } else {
                        r.clone()
                    }
                })
                .collect();
            self.records = Arc::from(next);
        }
        self.show_error_summary = true;
        patched
    }
}

/// Refetches logs for `range`. A response that arrives after a newer refetch
/// has started is dropped; failures leave the previous records in place.
pub async fn refetch_logs(
    state: &Mutex<DashboardState>,
    api: &dyn DashboardApi,
    range: DateRange,
) -> FetchOutcome {
    let ticket = state.lock().begin_fetch(range);
    let result = api.fetch_logs(&ticket.range).await;
    if let Err(e) = &result {
        error!(
            kind = e.kind(),
            error = %e,
            start = %ticket.range.start_param(),
            end = %ticket.range.end_param(),
            "failed to fetch logs"
        );
    }

    let outcome = state.lock().complete_fetch(ticket, result);
    match &outcome {
        FetchOutcome::Applied { count } => info!(count, "logs refreshed"),
        FetchOutcome::Stale => warn!(
            start = %ticket.range.start_param(),
            end = %ticket.range.end_param(),
            "discarding stale log response"
        ),
        FetchOutcome::Failed(_) => {}
    }
    outcome
}
