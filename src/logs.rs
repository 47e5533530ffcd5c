use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// Entity type the backend uses for the payment side of a transaction.
pub const PAYMENT_ENTITY: &str = "PAYMENT";
/// Catalog sync events; shown on neither tab.
pub const PRODUCT_ENTITY: &str = "Product";

const FAILED_STATUSES: [&str; 2] = ["failed", "syncfailed"];
const POSITIVE_STATUSES: [&str; 3] = ["success", "created", "synced"];

/// One event in a transaction's processing history, as served by
/// `GET /dashboard/logs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub transaction_id: String,
    #[serde(default)]
    pub entity_type: String,
    #[serde(default)]
    pub entity_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
    // Missing and explicit null both land on None.
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub error_code: Option<String>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub error_details: Option<String>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub qoyod_invoice_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusTone {
    Positive,
    Negative,
    Neutral,
}

impl LogRecord {
    pub fn has_failed_status(&self) -> bool {
        let status = self.status.to_lowercase();
        FAILED_STATUSES.contains(&status.as_str())
    }

    /// A failure that has not been dismissed yet: failed status and an
    /// error code still attached.
    pub fn is_unresolved_failure(&self) -> bool {
        self.has_failed_status() && self.error_code.is_some()
    }

    pub fn tone(&self) -> StatusTone {
        let status = self.status.to_lowercase();
        if POSITIVE_STATUSES.contains(&status.as_str()) {
            StatusTone::Positive
        } else if FAILED_STATUSES.contains(&status.as_str()) {
            StatusTone::Negative
        } else {
            StatusTone::Neutral
        }
    }

    pub fn parsed_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(self.timestamp.trim()).ok()
    }

    /// Calendar date of the event. Offset-less timestamps are taken as
    /// written.
    pub fn event_date(&self) -> Option<NaiveDate> {
        if let Some(t) = self.parsed_timestamp() {
            return Some(t.date_naive());
        }
        let raw = self.timestamp.trim();
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .map(|t| t.date())
            .ok()
    }

    /// Copy of this record with its error cleared; every other field is kept.
    pub fn with_error_cleared(&self) -> LogRecord {
        LogRecord {
            error_code: None,
            error_details: None,
            ..self.clone()
        }
    }
}

pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn optional_string_or_number<'de, D>(
    deserializer: D,
) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Records keyed by transaction id, in order of first appearance.
pub type Grouped<'a> = IndexMap<&'a str, Vec<&'a LogRecord>>;

/// Case-insensitive substring match on `transactionId`. An empty query keeps
/// every record.
pub fn filter_by_transaction<'a>(records: &'a [LogRecord], query: &str) -> Vec<&'a LogRecord> {
    if query.is_empty() {
        return records.iter().collect();
    }
    let needle = query.to_lowercase();
    records
        .iter()
        .filter(|r| r.transaction_id.to_lowercase().contains(&needle))
        .collect()
}

pub fn group_by_transaction<'a>(records: &[&'a LogRecord]) -> Grouped<'a> {
    let mut grouped: Grouped<'a> = IndexMap::new();
    for record in records {
        grouped
            .entry(record.transaction_id.as_str())
            .or_default()
            .push(*record);
    }
    grouped
}

pub fn is_failed_group(records: &[&LogRecord]) -> bool {
    records.iter().any(|r| r.is_unresolved_failure())
}

pub fn failed_transactions<'g, 'a>(grouped: &'g Grouped<'a>) -> Vec<(&'a str, &'g [&'a LogRecord])> {
    grouped
        .iter()
        .filter(|(_, records)| is_failed_group(records))
        .map(|(id, records)| (*id, records.as_slice()))
        .collect()
}

/// The members of a group that the error summary lists.
pub fn failing_records<'a>(group: &[&'a LogRecord]) -> Vec<&'a LogRecord> {
    group
        .iter()
        .copied()
        .filter(|r| r.is_unresolved_failure())
        .collect()
}

pub fn payment_entries<'a>(group: &[&'a LogRecord]) -> Vec<&'a LogRecord> {
    group
        .iter()
        .copied()
        .filter(|r| r.entity_type == PAYMENT_ENTITY)
        .collect()
}

pub fn qoyod_entries<'a>(group: &[&'a LogRecord]) -> Vec<&'a LogRecord> {
    group
        .iter()
        .copied()
        .filter(|r| r.entity_type != PAYMENT_ENTITY && r.entity_type != PRODUCT_ENTITY)
        .collect()
}

/// Date shown on a group header: the first record's timestamp.
pub fn group_timestamp(group: &[&LogRecord]) -> Option<NaiveDate> {
    group.first().and_then(|r| r.event_date())
}

/// Derived view over a record list and a search query. Rebuilt from scratch
/// whenever either input changes; holds no state of its own.
#[derive(Debug)]
pub struct LogView<'a> {
    pub filtered: Vec<&'a LogRecord>,
    pub grouped: Grouped<'a>,
}

impl<'a> LogView<'a> {
    pub fn new(records: &'a [LogRecord], search_query: &str) -> Self {
        let filtered = filter_by_transaction(records, search_query);
        let grouped = group_by_transaction(&filtered);
        LogView { filtered, grouped }
    }

    pub fn failed(&self) -> Vec<(&'a str, &[&'a LogRecord])> {
        failed_transactions(&self.grouped)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn record(
        id: &str,
        transaction_id: &str,
        status: &str,
        error_code: Option<&str>,
    ) -> LogRecord {
        LogRecord {
            id: id.to_string(),
            transaction_id: transaction_id.to_string(),
            entity_type: PAYMENT_ENTITY.to_string(),
            entity_name: "Payment".to_string(),
            status: status.to_string(),
            message: format!("{status} event"),
            timestamp: "2024-05-01T10:00:00Z".to_string(),
            error_code: error_code.map(str::to_string),
            error_details: error_code.map(|c| format!("details for {c}")),
            qoyod_invoice_id: None,
        }
    }

    pub(crate) fn scenario() -> Vec<LogRecord> {
        vec![
            record("1", "T1", "Failed", Some("E1")),
            record("2", "T1", "Success", None),
            record("3", "T2", "Success", None),
        ]
    }

    #[test]
    fn empty_query_groups_everything_in_arrival_order() {
        let records = scenario();
        let view = LogView::new(&records, "");

        assert_eq!(view.filtered.len(), 3);
        let keys: Vec<&str> = view.grouped.keys().copied().collect();
        assert_eq!(keys, vec!["T1", "T2"]);
        let t1: Vec<&str> = view.grouped["T1"].iter().map(|r| r.id.as_str()).collect();
        assert_eq!(t1, vec!["1", "2"]);

        let failed = view.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "T1");
        assert_eq!(failed[0].1.len(), 2);
    }

    #[test]
    fn search_is_case_insensitive_substring_on_transaction_id() {
        let records = scenario();
        let view = LogView::new(&records, "t2");

        let ids: Vec<&str> = view.filtered.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["3"]);
        assert_eq!(view.grouped.len(), 1);
        assert!(view.grouped.contains_key("T2"));
        assert!(view.failed().is_empty());
    }

    #[test]
    fn interleaved_transactions_keep_first_occurrence_order() {
        let records = vec![
            record("a", "B-2", "Success", None),
            record("b", "A-1", "Success", None),
            record("c", "B-2", "Created", None),
        ];
        let view = LogView::new(&records, "");
        let keys: Vec<&str> = view.grouped.keys().copied().collect();
        assert_eq!(keys, vec!["B-2", "A-1"]);
        let total: usize = view.grouped.values().map(Vec::len).sum();
        assert_eq!(total, records.len());
    }

    #[test]
    fn empty_records_yield_empty_view() {
        let records: Vec<LogRecord> = Vec::new();
        let view = LogView::new(&records, "anything");
        assert!(view.filtered.is_empty());
        assert!(view.grouped.is_empty());
        assert!(view.failed().is_empty());
    }

    #[test]
    fn failed_status_without_error_code_is_not_flagged() {
        let records = vec![
            record("1", "T9", "SyncFailed", None),
            record("2", "T9", "FAILED", None),
        ];
        let view = LogView::new(&records, "");
        assert!(view.failed().is_empty());

        let flagged = vec![record("3", "T8", "syncfailed", Some("QOYOD_422"))];
        let view = LogView::new(&flagged, "");
        assert_eq!(view.failed().len(), 1);
    }

    #[test]
    fn missing_and_null_error_codes_both_decode_as_none() {
        let missing: LogRecord = serde_json::from_value(json!({
            "id": 7,
            "transactionId": "T7",
            "status": "failed",
            "timestamp": "2024-05-01T10:00:00Z"
        }))
        .expect("decode");
        let explicit: LogRecord = serde_json::from_value(json!({
            "id": "8",
            "transactionId": "T7",
            "status": "failed",
            "errorCode": null,
            "errorDetails": null,
            "timestamp": "2024-05-01T10:00:00Z"
        }))
        .expect("decode");

        assert_eq!(missing.id, "7");
        assert!(!missing.is_unresolved_failure());
        assert!(!explicit.is_unresolved_failure());
    }

    #[test]
    fn numeric_error_fields_decode_alongside_strings() {
        let batch: Vec<LogRecord> = serde_json::from_value(json!([
            {
                "id": 1,
                "transactionId": "T1",
                "status": "Failed",
                "timestamp": "2024-05-01T10:00:00Z",
                "errorCode": "E1"
            },
            {
                "id": 2,
                "transactionId": "T2",
                "status": "SyncFailed",
                "timestamp": "2024-05-01T10:05:00Z",
                "errorCode": 422,
                "errorDetails": "unprocessable"
            },
            {
                "id": 3,
                "transactionId": "T3",
                "status": "Created",
                "timestamp": "2024-05-01T10:06:00Z",
                "qoyodInvoiceId": 7781
            }
        ]))
        .expect("decode");

        assert_eq!(batch[0].error_code.as_deref(), Some("E1"));
        assert_eq!(batch[1].error_code.as_deref(), Some("422"));
        assert!(batch[1].is_unresolved_failure());
        assert_eq!(batch[2].qoyod_invoice_id.as_deref(), Some("7781"));

        let view = LogView::new(&batch, "");
        let failed: Vec<&str> = view.failed().iter().map(|(id, _)| *id).collect();
        assert_eq!(failed, vec!["T1", "T2"]);
    }

    #[test]
    fn group_date_accepts_timestamps_without_offset() {
        let mut naive = record("1", "T1", "Success", None);
        naive.timestamp = "2024-05-01T10:00:00.000".to_string();
        let mut spaced = record("2", "T2", "Success", None);
        spaced.timestamp = "2024-05-02 23:59:59".to_string();
        let mut garbage = record("3", "T3", "Success", None);
        garbage.timestamp = "yesterday".to_string();

        let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d);
        assert_eq!(group_timestamp(&[&naive]), day(2024, 5, 1));
        assert_eq!(group_timestamp(&[&spaced]), day(2024, 5, 2));
        assert_eq!(group_timestamp(&[&garbage]), None);
        assert_eq!(
            group_timestamp(&[&record("4", "T4", "Success", None)]),
            day(2024, 5, 1)
        );
    }

    #[test]
    fn tabs_split_payment_from_qoyod_and_drop_product_events() {
        let mut invoice = record("2", "T1", "Created", None);
        invoice.entity_type = "Invoice".to_string();
        let mut product = record("3", "T1", "Synced", None);
        product.entity_type = PRODUCT_ENTITY.to_string();
        let records = vec![record("1", "T1", "Success", None), invoice, product];
        let view = LogView::new(&records, "");
        let group = &view.grouped["T1"];

        let payment: Vec<&str> = payment_entries(group).iter().map(|r| r.id.as_str()).collect();
        let qoyod: Vec<&str> = qoyod_entries(group).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(payment, vec!["1"]);
        assert_eq!(qoyod, vec!["2"]);
    }

    #[test]
    fn tone_follows_status_families() {
        assert_eq!(record("1", "T", "SYNCED", None).tone(), StatusTone::Positive);
        assert_eq!(record("1", "T", "SyncFailed", None).tone(), StatusTone::Negative);
        assert_eq!(record("1", "T", "pending", None).tone(), StatusTone::Neutral);
    }

    #[test]
    fn failing_records_lists_only_unresolved_members() {
        let records = scenario();
        let view = LogView::new(&records, "");
        let failing = failing_records(&view.grouped["T1"]);
        assert_eq!(failing.len(), 1);
        assert_eq!(failing[0].id, "1");
        assert!(group_timestamp(&view.grouped["T1"]).is_some());
    }
}
