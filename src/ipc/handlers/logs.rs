use crate::dashboard::{refetch_logs, DashboardState, DateRange, FetchOutcome};
use crate::dismissal::dismiss_error;
use crate::ipc::error::{err, ok, remote_err};
use crate::ipc::types::{AppState, Request};
use crate::logs::{
    failing_records, group_timestamp, is_failed_group, payment_entries, qoyod_entries, LogRecord,
};
use serde_json::json;

fn record_json(r: &LogRecord) -> serde_json::Value {
    let mut value = json!(r);
    value["tone"] = json!(r.tone());
    value
}

fn ids(records: &[&LogRecord]) -> Vec<String> {
    records.iter().map(|r| r.id.clone()).collect()
}

/// Everything the log screen renders, derived fresh from current state.
pub(crate) fn render_view(state: &DashboardState) -> serde_json::Value {
    let view = state.view();

    let transactions: Vec<serde_json::Value> = view
        .grouped
        .iter()
        .map(|(transaction_id, records)| {
            json!({
                "transactionId": transaction_id,
                "date": group_timestamp(records),
                "failed": is_failed_group(records),
                "dismissing": state.is_dismissing(transaction_id),
                "records": records.iter().map(|r| record_json(r)).collect::<Vec<_>>(),
                "paymentIds": ids(&payment_entries(records)),
                "qoyodIds": ids(&qoyod_entries(records)),
            })
        })
        .collect();

    let failed: Vec<serde_json::Value> = view
        .failed()
        .into_iter()
        .map(|(transaction_id, records)| {
            let failures: Vec<serde_json::Value> = failing_records(records)
                .into_iter()
                .map(|r| {
                    json!({
                        "id": r.id,
                        "entityType": r.entity_type,
                        "message": r.message,
                        "errorCode": r.error_code,
                        "errorDetails": r.error_details,
                    })
                })
                .collect();
            json!({
                "transactionId": transaction_id,
                "dismissing": state.is_dismissing(transaction_id),
                "failures": failures,
            })
        })
        .collect();

    json!({
        "loading": state.loading(),
        "searchQuery": state.search_query(),
        "dateRange": state.date_range(),
        "showErrorSummary": state.show_error_summary(),
        "recordCount": state.records().len(),
        "matchedCount": view.filtered.len(),
        "transactions": transactions,
        "failed": failed,
        "emptyHint": view.grouped.is_empty() && !state.search_query().is_empty(),
    })
}

async fn refetch_and_render(state: &AppState, req: &Request, range: DateRange) -> serde_json::Value {
    let outcome = refetch_logs(&state.dashboard, state.api.as_ref(), range).await;
    if let FetchOutcome::Failed(e) = &outcome {
        return remote_err(&req.id, e);
    }
    let view = render_view(&state.dashboard.lock());
    ok(&req.id, json!({ "outcome": outcome.label(), "view": view }))
}

async fn handle_dashboard_open(state: &AppState, req: &Request) -> serde_json::Value {
    let range = state.dashboard.lock().date_range();
    refetch_and_render(state, req, range).await
}

/// A range endpoint may be missing, null, or a date string.
fn optional_date_param<'a>(req: &'a Request, key: &str) -> Result<Option<&'a str>, String> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(format!("{key} must be a YYYY-MM-DD string, got {other}")),
    }
}

async fn handle_logs_set_range(state: &AppState, req: &Request) -> serde_json::Value {
    let (from, to) = match (
        optional_date_param(req, "from"),
        optional_date_param(req, "to"),
    ) {
        (Ok(from), Ok(to)) => (from, to),
        (Err(msg), _) | (_, Err(msg)) => return err(&req.id, "bad_params", msg, None),
    };
    let range = match DateRange::parse(from, to) {
        Ok(r) => r,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    refetch_and_render(state, req, range).await
}

fn handle_logs_search(state: &AppState, req: &Request) -> serde_json::Value {
    let Some(query) = req.params.get("query").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing params.query", None);
    };
    let mut dashboard = state.dashboard.lock();
    dashboard.set_search_query(query);
    ok(&req.id, json!({ "view": render_view(&dashboard) }))
}

fn handle_logs_view(state: &AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "view": render_view(&state.dashboard.lock()) }))
}

fn handle_toggle_error_summary(state: &AppState, req: &Request) -> serde_json::Value {
    let shown = state.dashboard.lock().toggle_error_summary();
    ok(&req.id, json!({ "showErrorSummary": shown }))
}

async fn handle_logs_dismiss(state: &AppState, req: &Request) -> serde_json::Value {
    let transaction_id = match req.params.get("transactionId").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.to_string(),
        _ => return err(&req.id, "bad_params", "missing transactionId", None),
    };

    match dismiss_error(&state.dashboard, state.api.as_ref(), &transaction_id).await {
        Ok(patched) => {
            let view = render_view(&state.dashboard.lock());
            ok(
                &req.id,
                json!({ "transactionId": transaction_id, "patched": patched, "view": view }),
            )
        }
        Err(e) => remote_err(&req.id, &e),
    }
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.open" | "logs.refresh" => Some(handle_dashboard_open(state, req).await),
        "logs.setRange" => Some(handle_logs_set_range(state, req).await),
        "logs.search" => Some(handle_logs_search(state, req)),
        "logs.view" => Some(handle_logs_view(state, req)),
        "logs.toggleErrorSummary" => Some(handle_toggle_error_summary(state, req)),
        "logs.dismiss" => Some(handle_logs_dismiss(state, req).await),
        _ => None,
    }
}
