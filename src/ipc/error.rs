use serde_json::json;

use crate::catalog::CatalogError;
use crate::remote::ApiError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn remote_err(id: &str, e: &ApiError) -> serde_json::Value {
    let mut details = json!({ "kind": e.kind() });
    if let ApiError::Status { status, .. } = e {
        details["status"] = json!(status);
    }
    err(id, "remote_failed", e.to_string(), Some(details))
}

pub fn catalog_err(id: &str, e: &CatalogError) -> serde_json::Value {
    match e {
        CatalogError::Invalid(msg) => err(id, "bad_params", msg.clone(), None),
        CatalogError::Remote(api) => remote_err(id, api),
    }
}
