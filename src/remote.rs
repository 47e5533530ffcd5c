use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::catalog::{Product, Teacher, TeacherDraft};
use crate::dashboard::DateRange;
use crate::logs::LogRecord;

const TUNNEL_BYPASS_HEADER: &str = "ngrok-skip-browser-warning";
const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{path} answered HTTP {status}")]
    Status { status: u16, path: String },
    #[error("{path} reported success=false")]
    Rejected { path: String },
    #[error("malformed payload from {path}: {reason}")]
    Malformed { path: String, reason: String },
    #[error("cannot encode request body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("backend url cannot carry a path: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Transport(_) => "transport",
            ApiError::Status { .. } => "status",
            ApiError::Rejected { .. } => "rejected",
            ApiError::Malformed { .. } => "malformed",
            ApiError::Encode(_) => "encode",
            ApiError::InvalidUrl(_) => "invalid_url",
        }
    }
}

/// The backend's `/dashboard` REST surface. The backend is authoritative;
/// callers patch local state only after a call succeeds.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn fetch_logs(&self, range: &DateRange) -> Result<Vec<LogRecord>, ApiError>;
    async fn dismiss_transaction(&self, transaction_id: &str) -> Result<(), ApiError>;

    async fn list_products(&self) -> Result<Vec<Product>, ApiError>;
    async fn save_product(&self, id: Option<i64>, product: &Product) -> Result<(), ApiError>;
    async fn delete_product(&self, id: i64) -> Result<(), ApiError>;

    async fn list_teachers(&self) -> Result<Vec<Teacher>, ApiError>;
    async fn save_teacher(&self, id: Option<&str>, teacher: &TeacherDraft)
        -> Result<(), ApiError>;
    async fn delete_teacher(&self, id: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub backend_url: Url,
    pub request_timeout: Duration,
    pub tunnel_bypass: bool,
}

pub struct HttpDashboardApi {
    base: Url,
    client: Client,
}

impl HttpDashboardApi {
    pub fn new(settings: &RemoteSettings) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if settings.tunnel_bypass {
            headers.insert(
                HeaderName::from_static(TUNNEL_BYPASS_HEADER),
                HeaderValue::from_static("1"),
            );
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self {
            base: settings.backend_url.clone(),
            client,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::InvalidUrl(self.base.to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<Response, ApiError> {
        let path = url.path().to_string();
        let request_id = Uuid::new_v4().to_string();
        debug!(%method, %path, %request_id, "remote request");

        let mut builder = self
            .client
            .request(method, url)
            .header(REQUEST_ID_HEADER, request_id.as_str());
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                path,
            });
        }
        Ok(response)
    }

    async fn get_json(&self, url: Url) -> Result<(Value, String), ApiError> {
        let path = url.path().to_string();
        let response = self.send(Method::GET, url, None).await?;
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::Malformed {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        Ok((body, path))
    }
}

/// Unwraps `{ success: bool, <key>: [...] }`.
fn unwrap_envelope<T: DeserializeOwned>(body: Value, key: &str, path: &str) -> Result<T, ApiError> {
    let malformed = |reason: String| ApiError::Malformed {
        path: path.to_string(),
        reason,
    };
    let success = body
        .get("success")
        .and_then(Value::as_bool)
        .ok_or_else(|| malformed("missing success flag".to_string()))?;
    if !success {
        return Err(ApiError::Rejected {
            path: path.to_string(),
        });
    }
    let items = body
        .get(key)
        .cloned()
        .ok_or_else(|| malformed(format!("missing {key}")))?;
    serde_json::from_value(items).map_err(|e| malformed(e.to_string()))
}

#[async_trait]
impl DashboardApi for HttpDashboardApi {
    async fn fetch_logs(&self, range: &DateRange) -> Result<Vec<LogRecord>, ApiError> {
        let mut url = self.endpoint(&["dashboard", "logs"])?;
        url.query_pairs_mut()
            .append_pair("startDate", &range.start_param())
            .append_pair("endDate", &range.end_param());
        let (body, path) = self.get_json(url).await?;
        unwrap_envelope(body, "logs", &path)
    }

    async fn dismiss_transaction(&self, transaction_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["dashboard", "logs", "dismiss", transaction_id])?;
        self.send(Method::PUT, url, None).await?;
        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<Product>, ApiError> {
        let url = self.endpoint(&["dashboard", "products"])?;
        let (body, path) = self.get_json(url).await?;
        unwrap_envelope(body, "products", &path)
    }

    async fn save_product(&self, id: Option<i64>, product: &Product) -> Result<(), ApiError> {
        let body = serde_json::to_value(product)?;
        let (method, url) = match id {
            Some(id) => (
                Method::PUT,
                self.endpoint(&["dashboard", "products", &id.to_string()])?,
            ),
            None => (Method::POST, self.endpoint(&["dashboard", "products"])?),
        };
        self.send(method, url, Some(body)).await?;
        Ok(())
    }

    async fn delete_product(&self, id: i64) -> Result<(), ApiError> {
        let url = self.endpoint(&["dashboard", "products", &id.to_string()])?;
        self.send(Method::DELETE, url, None).await?;
        Ok(())
    }

    async fn list_teachers(&self) -> Result<Vec<Teacher>, ApiError> {
        // Unlike the other lists, teachers come back as a bare array.
        let url = self.endpoint(&["dashboard", "teachers"])?;
        let (body, path) = self.get_json(url).await?;
        serde_json::from_value(body).map_err(|e| ApiError::Malformed {
            path,
            reason: e.to_string(),
        })
    }

    async fn save_teacher(
        &self,
        id: Option<&str>,
        teacher: &TeacherDraft,
    ) -> Result<(), ApiError> {
        let body = serde_json::to_value(teacher)?;
        let (method, url) = match id {
            Some(id) => (Method::PUT, self.endpoint(&["dashboard", "teachers", id])?),
            None => (Method::POST, self.endpoint(&["dashboard", "teachers"])?),
        };
        self.send(method, url, Some(body)).await?;
        Ok(())
    }

    async fn delete_teacher(&self, id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["dashboard", "teachers", id])?;
        self.send(Method::DELETE, url, None).await?;
        Ok(())
    }
}
