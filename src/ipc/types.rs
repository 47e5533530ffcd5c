use std::sync::Arc;

use chrono::Local;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::catalog::CatalogState;
use crate::dashboard::{DashboardState, DateRange};
use crate::remote::DashboardApi;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Shared by every in-flight request. Locks are never held across an await.
pub struct AppState {
    pub backend_url: String,
    pub api: Arc<dyn DashboardApi>,
    pub dashboard: Mutex<DashboardState>,
    pub catalog: Mutex<CatalogState>,
}

impl AppState {
    pub fn new(backend_url: String, api: Arc<dyn DashboardApi>) -> Self {
        AppState {
            backend_url,
            api,
            dashboard: Mutex::new(DashboardState::new(DateRange::default_at(Local::now()))),
            catalog: Mutex::new(CatalogState::default()),
        }
    }
}
