use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::catalog::{Product, Teacher, TeacherDraft};
use crate::dashboard::DateRange;
use crate::logs::LogRecord;
use crate::remote::{ApiError, DashboardApi};

/// In-memory backend. Failures are injected as HTTP status codes.
#[derive(Default)]
pub struct FakeApi {
    logs: Mutex<VecDeque<Result<Vec<LogRecord>, u16>>>,
    log_queries: Mutex<Vec<(String, String)>>,
    dismiss_failures: Mutex<HashMap<String, u16>>,
    dismiss_calls: Mutex<Vec<String>>,
    gates: Option<Mutex<HashMap<String, Arc<Semaphore>>>>,
    pub products: Mutex<Vec<Product>>,
    pub teachers: Mutex<Vec<Teacher>>,
    pub saved_products: Mutex<Vec<(Option<i64>, Product)>>,
    pub saved_teachers: Mutex<Vec<(Option<String>, TeacherDraft)>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_writes: Mutex<Option<u16>>,
}

fn status(status: u16, path: &str) -> ApiError {
    ApiError::Status {
        status,
        path: path.to_string(),
    }
}

impl FakeApi {
    /// Dismissals block until `release` is called for their transaction.
    pub fn gated() -> Self {
        FakeApi {
            gates: Some(Mutex::new(HashMap::new())),
            ..FakeApi::default()
        }
    }

    pub fn push_logs(&self, response: Result<Vec<LogRecord>, u16>) {
        self.logs.lock().push_back(response);
    }

    pub fn log_queries(&self) -> Vec<(String, String)> {
        self.log_queries.lock().clone()
    }

    pub fn fail_dismiss(&self, transaction_id: &str, code: u16) {
        self.dismiss_failures
            .lock()
            .insert(transaction_id.to_string(), code);
    }

    pub fn dismiss_calls(&self) -> Vec<String> {
        self.dismiss_calls.lock().clone()
    }

    pub fn release(&self, transaction_id: &str) {
        if let Some(gate) = self.gate(transaction_id) {
            gate.add_permits(1);
        }
    }

    fn gate(&self, transaction_id: &str) -> Option<Arc<Semaphore>> {
        let gates = self.gates.as_ref()?;
        let mut gates = gates.lock();
        Some(Arc::clone(
            gates
                .entry(transaction_id.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(0))),
        ))
    }

    fn check_write(&self, path: &str) -> Result<(), ApiError> {
        match *self.fail_writes.lock() {
            Some(code) => Err(status(code, path)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DashboardApi for FakeApi {
    async fn fetch_logs(&self, range: &DateRange) -> Result<Vec<LogRecord>, ApiError> {
        self.log_queries
            .lock()
            .push((range.start_param(), range.end_param()));
        let next = self.logs.lock().pop_front().unwrap_or(Ok(Vec::new()));
        next.map_err(|code| status(code, "/dashboard/logs"))
    }

    async fn dismiss_transaction(&self, transaction_id: &str) -> Result<(), ApiError> {
        self.dismiss_calls.lock().push(transaction_id.to_string());
        if let Some(gate) = self.gate(transaction_id) {
            let _permit = gate.acquire().await;
        }
        let failure = self.dismiss_failures.lock().get(transaction_id).copied();
        match failure {
            Some(code) => Err(status(code, "/dashboard/logs/dismiss")),
            None => Ok(()),
        }
    }

    async fn list_products(&self) -> Result<Vec<Product>, ApiError> {
        Ok(self.products.lock().clone())
    }

    async fn save_product(&self, id: Option<i64>, product: &Product) -> Result<(), ApiError> {
        self.check_write("/dashboard/products")?;
        self.saved_products.lock().push((id, product.clone()));
        Ok(())
    }

    async fn delete_product(&self, id: i64) -> Result<(), ApiError> {
        self.check_write("/dashboard/products")?;
        self.deleted.lock().push(format!("product:{id}"));
        self.products.lock().retain(|p| p.id != Some(id));
        Ok(())
    }

    async fn list_teachers(&self) -> Result<Vec<Teacher>, ApiError> {
        Ok(self.teachers.lock().clone())
    }

    async fn save_teacher(
        &self,
        id: Option<&str>,
        teacher: &TeacherDraft,
    ) -> Result<(), ApiError> {
        self.check_write("/dashboard/teachers")?;
        self.saved_teachers
            .lock()
            .push((id.map(str::to_string), teacher.clone()));
        Ok(())
    }

    async fn delete_teacher(&self, id: &str) -> Result<(), ApiError> {
        self.check_write("/dashboard/teachers")?;
        self.deleted.lock().push(format!("teacher:{id}"));
        self.teachers.lock().retain(|t| t.id != id);
        Ok(())
    }
}
