use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::logs::string_or_number;
use crate::remote::{ApiError, DashboardApi};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    pub teacher_percentage_liability_account_id: i64,
    pub teacher_commission_expense_account_id: i64,
    pub teacher_percentage: f64,
}

/// Teacher body sent on create/update; the backend owns the id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherDraft {
    pub name: String,
    pub teacher_percentage_liability_account_id: i64,
    pub teacher_commission_expense_account_id: i64,
    pub teacher_percentage: f64,
}

impl From<&Teacher> for TeacherDraft {
    fn from(t: &Teacher) -> Self {
        TeacherDraft {
            name: t.name.clone(),
            teacher_percentage_liability_account_id: t.teacher_percentage_liability_account_id,
            teacher_commission_expense_account_id: t.teacher_commission_expense_account_id,
            teacher_percentage: t.teacher_percentage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub product_name: String,
    #[serde(default)]
    pub teacher_commission_expense_account_id: Option<i64>,
    #[serde(default)]
    pub teacher_percentage: Option<f64>,
    #[serde(default)]
    pub teacher_percentage_liability_account_id: Option<i64>,
    #[serde(default)]
    pub product_revenue_account_id: Option<i64>,
}

// Distinguishes an absent key (None) from an explicit null (Some(None)).
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProductFormPatch {
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub product_revenue_account_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "present")]
    pub teacher_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub custom_teacher_percentage: Option<Option<f64>>,
    #[serde(default)]
    pub show_advanced: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TeacherFormPatch {
    pub name: Option<String>,
    pub teacher_percentage_liability_account_id: Option<i64>,
    pub teacher_commission_expense_account_id: Option<i64>,
    pub teacher_percentage: Option<f64>,
}

/// Product editor. Commission fields follow the selected teacher unless a
/// custom percentage overrides the teacher's default.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductForm {
    pub draft: Product,
    pub editing_id: Option<i64>,
    pub selected_teacher_id: Option<String>,
    pub custom_teacher_percentage: Option<f64>,
    pub show_advanced: bool,
}

impl ProductForm {
    pub fn reset(&mut self) {
        *self = ProductForm::default();
    }

    /// Re-derives the commission fields from the selected teacher. Runs after
    /// any change to the selection, the teacher list, or the custom
    /// percentage.
    pub fn derive(&mut self, teachers: &[Teacher]) {
        let Some(selected) = self.selected_teacher_id.as_deref() else {
            return;
        };
        let Some(teacher) = teachers.iter().find(|t| t.id == selected) else {
            return;
        };
        self.draft.teacher_commission_expense_account_id =
            Some(teacher.teacher_commission_expense_account_id);
        self.draft.teacher_percentage_liability_account_id =
            Some(teacher.teacher_percentage_liability_account_id);
        self.draft.teacher_percentage = Some(
            self.custom_teacher_percentage
                .unwrap_or(teacher.teacher_percentage),
        );
    }

    pub fn begin_edit(&mut self, product: &Product, teachers: &[Teacher]) {
        self.draft = product.clone();
        self.editing_id = product.id;
        self.custom_teacher_percentage = product.teacher_percentage;
        self.show_advanced = false;

        let matching = teachers.iter().find(|t| {
            product.teacher_commission_expense_account_id
                == Some(t.teacher_commission_expense_account_id)
                && product.teacher_percentage_liability_account_id
                    == Some(t.teacher_percentage_liability_account_id)
        });
        match matching {
            Some(teacher) => {
                self.selected_teacher_id = Some(teacher.id.clone());
                if product.teacher_percentage != Some(teacher.teacher_percentage) {
                    self.show_advanced = true;
                }
            }
            None => self.selected_teacher_id = None,
        }
        self.derive(teachers);
    }

    pub fn apply(&mut self, patch: ProductFormPatch, teachers: &[Teacher]) {
        if let Some(name) = patch.product_name {
            self.draft.product_name = name;
        }
        if let Some(revenue) = patch.product_revenue_account_id {
            self.draft.product_revenue_account_id = revenue;
        }
        if let Some(teacher_id) = patch.teacher_id {
            self.selected_teacher_id = teacher_id.filter(|id| !id.is_empty());
        }
        if let Some(custom) = patch.custom_teacher_percentage {
            self.custom_teacher_percentage = custom;
            self.draft.teacher_percentage = custom;
        }
        if let Some(show) = patch.show_advanced {
            self.show_advanced = show;
        }
        self.derive(teachers);
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherForm {
    pub draft: TeacherDraft,
    pub editing_id: Option<String>,
}

impl TeacherForm {
    pub fn reset(&mut self) {
        *self = TeacherForm::default();
    }

    pub fn begin_edit(&mut self, teacher: &Teacher) {
        self.draft = TeacherDraft::from(teacher);
        self.editing_id = Some(teacher.id.clone());
    }

    pub fn apply(&mut self, patch: TeacherFormPatch) {
        if let Some(name) = patch.name {
            self.draft.name = name;
        }
        if let Some(v) = patch.teacher_percentage_liability_account_id {
            self.draft.teacher_percentage_liability_account_id = v;
        }
        if let Some(v) = patch.teacher_commission_expense_account_id {
            self.draft.teacher_commission_expense_account_id = v;
        }
        if let Some(v) = patch.teacher_percentage {
            self.draft.teacher_percentage = v;
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Remote(#[from] ApiError),
}

/// Screen state behind the product/teacher management view.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogState {
    pub products: Vec<Product>,
    pub teachers: Vec<Teacher>,
    pub loading_products: bool,
    pub loading_teachers: bool,
    pub saving_product: bool,
    pub saving_teacher: bool,
    pub deleting_product: Option<i64>,
    pub deleting_teacher: Option<String>,
    pub product_form: ProductForm,
    pub teacher_form: TeacherForm,
}

impl CatalogState {
    pub fn edit_product(&mut self, product_id: Option<i64>) -> Result<(), CatalogError> {
        let Some(id) = product_id else {
            self.product_form.reset();
            return Ok(());
        };
        let product = self
            .products
            .iter()
            .find(|p| p.id == Some(id))
            .cloned()
            .ok_or_else(|| CatalogError::Invalid(format!("unknown product {id}")))?;
        self.product_form.begin_edit(&product, &self.teachers);
        Ok(())
    }

    pub fn edit_teacher(&mut self, teacher_id: Option<&str>) -> Result<(), CatalogError> {
        let Some(id) = teacher_id else {
            self.teacher_form.reset();
            return Ok(());
        };
        let teacher = self
            .teachers
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| CatalogError::Invalid(format!("unknown teacher {id}")))?;
        self.teacher_form.begin_edit(&teacher);
        Ok(())
    }

    pub fn update_product_form(&mut self, patch: ProductFormPatch) {
        self.product_form.apply(patch, &self.teachers);
    }
}

pub async fn load_products(
    state: &Mutex<CatalogState>,
    api: &dyn DashboardApi,
) -> Result<usize, ApiError> {
    state.lock().loading_products = true;
    let result = api.list_products().await;
    let mut guard = state.lock();
    guard.loading_products = false;
    match result {
        Ok(products) => {
            let count = products.len();
            guard.products = products;
            Ok(count)
        }
        Err(e) => {
            error!(kind = e.kind(), error = %e, "failed to fetch products");
            Err(e)
        }
    }
}

pub async fn load_teachers(
    state: &Mutex<CatalogState>,
    api: &dyn DashboardApi,
) -> Result<usize, ApiError> {
    state.lock().loading_teachers = true;
    let result = api.list_teachers().await;
    let mut guard = state.lock();
    guard.loading_teachers = false;
    match result {
        Ok(teachers) => {
            let count = teachers.len();
            guard.teachers = teachers;
            let CatalogState {
                product_form,
                teachers,
                ..
            } = &mut *guard;
            product_form.derive(teachers);
            Ok(count)
        }
        Err(e) => {
            error!(kind = e.kind(), error = %e, "failed to fetch teachers");
            Err(e)
        }
    }
}

/// Loads both lists concurrently, as the management screen does on mount.
pub async fn open_catalog(
    state: &Mutex<CatalogState>,
    api: &dyn DashboardApi,
) -> (Result<usize, ApiError>, Result<usize, ApiError>) {
    tokio::join!(load_products(state, api), load_teachers(state, api))
}

/// Creates or updates the product in the form, then reloads the list and
/// resets the form. A failed save keeps the form untouched.
pub async fn submit_product(
    state: &Mutex<CatalogState>,
    api: &dyn DashboardApi,
) -> Result<(), CatalogError> {
    let (editing_id, draft) = {
        let mut guard = state.lock();
        let form = &guard.product_form;
        if form.draft.product_name.trim().is_empty() {
            return Err(CatalogError::Invalid("productName must not be empty".into()));
        }
        let snapshot = (form.editing_id, form.draft.clone());
        guard.saving_product = true;
        snapshot
    };

    let result = api.save_product(editing_id, &draft).await;
    state.lock().saving_product = false;
    if let Err(e) = result {
        error!(kind = e.kind(), error = %e, ?editing_id, "failed to save product");
        return Err(e.into());
    }

    info!(?editing_id, name = %draft.product_name, "product saved");
    state.lock().product_form.reset();
    // The save itself succeeded; a failed reload is already logged.
    let _ = load_products(state, api).await;
    Ok(())
}

pub async fn delete_product(
    state: &Mutex<CatalogState>,
    api: &dyn DashboardApi,
    product_id: i64,
) -> Result<(), CatalogError> {
    state.lock().deleting_product = Some(product_id);
    let result = api.delete_product(product_id).await;
    state.lock().deleting_product = None;
    if let Err(e) = result {
        error!(kind = e.kind(), error = %e, product_id, "failed to delete product");
        return Err(e.into());
    }
    let _ = load_products(state, api).await;
    Ok(())
}

pub async fn submit_teacher(
    state: &Mutex<CatalogState>,
    api: &dyn DashboardApi,
) -> Result<(), CatalogError> {
    let (editing_id, draft) = {
        let mut guard = state.lock();
        let form = &guard.teacher_form;
        if form.draft.name.trim().is_empty() {
            return Err(CatalogError::Invalid("name must not be empty".into()));
        }
        let snapshot = (form.editing_id.clone(), form.draft.clone());
        guard.saving_teacher = true;
        snapshot
    };

    let result = api.save_teacher(editing_id.as_deref(), &draft).await;
    state.lock().saving_teacher = false;
    if let Err(e) = result {
        error!(kind = e.kind(), error = %e, ?editing_id, "failed to save teacher");
        return Err(e.into());
    }

    info!(?editing_id, name = %draft.name, "teacher saved");
    state.lock().teacher_form.reset();
    let _ = load_teachers(state, api).await;
    Ok(())
}

pub async fn delete_teacher(
    state: &Mutex<CatalogState>,
    api: &dyn DashboardApi,
    teacher_id: &str,
) -> Result<(), CatalogError> {
    state.lock().deleting_teacher = Some(teacher_id.to_string());
    let result = api.delete_teacher(teacher_id).await;
    state.lock().deleting_teacher = None;
    if let Err(e) = result {
        error!(kind = e.kind(), error = %e, teacher_id, "failed to delete teacher");
        return Err(e.into());
    }
    let _ = load_teachers(state, api).await;
    Ok(())
}
