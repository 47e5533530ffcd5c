use crate::catalog::{delete_teacher, load_teachers, submit_teacher, CatalogState, TeacherFormPatch};
use crate::ipc::error::{catalog_err, err, ok, remote_err};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn teacher_form_json(catalog: &CatalogState) -> serde_json::Value {
    json!({
        "form": catalog.teacher_form,
        "saving": catalog.saving_teacher,
    })
}

async fn handle_teachers_list(state: &AppState, req: &Request) -> serde_json::Value {
    match load_teachers(&state.catalog, state.api.as_ref()).await {
        Ok(_) => {
            let teachers = json!(state.catalog.lock().teachers);
            ok(&req.id, json!({ "teachers": teachers }))
        }
        Err(e) => remote_err(&req.id, &e),
    }
}

fn handle_form_get(state: &AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, teacher_form_json(&state.catalog.lock()))
}

fn handle_form_edit(state: &AppState, req: &Request) -> serde_json::Value {
    let teacher_id = match req.params.get("teacherId") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(_) => return err(&req.id, "bad_params", "teacherId must be a string", None),
    };
    let mut catalog = state.catalog.lock();
    if let Err(e) = catalog.edit_teacher(teacher_id.as_deref()) {
        return catalog_err(&req.id, &e);
    }
    ok(&req.id, teacher_form_json(&catalog))
}

fn handle_form_update(state: &AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("patch") else {
        return err(&req.id, "bad_params", "missing params.patch", None);
    };
    let patch: TeacherFormPatch = match serde_json::from_value(raw.clone()) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "bad_params", format!("invalid patch: {e}"), None),
    };
    let mut catalog = state.catalog.lock();
    catalog.teacher_form.apply(patch);
    ok(&req.id, teacher_form_json(&catalog))
}

async fn handle_teachers_save(state: &AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = submit_teacher(&state.catalog, state.api.as_ref()).await {
        return catalog_err(&req.id, &e);
    }
    let catalog = state.catalog.lock();
    ok(
        &req.id,
        json!({ "teachers": catalog.teachers, "form": catalog.teacher_form }),
    )
}

async fn handle_teachers_delete(state: &AppState, req: &Request) -> serde_json::Value {
    let teacher_id = match req.params.get("teacherId").and_then(|v| v.as_str()) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => return err(&req.id, "bad_params", "missing teacherId", None),
    };
    if let Err(e) = delete_teacher(&state.catalog, state.api.as_ref(), &teacher_id).await {
        return catalog_err(&req.id, &e);
    }
    let teachers = json!(state.catalog.lock().teachers);
    ok(&req.id, json!({ "teacherId": teacher_id, "teachers": teachers }))
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(handle_teachers_list(state, req).await),
        "teachers.form.get" => Some(handle_form_get(state, req)),
        "teachers.form.edit" => Some(handle_form_edit(state, req)),
        "teachers.form.update" => Some(handle_form_update(state, req)),
        "teachers.save" => Some(handle_teachers_save(state, req).await),
        "teachers.delete" => Some(handle_teachers_delete(state, req).await),
        _ => None,
    }
}
