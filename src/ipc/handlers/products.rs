use crate::catalog::{
    delete_product, load_products, open_catalog, submit_product, CatalogState, ProductFormPatch,
};
use crate::ipc::error::{catalog_err, err, ok, remote_err};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn snapshot(catalog: &CatalogState) -> serde_json::Value {
    json!(catalog)
}

fn product_form_json(catalog: &CatalogState) -> serde_json::Value {
    json!({
        "form": catalog.product_form,
        "teachers": catalog.teachers,
        "saving": catalog.saving_product,
    })
}

async fn handle_catalog_open(state: &AppState, req: &Request) -> serde_json::Value {
    let (products, teachers) = open_catalog(&state.catalog, state.api.as_ref()).await;

    let mut failures = Vec::new();
    if let Err(e) = &products {
        failures.push(json!({ "list": "products", "kind": e.kind(), "message": e.to_string() }));
    }
    if let Err(e) = &teachers {
        failures.push(json!({ "list": "teachers", "kind": e.kind(), "message": e.to_string() }));
    }
    let catalog = snapshot(&state.catalog.lock());
    ok(&req.id, json!({ "catalog": catalog, "failures": failures }))
}

async fn handle_products_list(state: &AppState, req: &Request) -> serde_json::Value {
    match load_products(&state.catalog, state.api.as_ref()).await {
        Ok(_) => {
            let products = json!(state.catalog.lock().products);
            ok(&req.id, json!({ "products": products }))
        }
        Err(e) => remote_err(&req.id, &e),
    }
}

fn handle_form_get(state: &AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, product_form_json(&state.catalog.lock()))
}

fn handle_form_edit(state: &AppState, req: &Request) -> serde_json::Value {
    let product_id = match req.params.get("productId") {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => match v.as_i64() {
            Some(id) => Some(id),
            None => return err(&req.id, "bad_params", "productId must be an integer", None),
        },
    };
    let mut catalog = state.catalog.lock();
    if let Err(e) = catalog.edit_product(product_id) {
        return catalog_err(&req.id, &e);
    }
    ok(&req.id, product_form_json(&catalog))
}

fn handle_form_update(state: &AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("patch") else {
        return err(&req.id, "bad_params", "missing params.patch", None);
    };
    let patch: ProductFormPatch = match serde_json::from_value(raw.clone()) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "bad_params", format!("invalid patch: {e}"), None),
    };
    let mut catalog = state.catalog.lock();
    catalog.update_product_form(patch);
    ok(&req.id, product_form_json(&catalog))
}

async fn handle_products_save(state: &AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = submit_product(&state.catalog, state.api.as_ref()).await {
        return catalog_err(&req.id, &e);
    }
    let catalog = state.catalog.lock();
    ok(
        &req.id,
        json!({ "products": catalog.products, "form": catalog.product_form }),
    )
}

async fn handle_products_delete(state: &AppState, req: &Request) -> serde_json::Value {
    let Some(product_id) = req.params.get("productId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing productId", None);
    };
    if let Err(e) = delete_product(&state.catalog, state.api.as_ref(), product_id).await {
        return catalog_err(&req.id, &e);
    }
    let products = json!(state.catalog.lock().products);
    ok(&req.id, json!({ "productId": product_id, "products": products }))
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "catalog.open" => Some(handle_catalog_open(state, req).await),
        "products.list" => Some(handle_products_list(state, req).await),
        "products.form.get" => Some(handle_form_get(state, req)),
        "products.form.edit" => Some(handle_form_edit(state, req)),
        "products.form.update" => Some(handle_form_update(state, req)),
        "products.save" => Some(handle_products_save(state, req).await),
        "products.delete" => Some(handle_products_delete(state, req).await),
        _ => None,
    }
}
