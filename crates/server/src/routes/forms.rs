use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    db::{
        self,
        models::{FormField, FormFieldRow},
        Database,
    },
    error::{is_unique_violation, AppError, Result},
    middleware::auth::AuthUser,
    services::{
        access::{allow_public, authorize, Action, PublicOperation, Resource},
        activity::{log_activity, ActivityEntry},
    },
    AppState,
};

const FIELD_TYPES: [&str; 6] = ["text", "email", "tel", "textarea", "select", "date"];

const FIELD_SELECT: &str = "SELECT id, label, name, field_type, options, is_required, placeholder, position, is_active FROM form_fields";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/booking-form", get(booking_form))
        .route("/booking-form/order", put(reorder_fields))
        .route("/form-fields", post(create_field).get(all_fields))
        .route("/form-fields/:id", put(update_field).delete(delete_field))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRequest {
    pub label: Option<String>,
    pub name: Option<String>,
    pub field_type: Option<String>,
    pub options: Option<Vec<String>>,
    pub is_required: Option<bool>,
    pub placeholder: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    pub order: Vec<i64>,
}

// Machine name for a label: lowercase, spaces become `_`, anything outside
// `[a-z0-9_]` is dropped.
pub fn field_name(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            'a'..='z' | '0'..='9' | '_' => Some(c),
            _ => None,
        })
        .collect()
}

fn check_field_type(field_type: &str) -> Result<()> {
    if FIELD_TYPES.contains(&field_type) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Field type must be one of: {}",
            FIELD_TYPES.join(", ")
        )))
    }
}

fn checked_name(raw: &str) -> Result<String> {
    let name = field_name(raw);
    if name.is_empty() {
        return Err(AppError::Validation(
            "Field name must contain letters or digits".to_string(),
        ));
    }
    Ok(name)
}

fn encode_options(options: &Option<Vec<String>>) -> Result<Option<String>> {
    options
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| AppError::Internal(format!("Failed to encode field options: {e}")))
}

fn duplicate_name(name: &str) -> AppError {
    AppError::Conflict(format!("A form field named '{name}' already exists"))
}

async fn fetch_field(db: &Database, id: i64) -> Result<FormField> {
    sqlx::query_as::<_, FormFieldRow>(&format!("{FIELD_SELECT} WHERE id = ?"))
        .bind(id)
        .fetch_optional(&db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Form field not found.".to_string()))?
        .try_into()
}

async fn fetch_fields(db: &Database, active_only: bool) -> Result<Vec<FormField>> {
    let filter = if active_only { " WHERE is_active = 1" } else { "" };
    sqlx::query_as::<_, FormFieldRow>(&format!("{FIELD_SELECT}{filter} ORDER BY position ASC, id ASC"))
        .fetch_all(&db.pool)
        .await?
        .into_iter()
        .map(FormField::try_from)
        .collect()
}

async fn booking_form(State(state): State<AppState>) -> Result<Json<Vec<FormField>>> {
    allow_public(None, PublicOperation::ReadFormSchema)?;
    Ok(Json(fetch_fields(&state.db, true).await?))
}

async fn all_fields(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<FormField>>> {
    authorize(&state.db, &user, Action::Read, &Resource::FormSchema).await?;
    Ok(Json(fetch_fields(&state.db, false).await?))
}

async fn create_field(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<FieldRequest>,
) -> Result<(StatusCode, Json<FormField>)> {
    authorize(&state.db, &user, Action::Write, &Resource::FormSchema).await?;

    let (Some(label), Some(field_type)) = (
        body.label.as_deref().map(str::trim).filter(|l| !l.is_empty()),
        body.field_type.as_deref(),
    ) else {
        return Err(AppError::Validation(
            "Label and field type are required.".to_string(),
        ));
    };
    check_field_type(field_type)?;
    let name = checked_name(body.name.as_deref().unwrap_or(label))?;

    // New fields go to the end of the form
    let position = sqlx::query_scalar::<_, i64>("SELECT COALESCE(MAX(position) + 1, 0) FROM form_fields")
        .fetch_one(&state.db.pool)
        .await?;

    let now = db::now();
    let inserted = sqlx::query(
        "INSERT INTO form_fields (label, name, field_type, options, is_required, placeholder, position, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(label)
    .bind(&name)
    .bind(field_type)
    .bind(encode_options(&body.options)?)
    .bind(body.is_required.unwrap_or(false))
    .bind(&body.placeholder)
    .bind(position)
    .bind(body.is_active.unwrap_or(true))
    .bind(&now)
    .bind(&now)
    .execute(&state.db.pool)
    .await;

    let id = match inserted {
        Ok(result) => result.last_insert_rowid(),
        Err(e) if is_unique_violation(&e) => return Err(duplicate_name(&name)),
        Err(e) => return Err(e.into()),
    };

    log_activity(
        &state.db.pool,
        ActivityEntry::by(&user, "FORM_FIELD_CREATED", format!("Added form field '{label}' ({name})"))
            .on("form_field", id),
    )
    .await;

    Ok((StatusCode::CREATED, Json(fetch_field(&state.db, id).await?)))
}

async fn update_field(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<FieldRequest>,
) -> Result<Json<FormField>> {
    authorize(&state.db, &user, Action::Write, &Resource::FormSchema).await?;
    let current = fetch_field(&state.db, id).await?;

    let label = body
        .label
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(&current.label);
    let field_type = body.field_type.as_deref().unwrap_or(&current.field_type);
    check_field_type(field_type)?;
    let name = match body.name.as_deref() {
        Some(raw) => checked_name(raw)?,
        None => current.name.clone(),
    };
    let options = match &body.options {
        Some(_) => encode_options(&body.options)?,
        None => current.options.as_ref().map(Value::to_string),
    };

    let updated = sqlx::query(
        "UPDATE form_fields SET label = ?, name = ?, field_type = ?, options = ?, is_required = ?, placeholder = ?, is_active = ?, updated_at = ? WHERE id = ?",
    )
    .bind(label)
    .bind(&name)
    .bind(field_type)
    .bind(options)
    .bind(body.is_required.unwrap_or(current.is_required))
    .bind(body.placeholder.as_ref().or(current.placeholder.as_ref()))
    .bind(body.is_active.unwrap_or(current.is_active))
    .bind(db::now())
    .bind(id)
    .execute(&state.db.pool)
    .await;

    match updated {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => return Err(duplicate_name(&name)),
        Err(e) => return Err(e.into()),
    }

    log_activity(
        &state.db.pool,
        ActivityEntry::by(&user, "FORM_FIELD_UPDATED", format!("Updated form field '{name}'"))
            .on("form_field", id),
    )
    .await;

    Ok(Json(fetch_field(&state.db, id).await?))
}

async fn delete_field(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    authorize(&state.db, &user, Action::Delete, &Resource::FormSchema).await?;
    let field = fetch_field(&state.db, id).await?;

    sqlx::query("DELETE FROM form_fields WHERE id = ?")
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    log_activity(
        &state.db.pool,
        ActivityEntry::by(&user, "FORM_FIELD_DELETED", format!("Deleted form field '{}'", field.name))
            .on("form_field", id),
    )
    .await;

    Ok(Json(json!({ "message": "Form field deleted successfully." })))
}

// Positions follow the order of the submitted ids. Any unknown id aborts the
// whole reorder.
async fn reorder_fields(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<OrderRequest>,
) -> Result<Json<Value>> {
    authorize(&state.db, &user, Action::Write, &Resource::FormSchema).await?;

    let now = db::now();
    let mut tx = state.db.pool.begin().await?;
    for (position, field_id) in body.order.iter().enumerate() {
        let result = sqlx::query("UPDATE form_fields SET position = ?, updated_at = ? WHERE id = ?")
            .bind(position as i64)
            .bind(&now)
            .bind(field_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Form field #{field_id} not found")));
        }
    }
    tx.commit().await?;

    log_activity(
        &state.db.pool,
        ActivityEntry::by(
            &user,
            "FORM_FIELDS_REORDERED",
            format!("Reordered {} form fields", body.order.len()),
        ),
    )
    .await;

    Ok(Json(json!({ "message": "Field order updated successfully." })))
}
