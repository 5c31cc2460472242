use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    db::{
        self,
        bookings::query_bookings,
        models::{Booking, Employee, EmployeeRow},
        Database,
    },
    error::{is_unique_violation, AppError, Result},
    middleware::auth::AuthUser,
    routes::auth::{check_password, hash_password, normalize_email},
    services::{
        access::{authorize, Action, Resource},
        activity::{log_activity, ActivityEntry},
    },
    AppState,
};

const SHIFT_TYPES: [&str; 5] = ["morning", "evening", "night", "flexible", "off"];

const EMPLOYEE_SELECT: &str = "SELECT e.id, e.user_id, u.username, u.email, u.full_name, \
     u.phone_number, e.position, e.salary, e.hire_date, e.is_active, e.shift_type, \
     e.hours_per_week, e.available_leave_days, e.created_at, e.updated_at \
     FROM employees e JOIN users u ON u.id = e.user_id";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_employees).post(add_employee))
        .route(
            "/:id",
            get(get_employee).put(update_employee).delete(delete_employee),
        )
        .route("/:id/bookings", get(employee_bookings))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEmployeeRequest {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub full_name: String,
    pub phone_number: Option<String>,
    pub position: String,
    pub salary: Decimal,
    pub hire_date: String,
    pub shift_type: Option<String>,
    pub hours_per_week: Option<i64>,
    pub available_leave_days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEmployeeRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub password: Option<String>,
    pub position: Option<String>,
    pub salary: Option<Decimal>,
    pub is_active: Option<bool>,
    pub shift_type: Option<String>,
    pub hours_per_week: Option<i64>,
    pub available_leave_days: Option<i64>,
}

fn check_shift(shift: &str) -> Result<()> {
    if SHIFT_TYPES.contains(&shift) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Shift type must be one of: {}",
            SHIFT_TYPES.join(", ")
        )))
    }
}

fn check_salary(salary: Decimal) -> Result<()> {
    if salary.is_sign_negative() {
        return Err(AppError::InvalidAmount("Salary must not be negative".to_string()));
    }
    Ok(())
}

fn duplicate_account() -> AppError {
    AppError::Conflict("Username or email already exists".to_string())
}

async fn fetch_employee(db: &Database, id: i64) -> Result<Employee> {
    sqlx::query_as::<_, EmployeeRow>(&format!("{EMPLOYEE_SELECT} WHERE e.id = ?"))
        .bind(id)
        .fetch_optional(&db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Employee not found".to_string()))?
        .try_into()
}

fn resource(employee: &Employee) -> Resource {
    Resource::Employee {
        employee_id: employee.id,
        user_id: employee.user_id,
    }
}

// The account and the staff profile are created together or not at all.
async fn add_employee(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<AddEmployeeRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    authorize(&state.db, &user, Action::Write, &Resource::EmployeeCollection).await?;

    let username = body.username.trim();
    let full_name = body.full_name.trim();
    let position = body.position.trim();
    if username.is_empty() || full_name.is_empty() || position.is_empty() {
        return Err(AppError::Validation(
            "Please fill all required fields for employee.".to_string(),
        ));
    }
    check_password(&body.password)?;
    check_salary(body.salary)?;
    let email = normalize_email(body.email.as_deref())?;
    let hire_date = db::parse_input_date(&body.hire_date, "hireDate")?;
    let shift_type = body.shift_type.as_deref().unwrap_or("flexible");
    check_shift(shift_type)?;

    let password_hash = hash_password(&body.password)?;
    let now = db::now();
    let mut tx = state.db.pool.begin().await?;

    let user_id = match sqlx::query(
        "INSERT INTO users (username, password_hash, email, role, full_name, phone_number, created_at, updated_at) VALUES (?, ?, ?, 'employee', ?, ?, ?, ?)",
    )
    .bind(username)
    .bind(&password_hash)
    .bind(&email)
    .bind(full_name)
    .bind(&body.phone_number)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await
    {
        Ok(result) => result.last_insert_rowid(),
        Err(e) if is_unique_violation(&e) => return Err(duplicate_account()),
        Err(e) => return Err(e.into()),
    };

    let employee_id = sqlx::query(
        "INSERT INTO employees (user_id, position, salary, hire_date, shift_type, hours_per_week, available_leave_days, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(position)
    .bind(body.salary.to_string())
    .bind(hire_date.to_string())
    .bind(shift_type)
    .bind(body.hours_per_week)
    .bind(body.available_leave_days.unwrap_or(10))
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    tx.commit().await?;

    let employee = fetch_employee(&state.db, employee_id).await?;
    log_activity(
        &state.db.pool,
        ActivityEntry::by(
            &user,
            "EMPLOYEE_CREATED",
            format!(
                "New employee '{full_name}' (ID: {employee_id}) added by {}",
                user.username
            ),
        )
        .on("employee", employee_id),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Employee added successfully!", "employee": employee })),
    ))
}

async fn list_employees(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Employee>>> {
    authorize(&state.db, &user, Action::Read, &Resource::EmployeeCollection).await?;

    let employees = sqlx::query_as::<_, EmployeeRow>(&format!(
        "{EMPLOYEE_SELECT} ORDER BY COALESCE(u.full_name, u.username) ASC"
    ))
    .fetch_all(&state.db.pool)
    .await?
    .into_iter()
    .map(Employee::try_from)
    .collect::<Result<Vec<_>>>()?;

    Ok(Json(employees))
}

async fn get_employee(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Employee>> {
    let employee = fetch_employee(&state.db, id).await?;
    authorize(&state.db, &user, Action::Read, &resource(&employee)).await?;
    Ok(Json(employee))
}

fn note_change<T: std::fmt::Display + PartialEq>(
    changes: &mut Vec<String>,
    label: &str,
    current: &mut T,
    requested: Option<T>,
) {
    if let Some(value) = requested {
        if *current != value {
            changes.push(format!("{label} from '{current}' to '{value}'"));
            *current = value;
        }
    }
}

async fn update_employee(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateEmployeeRequest>,
) -> Result<Json<Value>> {
    let mut employee = fetch_employee(&state.db, id).await?;
    authorize(&state.db, &user, Action::Write, &resource(&employee)).await?;

    if let Some(shift) = &body.shift_type {
        check_shift(shift)?;
    }
    if let Some(salary) = body.salary {
        check_salary(salary)?;
    }
    let email = match body.email.as_deref() {
        Some(raw) => normalize_email(Some(raw))?,
        None => None,
    };
    let password_hash = match body.password.as_deref() {
        Some(password) => {
            check_password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    let mut changes = Vec::new();
    let username = body.username.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
    note_change(&mut changes, "username", &mut employee.username, username);
    let mut current_email = employee.email.clone().unwrap_or_default();
    note_change(&mut changes, "email", &mut current_email, email);
    let mut full_name = employee.full_name.clone().unwrap_or_default();
    note_change(&mut changes, "full name", &mut full_name, body.full_name);
    let mut phone = employee.phone_number.clone().unwrap_or_default();
    note_change(&mut changes, "phone number", &mut phone, body.phone_number);
    if password_hash.is_some() {
        changes.push("password changed".to_string());
    }
    note_change(&mut changes, "position", &mut employee.position, body.position);
    note_change(&mut changes, "salary", &mut employee.salary, body.salary);
    note_change(&mut changes, "active status", &mut employee.is_active, body.is_active);
    note_change(&mut changes, "shift type", &mut employee.shift_type, body.shift_type);
    note_change(&mut changes, "available leave days", &mut employee.available_leave_days, body.available_leave_days);
    if let Some(hours) = body.hours_per_week {
        if employee.hours_per_week != Some(hours) {
            changes.push(format!("hours per week to '{hours}'"));
            employee.hours_per_week = Some(hours);
        }
    }

    if changes.is_empty() {
        return Ok(Json(json!({ "message": "No changes to apply.", "employee": employee })));
    }

    let blank_to_null = |v: String| (!v.is_empty()).then_some(v);
    let now = db::now();
    let mut tx = state.db.pool.begin().await?;

    let account = sqlx::query(
        "UPDATE users SET username = ?, email = ?, full_name = ?, phone_number = ?, password_hash = COALESCE(?, password_hash), updated_at = ? WHERE id = ?",
    )
    .bind(&employee.username)
    .bind(blank_to_null(current_email))
    .bind(blank_to_null(full_name))
    .bind(blank_to_null(phone))
    .bind(password_hash)
    .bind(&now)
    .bind(employee.user_id)
    .execute(&mut *tx)
    .await;
    match account {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => return Err(duplicate_account()),
        Err(e) => return Err(e.into()),
    }

    sqlx::query(
        "UPDATE employees SET position = ?, salary = ?, is_active = ?, shift_type = ?, hours_per_week = ?, available_leave_days = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&employee.position)
    .bind(employee.salary.to_string())
    .bind(employee.is_active)
    .bind(&employee.shift_type)
    .bind(employee.hours_per_week)
    .bind(employee.available_leave_days)
    .bind(&now)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let employee = fetch_employee(&state.db, id).await?;
    log_activity(
        &state.db.pool,
        ActivityEntry::by(
            &user,
            "EMPLOYEE_UPDATED",
            format!(
                "Updated employee '{}' (ID: {id}). Changes: {}",
                employee.full_name.as_deref().unwrap_or(&employee.username),
                changes.join(", ")
            ),
        )
        .on("employee", id),
    )
    .await;

    Ok(Json(json!({ "message": "Employee updated successfully!", "employee": employee })))
}

async fn delete_employee(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let employee = fetch_employee(&state.db, id).await?;
    authorize(&state.db, &user, Action::Delete, &resource(&employee)).await?;

    // The staff profile cascades with the account; assigned bookings are released
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(employee.user_id)
        .execute(&state.db.pool)
        .await?;

    log_activity(
        &state.db.pool,
        ActivityEntry::by(
            &user,
            "EMPLOYEE_DELETED",
            format!(
                "Deleted employee '{}' (ID: {id}) by {}",
                employee.full_name.as_deref().unwrap_or(&employee.username),
                user.username
            ),
        )
        .on("employee", id),
    )
    .await;

    Ok(Json(json!({ "message": "Employee deleted successfully!" })))
}

async fn employee_bookings(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Booking>>> {
    let employee = fetch_employee(&state.db, id).await?;
    authorize(
        &state.db,
        &user,
        Action::Read,
        &Resource::EmployeeBookings {
            user_id: employee.user_id,
        },
    )
    .await?;

    let bookings = query_bookings(
        &state.db.pool,
        "WHERE assigned_employee_id = ? ORDER BY booking_date DESC, id DESC",
        &[employee.user_id],
    )
    .await?;
    Ok(Json(bookings))
}
