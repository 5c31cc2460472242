use std::str::FromStr;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::{
    db::{
        self,
        models::{Expense, ExpenseRow},
        Database,
    },
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::upload::UploadForm,
    services::{
        access::{authorize, Action, Resource},
        activity::{log_activity, ActivityEntry},
        storage::Upload,
    },
    AppState,
};

pub const EXPENSE_CATEGORIES: [&str; 7] = [
    "studio_rent",
    "equipment",
    "marketing",
    "utilities",
    "salaries",
    "travel",
    "miscellaneous",
];

const EXPENSE_SELECT: &str = "SELECT id, description, amount, category, expense_date, receipt_url, recorded_by, created_at FROM expenses";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_expenses).post(create_expense))
        .route("/:id", delete(delete_expense))
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub description: String,
    pub amount: Decimal,
    pub category: String,
    pub expense_date: NaiveDate,
}

impl NewExpense {
    // Reads the text fields of the multipart form. A missing date means today.
    pub fn from_form(form: &UploadForm, today: NaiveDate) -> Result<Self> {
        let (Some(description), Some(amount), Some(category)) = (
            form.text("description"),
            form.text("amount"),
            form.text("category"),
        ) else {
            return Err(AppError::Validation(
                "Description, amount, and category are required.".to_string(),
            ));
        };

        let amount = Decimal::from_str(amount)
            .map_err(|_| AppError::InvalidAmount("Amount must be a number".to_string()))?;
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidAmount(
                "Amount must be greater than zero".to_string(),
            ));
        }
        if !EXPENSE_CATEGORIES.contains(&category) {
            return Err(AppError::Validation(format!(
                "Category must be one of: {}",
                EXPENSE_CATEGORIES.join(", ")
            )));
        }
        let expense_date = match form.text("expenseDate") {
            Some(raw) => db::parse_input_date(raw, "expenseDate")?,
            None => today,
        };

        Ok(Self {
            description: description.to_string(),
            amount,
            category: category.to_string(),
            expense_date,
        })
    }
}

async fn fetch_expense(db: &Database, id: i64) -> Result<Expense> {
    sqlx::query_as::<_, ExpenseRow>(&format!("{EXPENSE_SELECT} WHERE id = ?"))
        .bind(id)
        .fetch_optional(&db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Expense not found.".to_string()))?
        .try_into()
}

async fn create_expense(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Value>)> {
    authorize(&state.db, &user, Action::Write, &Resource::Expense).await?;

    let mut form = UploadForm::read(multipart).await?;
    let expense = NewExpense::from_form(&form, Utc::now().date_naive())?;
    let receipt = form.files.remove("receipt");
    let expense = record_expense(&state, &user, expense, receipt).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Expense created successfully", "expense": expense })),
    ))
}

pub async fn record_expense(
    state: &AppState,
    user: &AuthUser,
    expense: NewExpense,
    receipt: Option<Upload>,
) -> Result<Expense> {
    authorize(&state.db, user, Action::Write, &Resource::Expense).await?;

    let receipt_url = match receipt {
        Some(upload) => {
            upload.check_allowed()?;
            Some(state.blobs.put(&upload).await?.url)
        }
        None => None,
    };

    let now = db::now();
    let inserted = sqlx::query(
        "INSERT INTO expenses (description, amount, category, expense_date, receipt_url, recorded_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&expense.description)
    .bind(expense.amount.to_string())
    .bind(&expense.category)
    .bind(expense.expense_date.to_string())
    .bind(&receipt_url)
    .bind(user.id)
    .bind(&now)
    .bind(&now)
    .execute(&state.db.pool)
    .await;

    let id = match inserted {
        Ok(result) => result.last_insert_rowid(),
        Err(e) => {
            if let Some(url) = &receipt_url {
                if let Err(cleanup) = state.blobs.delete(url).await {
                    tracing::warn!(error = %cleanup, url = %url, "Failed to remove orphaned receipt");
                }
            }
            return Err(e.into());
        }
    };

    log_activity(
        &state.db.pool,
        ActivityEntry::by(
            user,
            "EXPENSE_CREATED",
            format!(
                "Created new expense '{}' for amount {}",
                expense.description, expense.amount
            ),
        )
        .on("expense", id),
    )
    .await;

    fetch_expense(&state.db, id).await
}

async fn list_expenses(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Expense>>> {
    authorize(&state.db, &user, Action::Read, &Resource::Expense).await?;

    let expenses = sqlx::query_as::<_, ExpenseRow>(&format!(
        "{EXPENSE_SELECT} ORDER BY expense_date DESC, id DESC"
    ))
    .fetch_all(&state.db.pool)
    .await?
    .into_iter()
    .map(Expense::try_from)
    .collect::<Result<Vec<_>>>()?;

    Ok(Json(expenses))
}

async fn delete_expense(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    authorize(&state.db, &user, Action::Delete, &Resource::Expense).await?;
    let expense = fetch_expense(&state.db, id).await?;

    sqlx::query("DELETE FROM expenses WHERE id = ?")
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    if let Some(url) = &expense.receipt_url {
        if let Err(e) = state.blobs.delete(url).await {
            tracing::warn!(expense_id = id, error = %e, "Failed to remove receipt");
        }
    }

    log_activity(
        &state.db.pool,
        ActivityEntry::by(
            &user,
            "EXPENSE_DELETED",
            format!("Deleted expense '{}' (ID: {id})", expense.description),
        )
        .on("expense", id),
    )
    .await;

    Ok(Json(json!({ "message": "Expense deleted successfully." })))
}
