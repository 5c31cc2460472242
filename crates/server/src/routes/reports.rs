use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    db::{self, Database},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    services::access::{authorize, Action, Resource},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/summary", get(dashboard_summary))
        .route("/profit-loss", get(profit_and_loss))
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_bookings: i64,
    pub total_revenue: Decimal,
    pub total_expenses: Decimal,
    pub net_profit: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotal {
    pub category: String,
    pub total_amount: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitAndLoss {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_revenue: Decimal,
    pub total_expenses: Decimal,
    pub net_profit: Decimal,
    pub expense_breakdown: Vec<CategoryTotal>,
}

// Amounts are stored as decimal text, so sums happen here rather than in SQL
fn sum_amounts(amounts: &[String]) -> Result<Decimal> {
    let mut total = Decimal::ZERO;
    for raw in amounts {
        total += db::parse_stored_amount(raw)?;
    }
    Ok(total)
}

async fn paid_revenue(db: &Database, period: Option<(NaiveDate, NaiveDate)>) -> Result<Decimal> {
    let amounts = match period {
        Some((start, end)) => {
            sqlx::query_scalar::<_, String>(
                "SELECT paid_amount FROM bookings WHERE payment_status = 'paid' AND substr(updated_at, 1, 10) BETWEEN ? AND ?",
            )
            .bind(start.to_string())
            .bind(end.to_string())
            .fetch_all(&db.pool)
            .await?
        }
        None => {
            sqlx::query_scalar::<_, String>(
                "SELECT paid_amount FROM bookings WHERE payment_status = 'paid'",
            )
            .fetch_all(&db.pool)
            .await?
        }
    };
    sum_amounts(&amounts)
}

async fn dashboard_summary(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<DashboardSummary>> {
    authorize(&state.db, &user, Action::Read, &Resource::Report).await?;

    let total_bookings = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM bookings")
        .fetch_one(&state.db.pool)
        .await?;
    let total_revenue = paid_revenue(&state.db, None).await?;
    let expenses = sqlx::query_scalar::<_, String>("SELECT amount FROM expenses")
        .fetch_all(&state.db.pool)
        .await?;
    let total_expenses = sum_amounts(&expenses)?;

    Ok(Json(DashboardSummary {
        total_bookings,
        total_revenue,
        total_expenses,
        net_profit: total_revenue - total_expenses,
    }))
}

// Revenue counts paid bookings last touched inside the period; expenses
// count by their own date. Both bounds are inclusive.
async fn profit_and_loss(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<ProfitAndLoss>> {
    authorize(&state.db, &user, Action::Read, &Resource::Report).await?;

    let (Some(start), Some(end)) = (query.start_date.as_deref(), query.end_date.as_deref()) else {
        return Err(AppError::Validation(
            "Please provide both a start date and an end date.".to_string(),
        ));
    };
    let start_date = db::parse_input_date(start, "startDate")?;
    let end_date = db::parse_input_date(end, "endDate")?;
    if end_date < start_date {
        return Err(AppError::Validation(
            "The end date must not be before the start date.".to_string(),
        ));
    }

    let total_revenue = paid_revenue(&state.db, Some((start_date, end_date))).await?;

    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT category, amount FROM expenses WHERE expense_date BETWEEN ? AND ?",
    )
    .bind(start_date.to_string())
    .bind(end_date.to_string())
    .fetch_all(&state.db.pool)
    .await?;

    let mut by_category: BTreeMap<String, Decimal> = BTreeMap::new();
    for (category, amount) in rows {
        *by_category.entry(category).or_default() += db::parse_stored_amount(&amount)?;
    }
    let total_expenses = by_category.values().copied().sum::<Decimal>();

    Ok(Json(ProfitAndLoss {
        start_date,
        end_date,
        total_revenue,
        total_expenses,
        net_profit: total_revenue - total_expenses,
        expense_breakdown: by_category
            .into_iter()
            .map(|(category, total_amount)| CategoryTotal {
                category,
                total_amount,
            })
            .collect(),
    }))
}
