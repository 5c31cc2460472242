use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

use crate::{
    db::{self, models::ActivityLog},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    services::access::{authorize, Action, Resource},
    AppState,
};

const DEFAULT_PAGE_SIZE: i64 = 15;
const MAX_PAGE_SIZE: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_logs))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub user_id: Option<i64>,
    pub action_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub total_items: i64,
    pub total_pages: i64,
    pub current_page: i64,
    pub logs: Vec<ActivityLog>,
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Sqlite>, query: &'a LogQuery) -> Result<()> {
    builder.push(" WHERE 1 = 1");
    if let Some(user_id) = query.user_id {
        builder.push(" AND l.user_id = ").push_bind(user_id);
    }
    if let Some(action) = query.action_type.as_deref().filter(|a| !a.is_empty()) {
        builder.push(" AND l.action_type = ").push_bind(action);
    }
    // Whole days, inclusive, only when both ends are given
    if let (Some(start), Some(end)) = (query.start_date.as_deref(), query.end_date.as_deref()) {
        let start = db::parse_input_date(start, "startDate")?;
        let end = db::parse_input_date(end, "endDate")?;
        builder
            .push(" AND substr(l.created_at, 1, 10) BETWEEN ")
            .push_bind(start.to_string())
            .push(" AND ")
            .push_bind(end.to_string());
    }
    Ok(())
}

async fn list_logs(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<LogQuery>,
) -> Result<Json<LogPage>> {
    authorize(&state.db, &user, Action::Read, &Resource::ActivityLog).await?;

    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if page < 1 || !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(AppError::Validation(format!(
            "page must be at least 1 and limit between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM activity_logs l");
    push_filters(&mut count, &query)?;
    let total_items: i64 = count.build_query_scalar().fetch_one(&state.db.pool).await?;

    let mut select = QueryBuilder::<Sqlite>::new(
        "SELECT l.id, l.user_id, u.username, l.action_type, l.details, l.target_id, l.target_type, l.ip_address, l.created_at \
         FROM activity_logs l LEFT JOIN users u ON u.id = l.user_id",
    );
    push_filters(&mut select, &query)?;
    select
        .push(" ORDER BY l.created_at DESC, l.id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind((page - 1) * limit);
    let logs = select
        .build_query_as::<ActivityLog>()
        .fetch_all(&state.db.pool)
        .await?;

    Ok(Json(LogPage {
        total_items,
        total_pages: (total_items + limit - 1) / limit,
        current_page: page,
        logs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::{
            access::Role,
            activity::{log_activity, ActivityEntry},
        },
        testing,
    };

    async fn seed_logs(state: &AppState, user: &AuthUser) {
        for i in 0..5 {
            log_activity(
                &state.db.pool,
                ActivityEntry::by(user, "BOOKING_CREATED", format!("Booking #{i} created")),
            )
            .await;
        }
        log_activity(
            &state.db.pool,
            ActivityEntry::anonymous("LOGIN_FAILED", "Failed login attempt".to_string()),
        )
        .await;
    }

    #[tokio::test]
    async fn pages_and_filters() {
        let ctx = testing::context().await;
        let admin = testing::seed_user(&ctx.state.db, "admin", Role::Admin).await;
        seed_logs(&ctx.state, &admin).await;

        let Json(page) = list_logs(
            State(ctx.state.clone()),
            admin.clone(),
            Query(LogQuery {
                page: Some(2),
                limit: Some(4),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(page.total_items, 6);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.logs.len(), 2);

        let Json(filtered) = list_logs(
            State(ctx.state.clone()),
            admin.clone(),
            Query(LogQuery {
                user_id: Some(admin.id),
                action_type: Some("BOOKING_CREATED".to_string()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(filtered.total_items, 5);
        assert!(filtered
            .logs
            .iter()
            .all(|l| l.username.as_deref() == Some("admin")));
    }

    #[tokio::test]
    async fn date_range_is_inclusive_of_whole_days() {
        let ctx = testing::context().await;
        let admin = testing::seed_user(&ctx.state.db, "admin", Role::Admin).await;
        for at in ["2026-09-01T00:00:00.000Z", "2026-09-02T23:59:59.999Z", "2026-09-03T00:00:00.000Z"] {
            sqlx::query(
                "INSERT INTO activity_logs (action_type, details, created_at) VALUES ('USER_LOGIN', 'x', ?)",
            )
            .bind(at)
            .execute(&ctx.state.db.pool)
            .await
            .unwrap();
        }

        let Json(page) = list_logs(
            State(ctx.state.clone()),
            admin,
            Query(LogQuery {
                start_date: Some("2026-09-01".to_string()),
                end_date: Some("2026-09-02".to_string()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(page.total_items, 2);
    }

    #[tokio::test]
    async fn only_admins_read_the_log() {
        let ctx = testing::context().await;
        let manager = testing::seed_user(&ctx.state.db, "mgr", Role::Manager).await;
        let err = list_logs(State(ctx.state.clone()), manager, Query(LogQuery::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
