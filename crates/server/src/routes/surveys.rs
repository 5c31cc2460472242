use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    db::{self, bookings::find_booking, models::SurveyResponse},
    error::{is_unique_violation, AppError, Result},
    middleware::auth::AuthUser,
    services::{
        access::{allow_public, authorize, Action, PublicOperation, Resource},
        lifecycle::BookingStatus,
        survey::run_sweep,
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_responses).post(submit_response))
        .route("/sweep", post(trigger_sweep))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyRequest {
    pub booking_id: Option<i64>,
    pub rating: Option<i64>,
    pub comments: Option<String>,
    pub would_recommend: Option<bool>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SurveyResponseView {
    pub id: i64,
    pub booking_id: i64,
    pub rating: i64,
    pub comments: Option<String>,
    pub would_recommend: Option<bool>,
    pub created_at: String,
    pub client_name: String,
    pub package_name: String,
}

async fn submit_response(
    State(state): State<AppState>,
    Json(body): Json<SurveyRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    allow_public(None, PublicOperation::SubmitSurvey)?;
    let (Some(booking_id), Some(rating)) = (body.booking_id, body.rating) else {
        return Err(AppError::Validation(
            "Booking ID and a rating are required.".to_string(),
        ));
    };
    if !(1..=5).contains(&rating) {
        return Err(AppError::Validation(
            "Rating must be between 1 and 5.".to_string(),
        ));
    }

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM survey_responses WHERE booking_id = ?",
    )
    .bind(booking_id)
    .fetch_one(&state.db.pool)
    .await?;
    if existing > 0 {
        return Err(AppError::Conflict(
            "A survey for this booking has already been submitted. Thank you!".to_string(),
        ));
    }

    let booking = find_booking(&state.db.pool, booking_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;
    if booking.status != BookingStatus::Completed {
        return Err(AppError::Validation(
            "This booking is not eligible for a survey at this time.".to_string(),
        ));
    }

    let inserted = sqlx::query(
        "INSERT INTO survey_responses (booking_id, rating, comments, would_recommend, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(booking_id)
    .bind(rating)
    .bind(body.comments.as_deref().map(str::trim).filter(|c| !c.is_empty()))
    .bind(body.would_recommend)
    .bind(db::now())
    .execute(&state.db.pool)
    .await;

    let response_id = match inserted {
        Ok(result) => result.last_insert_rowid(),
        // A concurrent submission won the race
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::Conflict(
                "A survey for this booking has already been submitted. Thank you!".to_string(),
            ))
        }
        Err(e) => return Err(e.into()),
    };

    let response = sqlx::query_as::<_, SurveyResponse>(
        "SELECT id, booking_id, rating, comments, would_recommend, created_at FROM survey_responses WHERE id = ?",
    )
    .bind(response_id)
    .fetch_one(&state.db.pool)
    .await?;

    tracing::info!(booking_id, rating, "Survey response received");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Thank you for your valuable feedback!",
            "surveyResponse": response,
        })),
    ))
}

async fn list_responses(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<SurveyResponseView>>> {
    authorize(&state.db, &user, Action::Read, &Resource::SurveyResponses).await?;

    let responses = sqlx::query_as::<_, SurveyResponseView>(
        r#"
        SELECT s.id, s.booking_id, s.rating, s.comments, s.would_recommend, s.created_at,
               b.client_name, b.package_name
        FROM survey_responses s
        JOIN bookings b ON b.id = s.booking_id
        ORDER BY s.created_at DESC, s.id DESC
        "#,
    )
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(responses))
}

async fn trigger_sweep(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>> {
    authorize(&state.db, &user, Action::Write, &Resource::SurveyResponses).await?;

    let report = run_sweep(&state.db, state.mailer.as_ref(), &state.config, Utc::now()).await?;
    Ok(Json(json!({
        "attempted": report.attempted,
        "sent": report.sent,
        "failed": report.failed,
        "skipped": report.skipped,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{services::access::Role, testing};

    fn request(booking_id: i64, rating: i64) -> SurveyRequest {
        SurveyRequest {
            booking_id: Some(booking_id),
            rating: Some(rating),
            comments: Some("Great mix".to_string()),
            would_recommend: Some(true),
        }
    }

    #[tokio::test]
    async fn second_submission_conflicts() {
        let ctx = testing::context().await;
        let booking = testing::seed_booking(&ctx.state.db, None, None).await;
        testing::set_status(&ctx.state.db, booking.id, BookingStatus::Completed).await;

        submit_response(State(ctx.state.clone()), Json(request(booking.id, 5)))
            .await
            .unwrap();
        let err = submit_response(State(ctx.state.clone()), Json(request(booking.id, 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let rating = sqlx::query_scalar::<_, i64>(
            "SELECT rating FROM survey_responses WHERE booking_id = ?",
        )
        .bind(booking.id)
        .fetch_one(&ctx.state.db.pool)
        .await
        .unwrap();
        assert_eq!(rating, 5);
    }

    #[tokio::test]
    async fn only_completed_bookings_take_surveys() {
        let ctx = testing::context().await;
        let booking = testing::seed_booking(&ctx.state.db, None, None).await;

        let err = submit_response(State(ctx.state.clone()), Json(request(booking.id, 4)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = submit_response(State(ctx.state.clone()), Json(request(9999, 4)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn rating_must_be_one_to_five() {
        let ctx = testing::context().await;
        let booking = testing::seed_booking(&ctx.state.db, None, None).await;
        testing::set_status(&ctx.state.db, booking.id, BookingStatus::Completed).await;

        for rating in [0, 6] {
            let err = submit_response(State(ctx.state.clone()), Json(request(booking.id, rating)))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
        assert_eq!(testing::count(&ctx.state.db, "survey_responses").await, 0);
    }

    #[tokio::test]
    async fn staff_list_responses_with_client_names() {
        let ctx = testing::context().await;
        let manager = testing::seed_user(&ctx.state.db, "mgr", Role::Manager).await;
        let employee = testing::seed_employee(&ctx.state.db, "emp").await;
        let booking = testing::seed_booking(&ctx.state.db, None, None).await;
        testing::set_status(&ctx.state.db, booking.id, BookingStatus::Completed).await;
        submit_response(State(ctx.state.clone()), Json(request(booking.id, 4)))
            .await
            .unwrap();

        let Json(responses) = list_responses(State(ctx.state.clone()), manager).await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].client_name, "Test Client");

        let err = list_responses(State(ctx.state.clone()), employee).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
