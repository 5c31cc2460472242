use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    db::{self, bookings::find_booking, models::{Booking, Delivery}, Database},
    error::{is_unique_violation, AppError, Result},
    middleware::auth::AuthUser,
    routes::upload::UploadForm,
    services::{
        access::{authorize, Action, Resource, Role},
        activity::{log_activity, ActivityEntry},
        lifecycle::{plan_transition, BookingStatus},
        storage::Upload,
    },
    AppState,
};

const DELIVERY_COLUMNS: &str =
    "d.id, d.booking_id, d.final_file_url, d.delivery_date, d.status, d.customer_accessed_at, d.notes, d.created_at";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_deliveries).post(create_delivery))
        .route("/booking/:id", get(delivery_for_booking))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryListItem {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub delivery: Delivery,
    pub client_name: String,
    pub package_name: String,
}

fn already_delivered() -> AppError {
    AppError::Conflict("A delivery record for this booking already exists.".to_string())
}

async fn fetch_delivery(db: &Database, booking_id: i64) -> Result<Option<Delivery>> {
    Ok(sqlx::query_as::<_, Delivery>(&format!(
        "SELECT {DELIVERY_COLUMNS} FROM deliveries d WHERE d.booking_id = ?"
    ))
    .bind(booking_id)
    .fetch_optional(&db.pool)
    .await?)
}

async fn delivery_booking(db: &Database, booking_id: i64) -> Result<Booking> {
    find_booking(&db.pool, booking_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))
}

async fn create_delivery(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Value>)> {
    let mut form = UploadForm::read(multipart).await?;
    let booking_id = form
        .text("bookingId")
        .and_then(|raw| raw.parse::<i64>().ok())
        .ok_or_else(|| AppError::Validation("A valid bookingId is required.".to_string()))?;
    let notes = form.text("notes").map(str::to_string);
    let upload = form.take_file("finalFile")?;

    let delivery = deliver(&state, &user, booking_id, upload, notes).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "File delivered successfully!", "delivery": delivery })),
    ))
}

// Delivery row and status change commit together; cancelled bookings are refused
pub async fn deliver(
    state: &AppState,
    user: &AuthUser,
    booking_id: i64,
    upload: Upload,
    notes: Option<String>,
) -> Result<Delivery> {
    let booking = delivery_booking(&state.db, booking_id).await?;
    authorize(&state.db, user, Action::Write, &Resource::Delivery((&booking).into())).await?;

    if fetch_delivery(&state.db, booking_id).await?.is_some() {
        return Err(already_delivered());
    }
    let transition = plan_transition(
        booking.status,
        BookingStatus::Completed.as_str(),
        booking.is_feedback_survey_sent,
    )?;
    upload.check_allowed()?;

    let blob = state.blobs.put(&upload).await?;
    let recorded = record_delivery(&state.db, booking_id, &blob.url, notes.as_deref(), transition.unchanged).await;
    let delivery_id = match recorded {
        Ok(id) => id,
        Err(e) => {
            if let Err(cleanup) = state.blobs.delete(&blob.url).await {
                tracing::warn!(error = %cleanup, url = %blob.url, "Failed to remove orphaned delivery file");
            }
            return Err(e);
        }
    };

    tracing::info!(booking_id, delivery_id, "Final files delivered");
    log_activity(
        &state.db.pool,
        ActivityEntry::by(
            user,
            "DELIVERY_CREATED",
            format!("File delivered for booking #{booking_id} by {}", user.username),
        )
        .on("booking", booking_id),
    )
    .await;
    if !transition.unchanged {
        log_activity(
            &state.db.pool,
            ActivityEntry::by(
                user,
                "BOOKING_STATUS_UPDATED",
                format!(
                    "Booking #{booking_id} status changed from {} to {} on delivery",
                    transition.from, transition.to
                ),
            )
            .on("booking", booking_id),
        )
        .await;
    }

    fetch_delivery(&state.db, booking_id)
        .await?
        .ok_or_else(|| AppError::Internal(format!("Delivery for booking #{booking_id} vanished")))
}

async fn record_delivery(
    db: &Database,
    booking_id: i64,
    url: &str,
    notes: Option<&str>,
    already_completed: bool,
) -> Result<i64> {
    let now = db::now();
    let mut tx = db.pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT INTO deliveries (booking_id, final_file_url, delivery_date, status, notes, created_at, updated_at) VALUES (?, ?, ?, 'delivered_access_granted', ?, ?, ?)",
    )
    .bind(booking_id)
    .bind(url)
    .bind(&now)
    .bind(notes)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await;
    let delivery_id = match inserted {
        Ok(result) => result.last_insert_rowid(),
        Err(e) if is_unique_violation(&e) => return Err(already_delivered()),
        Err(e) => return Err(e.into()),
    };

    if !already_completed {
        // Guarded so a concurrent cancel is not overwritten
        let updated = sqlx::query(
            "UPDATE bookings SET status = 'completed', updated_at = ? WHERE id = ? AND status NOT IN ('completed', 'cancelled')",
        )
        .bind(&now)
        .bind(booking_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::InvalidStatus(
                "completed (booking changed during delivery)".to_string(),
            ));
        }
    }

    tx.commit().await?;
    Ok(delivery_id)
}

async fn list_deliveries(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<DeliveryListItem>>> {
    authorize(&state.db, &user, Action::Read, &Resource::DeliveryCollection).await?;

    let deliveries = sqlx::query_as::<_, DeliveryListItem>(&format!(
        "SELECT {DELIVERY_COLUMNS}, b.client_name, b.package_name FROM deliveries d JOIN bookings b ON b.id = d.booking_id ORDER BY d.delivery_date DESC, d.id DESC"
    ))
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(deliveries))
}

// The owning customer's first read stamps `customerAccessedAt`.
async fn delivery_for_booking(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Delivery>> {
    let booking = delivery_booking(&state.db, id).await?;
    authorize(&state.db, &user, Action::Read, &Resource::Delivery((&booking).into())).await?;

    let mut delivery = fetch_delivery(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("No delivery for this booking yet".to_string()))?;

    if user.role == Role::Customer && delivery.customer_accessed_at.is_none() {
        let now = db::now();
        sqlx::query(
            "UPDATE deliveries SET customer_accessed_at = ?, updated_at = ? WHERE id = ? AND customer_accessed_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(delivery.id)
        .execute(&state.db.pool)
        .await?;
        delivery.customer_accessed_at = Some(now);
    }

    Ok(Json(delivery))
}
