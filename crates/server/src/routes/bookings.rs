use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::{
    db::{
        self,
        bookings::{fetch_booking, query_bookings},
        models::Booking,
    },
    error::{AppError, Result},
    middleware::auth::{AuthUser, MaybeAuthUser},
    services::{
        access::{allow_public, authorize, Action, PublicOperation, Resource, Role},
        activity::{log_activity, ActivityEntry},
        invoice::render_invoice,
        ledger,
        lifecycle::{plan_transition, Transition},
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_bookings).post(create_booking))
        .route("/mine", get(my_bookings))
        .route("/:id", get(get_booking).delete(delete_booking))
        .route("/:id/status", put(update_status))
        .route("/:id/assign", put(assign_employee))
        .route("/:id/payment", post(record_payment))
        .route("/:id/invoice", get(download_invoice))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub client_email: Option<String>,
    pub selected_package: Option<String>,
    pub booking_date: Option<String>,
    pub time_slot: Option<String>,
    pub payment_amount: Option<Decimal>,
    pub transaction_id_last4: Option<String>,
    pub terms_agreed: Option<bool>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    // `null` removes the current assignee
    pub employee_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub paid_amount: Decimal,
}

fn required<'a>(value: &'a Option<String>, message: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(message.to_string()))
}

async fn create_booking(
    State(state): State<AppState>,
    MaybeAuthUser(actor): MaybeAuthUser,
    Json(body): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    allow_public(actor.as_ref(), PublicOperation::CreateBooking)?;
    let client_name = required(&body.client_name, "Client name is required")?;
    let client_phone = required(&body.client_phone, "Client phone is required")?;
    let package = required(&body.selected_package, "Please select a package")?;
    let booking_date = db::parse_input_date(
        required(&body.booking_date, "Booking date is required")?,
        "bookingDate",
    )?;
    let time_slot = required(&body.time_slot, "Time slot is required")?;
    let payment_amount = body
        .payment_amount
        .ok_or_else(|| AppError::Validation("Payment amount is required".to_string()))?;
    let transaction_ref = required(&body.transaction_id_last4, "Transaction ID is required")?;

    if body.terms_agreed != Some(true) {
        return Err(AppError::Validation(
            "You must agree to the terms and conditions.".to_string(),
        ));
    }
    if transaction_ref.len() != 4 || !transaction_ref.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(
            "Transaction ID should be exactly 4 digits.".to_string(),
        ));
    }
    let client_email = body
        .client_email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());
    if client_email.is_some_and(|e| !e.contains('@')) {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }

    let total = state
        .config
        .packages
        .price_of(package)
        .ok_or_else(|| {
            let known: Vec<&str> = state.config.packages.names().collect();
            AppError::Validation(format!(
                "Invalid package selected. Choose one of: {}",
                known.join(", ")
            ))
        })?;
    let amounts =
        ledger::validate_advance_payment(total, payment_amount, state.config.min_advance_payment)?;

    // Only customer accounts own bookings; staff submitting on someone's behalf do not
    let owner_id = actor
        .as_ref()
        .filter(|a| a.role == Role::Customer)
        .map(|a| a.id);

    let now = db::now();
    let booking_id = sqlx::query(
        r#"
        INSERT INTO bookings (
            user_id, client_name, client_email, client_phone, package_name, booking_date,
            time_slot, message, transaction_ref, status, total_amount, paid_amount,
            due_amount, payment_status, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(owner_id)
    .bind(client_name)
    .bind(client_email)
    .bind(client_phone)
    .bind(package)
    .bind(booking_date.to_string())
    .bind(time_slot)
    .bind(body.message.as_deref().map(str::trim).filter(|m| !m.is_empty()))
    .bind(transaction_ref)
    .bind(amounts.total_amount.to_string())
    .bind(amounts.paid_amount.to_string())
    .bind(amounts.due_amount.to_string())
    .bind(amounts.payment_status.as_str())
    .bind(&now)
    .bind(&now)
    .execute(&state.db.pool)
    .await?
    .last_insert_rowid();

    let details = format!("Booking #{booking_id} created for {client_name} ({package})");
    let entry = match &actor {
        Some(user) => ActivityEntry::by(user, "BOOKING_CREATED", details),
        None => ActivityEntry::anonymous("BOOKING_CREATED", details),
    };
    log_activity(&state.db.pool, entry.on("booking", booking_id)).await;
    tracing::info!(booking_id, package, "Booking created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Booking request submitted! We will confirm after payment verification.",
            "bookingId": booking_id,
            "status": "pending",
        })),
    ))
}

async fn list_bookings(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Booking>>> {
    authorize(&state.db, &user, Action::Read, &Resource::BookingCollection).await?;
    let bookings = query_bookings(&state.db.pool, "ORDER BY booking_date DESC, id DESC", &[]).await?;
    Ok(Json(bookings))
}

async fn my_bookings(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<Booking>>> {
    authorize(
        &state.db,
        &user,
        Action::Read,
        &Resource::CustomerBookings { user_id: user.id },
    )
    .await?;
    let bookings = query_bookings(
        &state.db.pool,
        "WHERE user_id = ? ORDER BY booking_date DESC, id DESC",
        &[user.id],
    )
    .await?;
    Ok(Json(bookings))
}

async fn get_booking(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Booking>> {
    let booking = fetch_booking(&state.db.pool, id).await?;
    authorize(&state.db, &user, Action::Read, &Resource::Booking((&booking).into())).await?;
    Ok(Json(booking))
}

// Writes only if the stored status is still the one the transition was planned
// from. Amount columns are untouched, so due amount and payment status stay consistent.
async fn apply_transition(pool: &SqlitePool, id: i64, transition: &Transition) -> Result<()> {
    let applied = sqlx::query("UPDATE bookings SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
        .bind(transition.to.as_str())
        .bind(db::now())
        .bind(id)
        .bind(transition.from.as_str())
        .execute(pool)
        .await?;

    if applied.rows_affected() == 0 {
        return Err(AppError::InvalidStatus(format!(
            "{} (booking is no longer {})",
            transition.to, transition.from
        )));
    }
    Ok(())
}

async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<Value>> {
    let booking = fetch_booking(&state.db.pool, id).await?;
    authorize(&state.db, &user, Action::Write, &Resource::Booking((&booking).into())).await?;

    let requested = body
        .status
        .ok_or_else(|| AppError::Validation("Status is required".to_string()))?;
    let transition = plan_transition(booking.status, &requested, booking.is_feedback_survey_sent)?;

    if transition.unchanged {
        return Ok(Json(json!({
            "message": "Booking status is unchanged.",
            "booking": booking,
        })));
    }

    apply_transition(&state.db.pool, id, &transition).await?;

    log_activity(
        &state.db.pool,
        ActivityEntry::by(
            &user,
            "BOOKING_STATUS_UPDATED",
            format!("Booking #{id} status changed from {} to {}", transition.from, transition.to),
        )
        .on("booking", id),
    )
    .await;
    if transition.survey_eligible {
        tracing::info!(booking_id = id, "Booking completed; feedback survey will follow");
    }

    let booking = fetch_booking(&state.db.pool, id).await?;
    Ok(Json(json!({
        "message": "Booking status updated successfully!",
        "booking": booking,
    })))
}

async fn assign_employee(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<AssignRequest>,
) -> Result<Json<Booking>> {
    let booking = fetch_booking(&state.db.pool, id).await?;
    authorize(&state.db, &user, Action::Write, &Resource::Booking((&booking).into())).await?;

    if let Some(employee_id) = body.employee_id {
        let active = sqlx::query_scalar::<_, bool>(
            "SELECT e.is_active FROM employees e JOIN users u ON u.id = e.user_id WHERE u.id = ? AND u.role = 'employee'",
        )
        .bind(employee_id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Employee not found".to_string()))?;

        if !active {
            return Err(AppError::Validation(
                "Cannot assign an inactive employee".to_string(),
            ));
        }
    }

    sqlx::query("UPDATE bookings SET assigned_employee_id = ?, updated_at = ? WHERE id = ?")
        .bind(body.employee_id)
        .bind(db::now())
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    let details = match body.employee_id {
        Some(employee_id) => format!("Booking #{id} assigned to employee #{employee_id}"),
        None => format!("Booking #{id} unassigned"),
    };
    log_activity(
        &state.db.pool,
        ActivityEntry::by(&user, "BOOKING_ASSIGNED", details).on("booking", id),
    )
    .await;

    Ok(Json(fetch_booking(&state.db.pool, id).await?))
}

// Administrative correction of the paid amount. The public minimum and the
// package total are not enforced here.
async fn record_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<PaymentRequest>,
) -> Result<Json<Booking>> {
    let booking = fetch_booking(&state.db.pool, id).await?;
    authorize(&state.db, &user, Action::Write, &Resource::Booking((&booking).into())).await?;

    let amounts = ledger::compute(booking.total_amount, body.paid_amount)?;

    sqlx::query(
        "UPDATE bookings SET paid_amount = ?, due_amount = ?, payment_status = ?, updated_at = ? WHERE id = ?",
    )
    .bind(amounts.paid_amount.to_string())
    .bind(amounts.due_amount.to_string())
    .bind(amounts.payment_status.as_str())
    .bind(db::now())
    .bind(id)
    .execute(&state.db.pool)
    .await?;

    log_activity(
        &state.db.pool,
        ActivityEntry::by(
            &user,
            "PAYMENT_RECORDED",
            format!(
                "Booking #{id} paid amount set from {} to {}",
                booking.paid_amount, amounts.paid_amount
            ),
        )
        .on("booking", id),
    )
    .await;

    Ok(Json(fetch_booking(&state.db.pool, id).await?))
}

async fn delete_booking(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let booking = fetch_booking(&state.db.pool, id).await?;
    authorize(&state.db, &user, Action::Delete, &Resource::Booking((&booking).into())).await?;

    let stored_urls = sqlx::query_scalar::<_, String>(
        "SELECT file_url FROM project_files WHERE booking_id = ? UNION ALL SELECT final_file_url FROM deliveries WHERE booking_id = ?",
    )
    .bind(id)
    .bind(id)
    .fetch_all(&state.db.pool)
    .await?;

    // Messages, files, survey response and delivery cascade with the row
    sqlx::query("DELETE FROM bookings WHERE id = ?")
        .bind(id)
        .execute(&state.db.pool)
        .await?;

    for url in stored_urls {
        if let Err(e) = state.blobs.delete(&url).await {
            tracing::warn!(booking_id = id, error = %e, "Failed to remove stored file");
        }
    }

    log_activity(
        &state.db.pool,
        ActivityEntry::by(
            &user,
            "BOOKING_DELETED",
            format!("Booking #{id} for {} deleted", booking.client_name),
        )
        .on("booking", id),
    )
    .await;

    Ok(Json(json!({ "message": "Booking removed" })))
}

async fn download_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response> {
    let booking = fetch_booking(&state.db.pool, id).await?;
    authorize(&state.db, &user, Action::Read, &Resource::Invoice((&booking).into())).await?;

    let pdf = render_invoice(&booking, &state.config.mail.sender_name, Utc::now().date_naive());
    tracing::debug!(booking_id = id, bytes = pdf.len(), "Invoice rendered");

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"invoice-{id}.pdf\""),
            ),
        ],
        pdf,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::{ledger::PaymentStatus, lifecycle::BookingStatus, access::UNAUTHORIZED_ACCESS_ATTEMPT},
        testing,
    };

    fn booking_request(package: &str, payment: i64) -> CreateBookingRequest {
        serde_json::from_value(json!({
            "clientName": "Arif",
            "clientPhone": "01711111111",
            "clientEmail": "arif@example.com",
            "selectedPackage": package,
            "bookingDate": "2026-08-14",
            "timeSlot": "10:00-12:00",
            "paymentAmount": payment,
            "transactionIdLast4": "4821",
            "termsAgreed": true
        }))
        .unwrap()
    }

    async fn create(ctx: &testing::TestContext, actor: Option<AuthUser>, req: CreateBookingRequest) -> Result<i64> {
        let (status, Json(body)) =
            create_booking(State(ctx.state.clone()), MaybeAuthUser(actor), Json(req)).await?;
        assert_eq!(status, StatusCode::CREATED);
        Ok(body["bookingId"].as_i64().unwrap())
    }

    #[tokio::test]
    async fn public_booking_derives_amounts() {
        let ctx = testing::context().await;
        let (_, Json(body)) = create_booking(
            State(ctx.state.clone()),
            MaybeAuthUser(None),
            Json(booking_request("Standard", 3000)),
        )
        .await
        .unwrap();

        assert_eq!(body["status"], "pending");
        assert!(body.get("totalAmount").is_none());
        assert!(body.get("dueAmount").is_none());

        let booking = fetch_booking(&ctx.state.db.pool, body["bookingId"].as_i64().unwrap())
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.total_amount, Decimal::from(6000));
        assert_eq!(booking.paid_amount, Decimal::from(3000));
        assert_eq!(booking.due_amount, Decimal::from(3000));
        assert_eq!(booking.payment_status, PaymentStatus::PartiallyPaid);
        assert_eq!(booking.user_id, None);
        assert_eq!(booking.booking_date.to_string(), "2026-08-14");
    }

    #[tokio::test]
    async fn public_booking_rejects_bad_input() {
        let ctx = testing::context().await;

        let mut req = booking_request("Standard", 3000);
        req.transaction_id_last4 = Some("48a1".to_string());
        assert!(matches!(create(&ctx, None, req).await, Err(AppError::Validation(_))));

        let req = booking_request("Platinum", 3000);
        assert!(matches!(create(&ctx, None, req).await, Err(AppError::Validation(_))));

        let mut req = booking_request("Standard", 3000);
        req.terms_agreed = Some(false);
        assert!(matches!(create(&ctx, None, req).await, Err(AppError::Validation(_))));

        let mut req = booking_request("Standard", 3000);
        req.client_name = Some("  ".to_string());
        assert!(matches!(create(&ctx, None, req).await, Err(AppError::Validation(_))));

        let req = booking_request("Basic", 999);
        assert!(matches!(create(&ctx, None, req).await, Err(AppError::InvalidAmount(_))));

        let req = booking_request("Basic", 3001);
        assert!(matches!(create(&ctx, None, req).await, Err(AppError::InvalidAmount(_))));

        assert_eq!(testing::count(&ctx.state.db, "bookings").await, 0);
    }

    #[tokio::test]
    async fn signed_in_customer_owns_the_booking() {
        let ctx = testing::context().await;
        let customer = testing::seed_user(&ctx.state.db, "lina", Role::Customer).await;
        let id = create(&ctx, Some(customer.clone()), booking_request("Premium", 10000))
            .await
            .unwrap();

        let booking = fetch_booking(&ctx.state.db.pool, id).await.unwrap();
        assert_eq!(booking.user_id, Some(customer.id));
        assert_eq!(booking.payment_status, PaymentStatus::Paid);

        let Json(mine) = my_bookings(State(ctx.state.clone()), customer).await.unwrap();
        assert_eq!(mine.len(), 1);
    }

    #[tokio::test]
    async fn unknown_status_leaves_booking_untouched() {
        let ctx = testing::context().await;
        let admin = testing::seed_user(&ctx.state.db, "admin", Role::Admin).await;
        let before = testing::seed_booking(&ctx.state.db, None, None).await;

        let err = update_status(
            State(ctx.state.clone()),
            admin,
            Path(before.id),
            Json(StatusRequest {
                status: Some("archived".to_string()),
            }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::InvalidStatus(_)));
        let after = fetch_booking(&ctx.state.db.pool, before.id).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn status_update_keeps_amounts_and_blocks_leaving_completed() {
        let ctx = testing::context().await;
        let manager = testing::seed_user(&ctx.state.db, "mgr", Role::Manager).await;
        let booking = testing::seed_booking(&ctx.state.db, None, None).await;

        for status in ["confirmed", "in_progress", "ready_for_review", "completed"] {
            update_status(
                State(ctx.state.clone()),
                manager.clone(),
                Path(booking.id),
                Json(StatusRequest {
                    status: Some(status.to_string()),
                }),
            )
            .await
            .unwrap();
        }

        let completed = fetch_booking(&ctx.state.db.pool, booking.id).await.unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);
        assert_eq!(completed.due_amount, booking.due_amount);
        assert_eq!(completed.payment_status, booking.payment_status);

        let err = update_status(
            State(ctx.state.clone()),
            manager,
            Path(booking.id),
            Json(StatusRequest {
                status: Some("in_progress".to_string()),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidStatus(_)));
    }

    #[tokio::test]
    async fn customer_cannot_read_foreign_booking() {
        let ctx = testing::context().await;
        let owner = testing::seed_user(&ctx.state.db, "owner", Role::Customer).await;
        let other = testing::seed_user(&ctx.state.db, "other", Role::Customer).await;
        let booking = testing::seed_booking(&ctx.state.db, Some(owner.id), None).await;

        get_booking(State(ctx.state.clone()), owner, Path(booking.id))
            .await
            .unwrap();
        let err = get_booking(State(ctx.state.clone()), other, Path(booking.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let audits = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM activity_logs WHERE action_type = ?",
        )
        .bind(UNAUTHORIZED_ACCESS_ATTEMPT)
        .fetch_one(&ctx.state.db.pool)
        .await
        .unwrap();
        assert_eq!(audits, 1);
    }

    #[tokio::test]
    async fn missing_booking_is_not_found() {
        let ctx = testing::context().await;
        let admin = testing::seed_user(&ctx.state.db, "admin", Role::Admin).await;
        let err = get_booking(State(ctx.state.clone()), admin, Path(404))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn payment_edit_recomputes_ledger() {
        let ctx = testing::context().await;
        let manager = testing::seed_user(&ctx.state.db, "mgr", Role::Manager).await;
        let booking = testing::seed_booking(&ctx.state.db, None, None).await;

        let Json(paid) = record_payment(
            State(ctx.state.clone()),
            manager.clone(),
            Path(booking.id),
            Json(PaymentRequest {
                paid_amount: Decimal::from(6000),
            }),
        )
        .await
        .unwrap();
        assert_eq!(paid.due_amount, Decimal::ZERO);
        assert_eq!(paid.payment_status, PaymentStatus::Paid);

        let err = record_payment(
            State(ctx.state.clone()),
            manager,
            Path(booking.id),
            Json(PaymentRequest {
                paid_amount: Decimal::from(-1),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn only_admin_deletes_and_dependents_cascade() {
        let ctx = testing::context().await;
        let admin = testing::seed_user(&ctx.state.db, "admin", Role::Admin).await;
        let manager = testing::seed_user(&ctx.state.db, "mgr", Role::Manager).await;
        let booking = testing::seed_booking(&ctx.state.db, None, None).await;
        sqlx::query("INSERT INTO project_messages (booking_id, sender_id, message, created_at) VALUES (?, ?, 'hi', ?)")
            .bind(booking.id)
            .bind(admin.id)
            .bind(db::now())
            .execute(&ctx.state.db.pool)
            .await
            .unwrap();

        let err = delete_booking(State(ctx.state.clone()), manager, Path(booking.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        delete_booking(State(ctx.state.clone()), admin, Path(booking.id))
            .await
            .unwrap();
        assert_eq!(testing::count(&ctx.state.db, "bookings").await, 0);
        assert_eq!(testing::count(&ctx.state.db, "project_messages").await, 0);
    }

    #[tokio::test]
    async fn assignment_requires_active_employee() {
        let ctx = testing::context().await;
        let manager = testing::seed_user(&ctx.state.db, "mgr", Role::Manager).await;
        let engineer = testing::seed_employee(&ctx.state.db, "tanim").await;
        let customer = testing::seed_user(&ctx.state.db, "cust", Role::Customer).await;
        let booking = testing::seed_booking(&ctx.state.db, None, None).await;

        let Json(assigned) = assign_employee(
            State(ctx.state.clone()),
            manager.clone(),
            Path(booking.id),
            Json(AssignRequest {
                employee_id: Some(engineer.id),
            }),
        )
        .await
        .unwrap();
        assert_eq!(assigned.assigned_employee_id, Some(engineer.id));

        let err = assign_employee(
            State(ctx.state.clone()),
            manager,
            Path(booking.id),
            Json(AssignRequest {
                employee_id: Some(customer.id),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn invoice_is_a_pdf_for_the_owner_only() {
        let ctx = testing::context().await;
        let owner = testing::seed_user(&ctx.state.db, "owner", Role::Customer).await;
        let other = testing::seed_user(&ctx.state.db, "other", Role::Customer).await;
        let booking = testing::seed_booking(&ctx.state.db, Some(owner.id), None).await;

        let response = download_invoice(State(ctx.state.clone()), owner, Path(booking.id))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/pdf"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        let err = download_invoice(State(ctx.state.clone()), other, Path(booking.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn status_write_refuses_a_booking_that_moved_meanwhile() {
        let ctx = testing::context().await;
        let booking = testing::seed_booking(&ctx.state.db, None, None).await;
        testing::set_status(&ctx.state.db, booking.id, BookingStatus::InProgress).await;

        let stale = plan_transition(BookingStatus::InProgress, "confirmed", false).unwrap();
        // A delivery completes the booking after the plan was made
        testing::set_status(&ctx.state.db, booking.id, BookingStatus::Completed).await;

        let err = apply_transition(&ctx.state.db.pool, booking.id, &stale)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStatus(_)));

        let stored = fetch_booking(&ctx.state.db.pool, booking.id).await.unwrap();
        assert_eq!(stored.status, BookingStatus::Completed);
    }
}
