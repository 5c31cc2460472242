// Shared booking lookups used across routers and the survey sweep

use sqlx::SqlitePool;

use super::models::{Booking, BookingRow};
use crate::error::{AppError, Result};

pub const BOOKING_COLUMNS: &str = "id, user_id, client_name, client_email, client_phone, \
     package_name, booking_date, time_slot, message, transaction_ref, status, \
     assigned_employee_id, total_amount, paid_amount, due_amount, payment_status, \
     is_feedback_survey_sent, created_at, updated_at";

pub async fn find_booking(pool: &SqlitePool, id: i64) -> Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?");
    sqlx::query_as::<_, BookingRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Booking::try_from)
        .transpose()
}

pub async fn fetch_booking(pool: &SqlitePool, id: i64) -> Result<Booking> {
    find_booking(pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))
}

// Bookings matching a trailing SQL clause, e.g. `WHERE user_id = ? ORDER BY ...`.
pub async fn query_bookings(
    pool: &SqlitePool,
    clause: &str,
    binds: &[i64],
) -> Result<Vec<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings {clause}");
    let mut query = sqlx::query_as::<_, BookingRow>(&sql);
    for value in binds {
        query = query.bind(*value);
    }
    query
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Booking::try_from)
        .collect()
}
