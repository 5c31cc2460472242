use axum::{extract::State, routing::get, Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::{
    config::Config,
    db::{self, Database},
    error::Result,
    services::access::{allow_public, PublicOperation},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_availability))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookedSlot {
    pub date: NaiveDate,
    pub time_slot: String,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    // 0 = Sunday
    pub unavailable_days: Vec<u32>,
    pub unavailable_dates: Vec<NaiveDate>,
    pub booked_slots: Vec<BookedSlot>,
}

async fn booked_slots(db: &Database, today: NaiveDate) -> Result<Vec<BookedSlot>> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT booking_date, time_slot FROM bookings WHERE status != 'cancelled' AND booking_date >= ? ORDER BY booking_date, time_slot",
    )
    .bind(today.to_string())
    .fetch_all(&db.pool)
    .await?;

    let mut slots = Vec::with_capacity(rows.len());
    for (date, time_slot) in rows {
        let slot = BookedSlot {
            date: db::parse_stored_date(&date)?,
            time_slot,
        };
        if !slots.contains(&slot) {
            slots.push(slot);
        }
    }
    Ok(slots)
}

pub async fn availability(db: &Database, config: &Config, today: NaiveDate) -> Result<Availability> {
    let mut unavailable_dates: Vec<NaiveDate> = config
        .closed_dates
        .iter()
        .copied()
        .filter(|date| *date >= today)
        .collect();
    unavailable_dates.sort();
    unavailable_dates.dedup();

    Ok(Availability {
        unavailable_days: config.closed_weekdays.clone(),
        unavailable_dates,
        booked_slots: booked_slots(db, today).await?,
    })
}

async fn get_availability(State(state): State<AppState>) -> Result<Json<Availability>> {
    allow_public(None, PublicOperation::ReadAvailability)?;
    let today = Utc::now().date_naive();
    Ok(Json(availability(&state.db, &state.config, today).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{services::lifecycle::BookingStatus, testing};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    async fn move_to(db: &Database, booking_id: i64, on: &str, slot: &str) {
        sqlx::query("UPDATE bookings SET booking_date = ?, time_slot = ? WHERE id = ?")
            .bind(on)
            .bind(slot)
            .bind(booking_id)
            .execute(&db.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn future_non_cancelled_bookings_hold_slots() {
        let ctx = testing::context().await;
        let held = testing::seed_booking(&ctx.state.db, None, None).await;
        let past = testing::seed_booking(&ctx.state.db, None, None).await;
        let cancelled = testing::seed_booking(&ctx.state.db, None, None).await;
        move_to(&ctx.state.db, held.id, "2026-07-01", "14:00-16:00").await;
        move_to(&ctx.state.db, past.id, "2026-05-01", "10:00-12:00").await;
        testing::set_status(&ctx.state.db, cancelled.id, BookingStatus::Cancelled).await;

        let mut config = ctx.state.config.clone();
        config.closed_weekdays = vec![1, 3];
        config.closed_dates = vec![date(7, 10), date(5, 20), date(7, 10)];

        let result = availability(&ctx.state.db, &config, date(6, 1)).await.unwrap();
        assert_eq!(
            result,
            Availability {
                unavailable_days: vec![1, 3],
                unavailable_dates: vec![date(7, 10)],
                booked_slots: vec![BookedSlot {
                    date: date(7, 1),
                    time_slot: "14:00-16:00".to_string(),
                }],
            }
        );
    }

    #[tokio::test]
    async fn a_booking_on_today_still_holds_its_slot() {
        let ctx = testing::context().await;
        testing::seed_booking(&ctx.state.db, None, None).await;
        testing::seed_booking(&ctx.state.db, None, None).await;

        let result = availability(&ctx.state.db, &ctx.state.config, date(7, 1))
            .await
            .unwrap();
        // Two bookings in the same slot are reported once
        assert_eq!(result.booked_slots.len(), 1);
        assert_eq!(result.booked_slots[0].date, date(7, 1));
    }
}
