pub mod bookings;
pub mod models;

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::error::{AppError, Result};

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        // Ensure the data directory exists
        if let Some(path) = url.strip_prefix("sqlite:") {
            let path = path.split('?').next().unwrap_or(path);
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn connect_in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

// Canonical stored form of an instant: RFC 3339, millisecond precision, `Z`.
// Fixed width keeps lexical order equal to chronological order in SQL.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now() -> String {
    format_timestamp(Utc::now())
}

pub fn parse_stored_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| AppError::Internal(format!("Corrupt date '{raw}' in store: {e}")))
}

pub fn parse_stored_amount(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| AppError::Internal(format!("Corrupt amount '{raw}' in store: {e}")))
}

// Accepts `YYYY-MM-DD` or a full ISO timestamp (the date part is kept).
pub fn parse_input_date(raw: &str, field: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|t| t.date_naive()))
        .map_err(|_| AppError::Validation(format!("{field} must be a date (YYYY-MM-DD)")))
}
