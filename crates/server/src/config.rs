use std::env;
use std::str::FromStr;

use anyhow::Context;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::services::ledger::PackageCatalog;

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub storage_path: String,
    pub public_base_url: String,
    // Frontend origin used to build survey links
    pub client_url: String,
    pub jwt_secret: String,
    pub jwt_ttl_days: i64,
    pub packages: PackageCatalog,
    pub min_advance_payment: Decimal,
    pub survey_grace_days: i64,
    pub survey_sweep_interval_secs: u64,
    // Weekdays the studio never opens, 0 = Sunday
    pub closed_weekdays: Vec<u32>,
    pub closed_dates: Vec<NaiveDate>,
    pub mail: MailConfig,
    pub gemini_api_key: Option<String>,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

#[derive(Clone)]
pub struct MailConfig {
    pub brevo_api_key: Option<String>,
    pub sender_email: String,
    pub sender_name: String,
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn list(name: &str) -> Vec<String> {
    optional(name)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn closed_weekdays() -> anyhow::Result<Vec<u32>> {
    list("CLOSED_WEEKDAYS")
        .iter()
        .map(|day| match day.parse::<u32>() {
            Ok(d) if d < 7 => Ok(d),
            _ => anyhow::bail!("CLOSED_WEEKDAYS entry '{day}' is not a weekday number (0-6)"),
        })
        .collect()
}

fn closed_dates() -> anyhow::Result<Vec<NaiveDate>> {
    list("CLOSED_DATES")
        .iter()
        .map(|date| {
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("CLOSED_DATES entry '{date}' is not YYYY-MM-DD"))
        })
        .collect()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = parsed("PORT", 5000);

        let packages = PackageCatalog::parse(
            &env::var("PACKAGE_PRICES")
                .unwrap_or_else(|_| "Basic=3000,Standard=6000,Premium=10000".to_string()),
        )
        .map_err(anyhow::Error::msg)
        .context("PACKAGE_PRICES is invalid")?;

        let min_advance_payment = match optional("MIN_ADVANCE_PAYMENT") {
            Some(v) => Decimal::from_str(&v).context("MIN_ADVANCE_PAYMENT is not a number")?,
            None => Decimal::from(1000),
        };

        Ok(Self {
            port,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./data/studio.db?mode=rwc".to_string()),
            storage_path: env::var("STORAGE_PATH")
                .unwrap_or_else(|_| "./data/uploads".to_string()),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{port}")),
            client_url: env::var("CLIENT_URL")
                .unwrap_or_else(|_| "http://localhost:5500".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "development-secret-change-in-production".to_string()),
            jwt_ttl_days: parsed("JWT_TTL_DAYS", 7),
            packages,
            min_advance_payment,
            survey_grace_days: parsed("SURVEY_GRACE_DAYS", 2),
            survey_sweep_interval_secs: parsed("SURVEY_SWEEP_INTERVAL_SECS", 24 * 60 * 60),
            closed_weekdays: closed_weekdays()?,
            closed_dates: closed_dates()?,
            mail: MailConfig {
                brevo_api_key: optional("BREVO_API_KEY"),
                sender_email: env::var("SENDER_EMAIL_ADDRESS")
                    .unwrap_or_else(|_| "studio@localhost".to_string()),
                sender_name: env::var("SENDER_NAME").unwrap_or_else(|_| "Studio".to_string()),
            },
            gemini_api_key: optional("GEMINI_API_KEY"),
            admin_username: optional("ADMIN_USERNAME"),
            admin_password: optional("ADMIN_PASSWORD"),
        })
    }

    #[cfg(test)]
    pub fn for_tests(storage_path: &str) -> Self {
        Self {
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            storage_path: storage_path.to_string(),
            public_base_url: "http://studio.test".to_string(),
            client_url: "http://client.test".to_string(),
            jwt_secret: "test-secret".to_string(),
            jwt_ttl_days: 1,
            packages: PackageCatalog::default(),
            min_advance_payment: Decimal::from(1000),
            survey_grace_days: 2,
            survey_sweep_interval_secs: 60,
            closed_weekdays: Vec::new(),
            closed_dates: Vec::new(),
            mail: MailConfig {
                brevo_api_key: None,
                sender_email: "studio@studio.test".to_string(),
                sender_name: "Studio".to_string(),
            },
            gemini_api_key: None,
            admin_username: None,
            admin_password: None,
        }
    }
}
