// Shared fixtures for handler and service tests

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tempfile::TempDir;

use crate::{
    config::Config,
    db::{self, bookings::fetch_booking, models::Booking, Database},
    handlers::ws::ProjectHub,
    middleware::auth::AuthUser,
    services::{
        access::Role,
        ledger::PaymentStatus,
        lifecycle::BookingStatus,
        mailer::{MailError, Mailer, OutgoingMail},
        storage::LocalBlobStore,
    },
    AppState,
};

// Captures outgoing mail; addresses registered with `fail_for` are rejected.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.to).collect()
    }

    pub fn fail_for(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        if self.failing.lock().unwrap().contains(&mail.to) {
            return Err(MailError::Rejected {
                status: 503,
                body: "relay unavailable".to_string(),
            });
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

pub struct TestContext {
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    pub dir: TempDir,
}

pub async fn context() -> TestContext {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::for_tests(dir.path().to_str().unwrap());
    let db = Database::connect_in_memory().await.unwrap();
    let mailer = Arc::new(RecordingMailer::default());

    let state = AppState {
        db,
        blobs: Arc::new(LocalBlobStore::new(dir.path(), &config.public_base_url)),
        config,
        mailer: mailer.clone(),
        hub: ProjectHub::new(),
        lyrics: None,
    };

    TestContext { state, mailer, dir }
}

// Inserts an account that cannot log in and returns it as a caller.
pub async fn seed_user(db: &Database, username: &str, role: Role) -> AuthUser {
    let now = db::now();
    let id = sqlx::query(
        "INSERT INTO users (username, password_hash, role, full_name, created_at, updated_at) VALUES (?, '!', ?, ?, ?, ?)",
    )
    .bind(username)
    .bind(role.as_str())
    .bind(format!("{username} (test)"))
    .bind(&now)
    .bind(&now)
    .execute(&db.pool)
    .await
    .unwrap()
    .last_insert_rowid();

    AuthUser {
        id,
        username: username.to_string(),
        role,
        source: Some("127.0.0.1".to_string()),
    }
}

pub async fn seed_employee(db: &Database, username: &str) -> AuthUser {
    let user = seed_user(db, username, Role::Employee).await;
    let now = db::now();
    sqlx::query(
        "INSERT INTO employees (user_id, position, salary, hire_date, created_at, updated_at) VALUES (?, 'Sound Engineer', '25000', '2026-01-01', ?, ?)",
    )
    .bind(user.id)
    .bind(&now)
    .bind(&now)
    .execute(&db.pool)
    .await
    .unwrap();
    user
}

// A pending Standard booking with half of 6000 paid.
pub async fn seed_booking(db: &Database, owner: Option<i64>, email: Option<&str>) -> Booking {
    let now = db::now();
    let id = sqlx::query(
        "INSERT INTO bookings (user_id, client_name, client_email, client_phone, package_name, booking_date, time_slot, transaction_ref, status, total_amount, paid_amount, due_amount, payment_status, created_at, updated_at) \
         VALUES (?, 'Test Client', ?, '01700000000', 'Standard', '2026-07-01', '10:00-12:00', '1234', 'pending', '6000', '3000', '3000', 'partially_paid', ?, ?)",
    )
    .bind(owner)
    .bind(email)
    .bind(&now)
    .bind(&now)
    .execute(&db.pool)
    .await
    .unwrap()
    .last_insert_rowid();

    fetch_booking(&db.pool, id).await.unwrap()
}

pub async fn set_status(db: &Database, booking_id: i64, status: BookingStatus) {
    sqlx::query("UPDATE bookings SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(booking_id)
        .execute(&db.pool)
        .await
        .unwrap();
}

pub async fn count(db: &Database, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(&db.pool)
        .await
        .unwrap()
}

pub fn sample_booking(id: i64, email: Option<&str>) -> Booking {
    Booking {
        id,
        user_id: None,
        client_name: "Test Client".to_string(),
        client_email: email.map(str::to_string),
        client_phone: "01700000000".to_string(),
        package_name: "Standard".to_string(),
        booking_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
        time_slot: "10:00-12:00".to_string(),
        message: None,
        transaction_ref: "1234".to_string(),
        status: BookingStatus::Completed,
        assigned_employee_id: None,
        total_amount: Decimal::from(6000),
        paid_amount: Decimal::from(3000),
        due_amount: Decimal::from(3000),
        payment_status: PaymentStatus::PartiallyPaid,
        is_feedback_survey_sent: false,
        created_at: "2026-06-01T10:00:00.000Z".to_string(),
        updated_at: "2026-06-01T10:00:00.000Z".to_string(),
    }
}
