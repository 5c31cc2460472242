// Best-effort activity log writer

use sqlx::SqlitePool;

use crate::{db, middleware::auth::AuthUser};

pub struct ActivityEntry<'a> {
    pub user_id: Option<i64>,
    pub action_type: &'a str,
    pub details: String,
    pub target_id: Option<i64>,
    pub target_type: Option<&'a str>,
    pub ip_address: Option<&'a str>,
}

impl<'a> ActivityEntry<'a> {
    pub fn by(user: &'a AuthUser, action_type: &'a str, details: String) -> Self {
        Self {
            user_id: Some(user.id),
            action_type,
            details,
            target_id: None,
            target_type: None,
            ip_address: user.source.as_deref(),
        }
    }

    pub fn anonymous(action_type: &'a str, details: String) -> Self {
        Self {
            user_id: None,
            action_type,
            details,
            target_id: None,
            target_type: None,
            ip_address: None,
        }
    }

    pub fn on(mut self, target_type: &'a str, target_id: i64) -> Self {
        self.target_type = Some(target_type);
        self.target_id = Some(target_id);
        self
    }
}

// Record an activity. A failing write is logged and swallowed so it never
// aborts the operation that triggered it.
pub async fn log_activity(pool: &SqlitePool, entry: ActivityEntry<'_>) {
    let result = sqlx::query(
        "INSERT INTO activity_logs (user_id, action_type, details, target_id, target_type, ip_address, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.user_id)
    .bind(entry.action_type)
    .bind(&entry.details)
    .bind(entry.target_id)
    .bind(entry.target_type)
    .bind(entry.ip_address)
    .bind(db::now())
    .execute(pool)
    .await;

    match result {
        Ok(_) => tracing::debug!(action = entry.action_type, "Activity logged: {}", entry.details),
        Err(e) => tracing::warn!(
            error = %e,
            action = entry.action_type,
            "Failed to log activity"
        ),
    }
}
