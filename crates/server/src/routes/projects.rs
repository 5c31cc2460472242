use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    db::{
        self,
        bookings::fetch_booking,
        models::{Booking, ProjectFile, ProjectMessage},
        Database,
    },
    error::{AppError, Result},
    handlers::ws::ProjectEvent,
    middleware::auth::AuthUser,
    routes::upload::UploadForm,
    services::{
        access::{authorize, Action, Resource},
        activity::{log_activity, ActivityEntry},
        storage::Upload,
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_project))
        .route("/:id/messages", post(add_message))
        .route("/:id/files", post(upload_file))
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PersonSummary {
    pub id: i64,
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetails {
    #[serde(flatten)]
    pub booking: Booking,
    pub customer: Option<PersonSummary>,
    pub assigned_employee: Option<PersonSummary>,
    // Chat order, oldest first
    pub project_messages: Vec<ProjectMessage>,
    // Most recent first
    pub project_files: Vec<ProjectFile>,
}

const MESSAGE_SELECT: &str = "SELECT m.id, m.booking_id, m.sender_id, \
     COALESCE(u.full_name, u.username) AS sender_name, u.role AS sender_role, \
     m.message, m.created_at \
     FROM project_messages m JOIN users u ON u.id = m.sender_id";

const FILE_SELECT: &str = "SELECT f.id, f.booking_id, f.uploader_id, \
     COALESCE(u.full_name, u.username) AS uploader_name, f.file_name, f.file_url, \
     f.file_type, f.file_size, f.uploaded_by, f.created_at \
     FROM project_files f JOIN users u ON u.id = f.uploader_id";

async fn person(db: &Database, id: Option<i64>) -> Result<Option<PersonSummary>> {
    let Some(id) = id else {
        return Ok(None);
    };
    Ok(sqlx::query_as::<_, PersonSummary>(
        "SELECT id, username, full_name, email, phone_number FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&db.pool)
    .await?)
}

async fn authorized_booking(
    state: &AppState,
    user: &AuthUser,
    action: Action,
    booking_id: i64,
) -> Result<Booking> {
    let booking = fetch_booking(&state.db.pool, booking_id)
        .await
        .map_err(|e| match e {
            AppError::NotFound(_) => AppError::NotFound("Project not found".to_string()),
            other => other,
        })?;
    authorize(&state.db, user, action, &Resource::Project((&booking).into())).await?;
    Ok(booking)
}

async fn get_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ProjectDetails>> {
    let booking = authorized_booking(&state, &user, Action::Read, id).await?;

    let messages = sqlx::query_as::<_, ProjectMessage>(&format!(
        "{MESSAGE_SELECT} WHERE m.booking_id = ? ORDER BY m.created_at ASC, m.id ASC"
    ))
    .bind(id)
    .fetch_all(&state.db.pool)
    .await?;

    let files = sqlx::query_as::<_, ProjectFile>(&format!(
        "{FILE_SELECT} WHERE f.booking_id = ? ORDER BY f.created_at DESC, f.id DESC"
    ))
    .bind(id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(ProjectDetails {
        customer: person(&state.db, booking.user_id).await?,
        assigned_employee: person(&state.db, booking.assigned_employee_id).await?,
        booking,
        project_messages: messages,
        project_files: files,
    }))
}

async fn add_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<MessageRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    authorized_booking(&state, &user, Action::Write, id).await?;

    let text = body
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AppError::Validation("Message content cannot be empty.".to_string()))?;

    let message_id = sqlx::query(
        "INSERT INTO project_messages (booking_id, sender_id, message, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(id)
    .bind(user.id)
    .bind(text)
    .bind(db::now())
    .execute(&state.db.pool)
    .await?
    .last_insert_rowid();

    let message = sqlx::query_as::<_, ProjectMessage>(&format!("{MESSAGE_SELECT} WHERE m.id = ?"))
        .bind(message_id)
        .fetch_one(&state.db.pool)
        .await?;

    log_activity(
        &state.db.pool,
        ActivityEntry::by(
            &user,
            "PROJECT_MESSAGE_SENT",
            format!("User {} sent message in project #{id}", user.username),
        )
        .on("project_message", id),
    )
    .await;
    state
        .hub
        .publish(id, &ProjectEvent::NewMessage(message.clone()))
        .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Message sent successfully!", "projectMessage": message })),
    ))
}

async fn upload_file(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Value>)> {
    // Check access before buffering the body
    let booking = authorized_booking(&state, &user, Action::Write, id).await?;
    let upload = UploadForm::read(multipart).await?.take_file("projectFile")?;
    let file = store_project_file(&state, &user, &booking, upload).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "File uploaded successfully!", "file": file })),
    ))
}

// `booking` must already be authorized for a write by `user`
pub async fn store_project_file(
    state: &AppState,
    user: &AuthUser,
    booking: &Booking,
    upload: Upload,
) -> Result<ProjectFile> {
    let booking_id = booking.id;
    upload.check_allowed()?;

    let blob = state.blobs.put(&upload).await?;
    let uploaded_by = if user.role.is_studio() { "studio" } else { "client" };

    let inserted = sqlx::query(
        "INSERT INTO project_files (booking_id, uploader_id, file_name, file_url, file_type, file_size, uploaded_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(booking_id)
    .bind(user.id)
    .bind(&upload.file_name)
    .bind(&blob.url)
    .bind(&upload.content_type)
    .bind(upload.data.len() as i64)
    .bind(uploaded_by)
    .bind(db::now())
    .execute(&state.db.pool)
    .await;

    let file_id = match inserted {
        Ok(result) => result.last_insert_rowid(),
        Err(e) => {
            // Do not leave an unreferenced blob behind
            if let Err(cleanup) = state.blobs.delete(&blob.url).await {
                tracing::warn!(error = %cleanup, url = %blob.url, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }
    };

    let file = sqlx::query_as::<_, ProjectFile>(&format!("{FILE_SELECT} WHERE f.id = ?"))
        .bind(file_id)
        .fetch_one(&state.db.pool)
        .await?;

    log_activity(
        &state.db.pool,
        ActivityEntry::by(
            user,
            "PROJECT_FILE_UPLOADED",
            format!(
                "User {} uploaded file '{}' to project #{booking_id}",
                user.username, upload.file_name
            ),
        )
        .on("project_file", booking_id),
    )
    .await;
    state
        .hub
        .publish(booking_id, &ProjectEvent::FileUploaded(file.clone()))
        .await;

    Ok(file)
}
