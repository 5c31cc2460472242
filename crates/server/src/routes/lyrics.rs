use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, Result},
    services::access::{allow_public, PublicOperation},
    AppState,
};

const MAX_LINES: u32 = 100;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(generate_lyrics))
}

#[derive(Debug, Default, Deserialize)]
pub struct LyricsRequest {
    pub topic: Option<String>,
    pub language: Option<String>,
    pub lines: Option<u32>,
}

async fn generate_lyrics(
    State(state): State<AppState>,
    Json(body): Json<LyricsRequest>,
) -> Result<Json<Value>> {
    allow_public(None, PublicOperation::GenerateLyrics)?;
    let non_blank = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    let (Some(topic), Some(language), Some(lines)) =
        (non_blank(&body.topic), non_blank(&body.language), body.lines)
    else {
        return Err(AppError::Validation(
            "Missing topic, language, or lines for lyrics generation.".to_string(),
        ));
    };
    if !(1..=MAX_LINES).contains(&lines) {
        return Err(AppError::Validation(format!(
            "lines must be between 1 and {MAX_LINES}"
        )));
    }

    let client = state
        .lyrics
        .as_ref()
        .ok_or_else(|| AppError::Internal("GEMINI_API_KEY is not configured".to_string()))?;
    let lyrics = client.generate(&topic, &language, lines).await?;

    tracing::info!(%language, lines, "Lyrics generated");
    Ok(Json(json!({ "lyrics": lyrics })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn all_inputs_are_required() {
        let ctx = testing::context().await;
        let err = generate_lyrics(
            State(ctx.state.clone()),
            Json(LyricsRequest {
                topic: Some("Gratitude".to_string()),
                language: Some("  ".to_string()),
                lines: Some(8),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = generate_lyrics(
            State(ctx.state.clone()),
            Json(LyricsRequest {
                topic: Some("Gratitude".to_string()),
                language: Some("Bangla".to_string()),
                lines: Some(0),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_api_key_is_a_server_fault() {
        let ctx = testing::context().await;
        let err = generate_lyrics(
            State(ctx.state.clone()),
            Json(LyricsRequest {
                topic: Some("Gratitude".to_string()),
                language: Some("Bangla".to_string()),
                lines: Some(8),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
