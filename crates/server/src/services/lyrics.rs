// Lyrics drafting through the Gemini text API

use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};

const GEMINI_GENERATE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";

#[derive(Clone)]
pub struct LyricsClient {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

pub fn lyrics_prompt(topic: &str, language: &str, lines: u32) -> String {
    format!(
        "You are a poetic lyricist specializing in Islamic spiritual songs (Nasheeds). \
         A Nasheed is a vocal-only piece of music with lyrics that praise Allah, describe the \
         Prophet Muhammad (PBUH), or convey Islamic values.\n\n\
         Please generate a Nasheed with approximately {lines} lines in the {language} language.\n\n\
         The topic for the Nasheed is: \"{topic}\".\n\n\
         The lyrics should be soulful, inspiring, deeply spiritual, and reflect Islamic values. \
         Do not include musical cues, titles like \"Verse\" or \"Chorus\", or any other text; \
         just provide the raw lyrics."
    )
}

fn first_text(response: GenerateResponse) -> Option<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

impl LyricsClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    pub async fn generate(&self, topic: &str, language: &str, lines: u32) -> Result<String> {
        let response = self
            .client
            .post(GEMINI_GENERATE_URL)
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({
                "contents": [{ "parts": [{ "text": lyrics_prompt(topic, language, lines) }] }]
            }))
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Lyrics request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Lyrics service returned {status}: {body}"
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Unreadable lyrics response: {e}")))?;

        first_text(parsed)
            .ok_or_else(|| AppError::Internal("Lyrics service returned no text".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_request_parameters() {
        let prompt = lyrics_prompt("patience", "Bangla", 12);
        assert!(prompt.contains("approximately 12 lines in the Bangla language"));
        assert!(prompt.contains("\"patience\""));
    }

    #[test]
    fn joins_parts_of_the_first_candidate() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "line one\n" }, { "text": "line two" }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }))
        .unwrap();
        assert_eq!(first_text(response).as_deref(), Some("line one\nline two"));

        let empty: GenerateResponse = serde_json::from_value(json!({ "candidates": [] })).unwrap();
        assert!(first_text(empty).is_none());
    }
}
