//! Gemini-backed translator with credential rotation.

use crate::{Result, TranslationError, TranslationVariants, Translator};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-pro";

/// Translator backed by the Gemini generateContent API.
///
/// Holds one or more API keys; a quota or rate-limit response rotates to
/// the next key and retries until every key has been tried once.
pub struct GeminiTranslator {
    http: reqwest::Client,
    keys: Vec<String>,
    current_key: AtomicUsize,
    model: String,
    endpoint: String,
}

impl GeminiTranslator {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            keys,
            current_key: AtomicUsize::new(0),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Runs one prompt through the model, rotating keys on quota errors.
    async fn generate(&self, system_instruction: String, text: &str) -> Result<String> {
        if self.keys.is_empty() {
            return Err(TranslationError::CredentialsExhausted);
        }

        let mut attempts = 0;
        while attempts < self.keys.len() {
            let index = self.current_key.load(Ordering::Relaxed) % self.keys.len();
            match self
                .request_once(&self.keys[index], &system_instruction, text)
                .await
            {
                Ok(body) => return Ok(body),
                Err(err) if err.is_quota() => {
                    warn!(key_index = index, %err, "translation key exhausted, rotating");
                    self.current_key
                        .store((index + 1) % self.keys.len(), Ordering::Relaxed);
                    attempts += 1;
                }
                Err(err) => return Err(err),
            }
        }
        Err(TranslationError::CredentialsExhausted)
    }

    async fn request_once(
        &self,
        key: &str,
        system_instruction: &str,
        text: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.endpoint, self.model, key
        );
        let body = json!({
            "systemInstruction": { "parts": [{ "text": system_instruction }] },
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "temperature": 1,
                "topP": 0.95,
                "topK": 40,
                "maxOutputTokens": 8192,
                "responseMimeType": "text/plain",
            },
        });

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        let payload = response.text().await?;

        if let Some(err) = classify_failure(status.as_u16(), &payload) {
            return Err(err);
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&payload)
            .map_err(|e| TranslationError::MalformedResponse(e.to_string()))?;
        parsed
            .first_text()
            .ok_or_else(|| TranslationError::MalformedResponse("response had no text".into()))
    }
}

#[async_trait]
impl Translator for GeminiTranslator {
    async fn translate_variants(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<TranslationVariants> {
        let instruction = format!(
            "Translate the text to {target_language}. Produce exactly three \
             variations of the translation, numbered 1 to 3, with no \
             explanation. Keep any profanity from the original text."
        );
        let response = self.generate(instruction, text).await?;
        TranslationVariants::from_candidates(numbered_lines(&response))
    }

    async fn translate_single(&self, text: &str, target_language: &str) -> Result<String> {
        let instruction = format!(
            "Translate the following text to {target_language}. Provide only \
             the direct translation, no explanations or variations."
        );
        let response = self.generate(instruction, text).await?;
        numbered_lines(&response)
            .into_iter()
            .next()
            .ok_or_else(|| TranslationError::MalformedResponse("empty translation".into()))
    }
}

/// Maps an HTTP failure onto the error taxonomy. `None` means success.
fn classify_failure(status: u16, payload: &str) -> Option<TranslationError> {
    if status == 429 || payload.contains("RESOURCE_EXHAUSTED") {
        return Some(TranslationError::Quota(format!("status {status}")));
    }
    if !(200..300).contains(&status) {
        return Some(TranslationError::Service(format!(
            "status {status}: {}",
            payload.chars().take(200).collect::<String>()
        )));
    }
    None
}

/// Splits a model response into candidate lines, dropping blank lines and
/// leading `1.`-style numbering.
fn numbered_lines(response: &str) -> Vec<String> {
    response
        .lines()
        .map(strip_numbering)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_numbering(line: &str) -> &str {
    let line = line.trim();
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == line.len() {
        return line;
    }
    match rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
        Some(stripped) => stripped.trim_start(),
        None => line,
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl GenerateContentResponse {
    fn first_text(&self) -> Option<String> {
        let text = &self.candidates.first()?.content.parts.first()?.text;
        if text.is_empty() {
            None
        } else {
            Some(text.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_is_stripped() {
        assert_eq!(strip_numbering("1. Hola"), "Hola");
        assert_eq!(strip_numbering("2) Buenas"), "Buenas");
        assert_eq!(strip_numbering("  3.  Qué tal"), "Qué tal");
        assert_eq!(strip_numbering("Hola"), "Hola");
        assert_eq!(strip_numbering("24 horas"), "24 horas");
    }

    #[test]
    fn response_lines_become_candidates() {
        let lines = numbered_lines("1. Hola\n\n2. Buenas\n3. Qué tal\n");
        assert_eq!(lines, vec!["Hola", "Buenas", "Qué tal"]);
    }

    #[test]
    fn quota_failures_are_classified_for_rotation() {
        assert!(classify_failure(429, "").unwrap().is_quota());
        assert!(classify_failure(200, r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#)
            .unwrap()
            .is_quota());
        assert!(matches!(
            classify_failure(500, "boom"),
            Some(TranslationError::Service(_))
        ));
        assert!(classify_failure(200, r#"{"candidates":[]}"#).is_none());
    }

    #[test]
    fn response_text_is_extracted() {
        let payload = r#"{"candidates":[{"content":{"parts":[{"text":"1. Hola"}]}}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.first_text().unwrap(), "1. Hola");
    }
}
