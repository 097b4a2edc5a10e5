//! Translation service contract for LinguaChat.
//!
//! Pipelines talk to this trait only; the bundled [`GeminiTranslator`]
//! is one implementation of it.

pub mod gemini;

pub use gemini::GeminiTranslator;

use async_trait::async_trait;

/// Up to three alternate translations of one message. A provider that
/// returns fewer pads the run by repeating the first variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationVariants {
    pub variant1: String,
    pub variant2: String,
    pub variant3: String,
}

impl TranslationVariants {
    /// Builds a full run from however many variants the provider
    /// produced.
    pub fn from_candidates(mut candidates: Vec<String>) -> Result<Self> {
        candidates.retain(|c| !c.trim().is_empty());
        let first = candidates
            .first()
            .cloned()
            .ok_or_else(|| TranslationError::MalformedResponse("no variants in response".into()))?;
        while candidates.len() < 3 {
            candidates.push(first.clone());
        }
        let mut iter = candidates.into_iter();
        Ok(Self {
            variant1: iter.next().unwrap_or_default(),
            variant2: iter.next().unwrap_or_default(),
            variant3: iter.next().unwrap_or_default(),
        })
    }
}

/// Translation-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("translation quota exhausted: {0}")]
    Quota(String),
    #[error("translation service error: {0}")]
    Service(String),
    #[error("translation transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed translation response: {0}")]
    MalformedResponse(String),
    #[error("all translation credentials exhausted")]
    CredentialsExhausted,
}

impl TranslationError {
    /// Quota errors trigger credential rotation instead of surfacing.
    pub fn is_quota(&self) -> bool {
        matches!(self, TranslationError::Quota(_))
    }
}

pub type Result<T> = std::result::Result<T, TranslationError>;

/// Text-in/text-out translation contract.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translates `text`, producing three alternate renderings for
    /// manual cycling. Used for 1:1 messages.
    async fn translate_variants(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<TranslationVariants>;

    /// Translates `text` into a single rendering. Used for the group
    /// fan-out, one call per distinct recipient language.
    async fn translate_single(&self, text: &str, target_language: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_runs_are_padded_with_the_first_variant() {
        let variants =
            TranslationVariants::from_candidates(vec!["hola".into(), "buenas".into()]).unwrap();
        assert_eq!(variants.variant1, "hola");
        assert_eq!(variants.variant2, "buenas");
        assert_eq!(variants.variant3, "hola");
    }

    #[test]
    fn blank_candidates_are_dropped() {
        let variants =
            TranslationVariants::from_candidates(vec!["  ".into(), "hola".into()]).unwrap();
        assert_eq!(variants.variant1, "hola");
    }

    #[test]
    fn empty_run_is_malformed() {
        let err = TranslationVariants::from_candidates(vec![]).unwrap_err();
        assert!(matches!(err, TranslationError::MalformedResponse(_)));
    }
}
