//! Wake phrase matching over recognizer result batches

use serde::{Deserialize, Serialize};

use crate::speech::ResultBatch;

/// Alternatives inspected per result
pub const MAX_ALTERNATIVES: usize = 3;

/// Wake-word detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeWordConfig {
    /// Trigger phrases, matched case-insensitively as substrings
    pub wake_words: Vec<String>,
    /// Minimum alternative confidence (0.0 to 1.0)
    pub confidence_threshold: f32,
}

impl Default for WakeWordConfig {
    fn default() -> Self {
        Self {
            wake_words: vec!["phoenix".into(), "hey phoenix".into(), "ok phoenix".into()],
            confidence_threshold: 0.6,
        }
    }
}

/// A qualifying alternative
#[derive(Debug, Clone, PartialEq)]
pub struct WakeMatch {
    /// Normalized (lowercased, trimmed) transcript
    pub transcript: String,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct WakeWordMatcher {
    wake_words: Vec<String>,
    confidence_threshold: f32,
}

impl WakeWordMatcher {
    pub fn new(config: &WakeWordConfig) -> Self {
        Self {
            wake_words: config
                .wake_words
                .iter()
                .map(|word| word.trim().to_lowercase())
                .filter(|word| !word.is_empty())
                .collect(),
            confidence_threshold: config.confidence_threshold,
        }
    }

    pub fn wake_words(&self) -> &[String] {
        &self.wake_words
    }

    /// First qualifying alternative from `result_index` onwards
    pub fn find_match(&self, batch: &ResultBatch) -> Option<WakeMatch> {
        batch
            .results
            .iter()
            .skip(batch.result_index)
            .flat_map(|result| result.alternatives.iter().take(MAX_ALTERNATIVES))
            .find_map(|alternative| {
                let transcript = alternative.transcript.trim().to_lowercase();
                let qualifies = self.contains_wake_word(&transcript)
                    && alternative.confidence >= self.confidence_threshold;
                qualifies.then(|| WakeMatch {
                    transcript,
                    confidence: alternative.confidence,
                })
            })
    }

    fn contains_wake_word(&self, transcript: &str) -> bool {
        self.wake_words
            .iter()
            .any(|word| transcript.contains(word.as_str()))
    }
}
