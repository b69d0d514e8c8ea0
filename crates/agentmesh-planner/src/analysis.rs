use crate::parser::normalize_label;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Intent used when the model did not state one.
pub const DEFAULT_INTENT: &str = "general_assistance";
/// Category used when the model did not state one.
pub const DEFAULT_CATEGORY: &str = "general";

/// Structured interpretation of one user request.
///
/// Built once by the decision engine and never mutated afterwards; the
/// fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    id: String,
    request_id: String,
    intent: String,
    category: String,
    confidence: u8,
    required_agents: Vec<String>,
    reasoning: String,
    timestamp: DateTime<Utc>,
}

impl Analysis {
    /// Creates an analysis with a fresh id.
    ///
    /// `intent` and `category` are normalized (lower-case, words joined by
    /// underscores) and fall back to [`DEFAULT_INTENT`] / [`DEFAULT_CATEGORY`]
    /// when blank. `confidence` is clamped to `0..=100`.
    pub fn new(
        request_id: impl Into<String>,
        intent: &str,
        category: &str,
        confidence: i64,
        required_agents: Vec<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.into(),
            intent: normalized_or(intent, DEFAULT_INTENT),
            category: normalized_or(category, DEFAULT_CATEGORY),
            confidence: confidence.clamp(0, 100) as u8,
            required_agents,
            reasoning: reasoning.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn intent(&self) -> &str {
        &self.intent
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Confidence in percent, always within `0..=100`.
    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    pub fn required_agents(&self) -> &[String] {
        &self.required_agents
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

fn normalized_or(value: &str, default: &str) -> String {
    let normalized = normalize_label(value);
    if normalized.is_empty() {
        default.to_string()
    } else {
        normalized
    }
}
