use agentmesh_core::{Capability, MeshResult};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

/// Executes the content of one instruction and returns the completion text.
#[async_trait]
pub trait InstructionHandler: Send + Sync {
    /// Capabilities advertised at registration.
    fn capabilities(&self) -> Vec<Capability>;

    async fn handle(&self, instruction: &str) -> MeshResult<String>;
}

#[allow(clippy::expect_used)]
static DOUBLE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("valid quote regex"));

// An opening single quote must not follow a letter or digit, so apostrophes
// ("user's") are not taken for quotes.
#[allow(clippy::expect_used)]
static SINGLE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\p{L}\p{N}])'([^']+)'").expect("valid quote regex"));

#[allow(clippy::expect_used)]
static TEXT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\btext:\s*(.+)").expect("valid marker regex"));

#[allow(clippy::expect_used)]
static FOLLOWING_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bfollowing\b[\s:]*(.+)").expect("valid marker regex"));

#[allow(clippy::expect_used)]
static IN_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bin\b\s+(.+)").expect("valid marker regex"));

/// What a text instruction asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextTask {
    WordCount,
    CharacterCount,
    Analysis,
}

impl TextTask {
    /// Keyword detection on the lower-cased instruction. Word count wins ties
    /// and is the fallback.
    pub fn detect(instruction: &str) -> Self {
        let lower = instruction.to_lowercase();
        if lower.contains("count") && lower.contains("word") {
            Self::WordCount
        } else if lower.contains("analyze") || lower.contains("analysis") {
            Self::Analysis
        } else if lower.contains("character") && lower.contains("count") {
            Self::CharacterCount
        } else {
            Self::WordCount
        }
    }
}

/// Picks the text an instruction operates on.
///
/// In order: the first quoted substring, the text after `text:`, the text
/// after `following`, the remainder after the word `in`, else the whole
/// instruction.
pub fn extract_text(instruction: &str) -> String {
    if let Some(quoted) = first_quoted(instruction) {
        return quoted.to_string();
    }
    for marker in [&*TEXT_MARKER, &*FOLLOWING_MARKER, &*IN_MARKER] {
        if let Some(rest) = marker
            .captures(instruction)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .filter(|rest| !rest.is_empty())
        {
            return rest.to_string();
        }
    }
    instruction.trim().to_string()
}

fn first_quoted(text: &str) -> Option<&str> {
    let double = DOUBLE_QUOTED
        .captures(text)
        .and_then(|c| c.get(1))
        .filter(|m| !m.as_str().trim().is_empty());
    let single = SINGLE_QUOTED
        .captures(text)
        .and_then(|c| c.get(1))
        .filter(|m| !m.as_str().trim().is_empty());
    match (double, single) {
        (Some(d), Some(s)) => Some(if s.start() < d.start() { s } else { d }.as_str()),
        (Some(m), None) | (None, Some(m)) => Some(m.as_str()),
        (None, None) => None,
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn character_count(text: &str) -> usize {
    text.chars().count()
}

pub fn letter_count(text: &str) -> usize {
    text.chars().filter(|c| c.is_alphabetic()).count()
}

/// The default worker: counts words and characters and produces a short
/// analysis report.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextProcessor;

impl TextProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous core of [`InstructionHandler::handle`].
    pub fn process(&self, instruction: &str) -> String {
        let text = extract_text(instruction);
        match TextTask::detect(instruction) {
            TextTask::WordCount => {
                let n = word_count(&text);
                let unit = if n == 1 { "word" } else { "words" };
                format!("The text \"{text}\" contains {n} {unit}.")
            }
            TextTask::CharacterCount => {
                format!(
                    "The text \"{text}\" contains {} characters.",
                    character_count(&text)
                )
            }
            TextTask::Analysis => format!(
                "Text analysis for \"{text}\":\n- Words: {}\n- Characters: {}\n- Letters: {}",
                word_count(&text),
                character_count(&text),
                letter_count(&text)
            ),
        }
    }
}

#[async_trait]
impl InstructionHandler for TextProcessor {
    fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability::new("word_count", "Count the words in a text")
                .with_inputs(["text"])
                .with_outputs(["word_count"]),
            Capability::new("character_count", "Count the characters in a text")
                .with_inputs(["text"])
                .with_outputs(["character_count"]),
            Capability::new(
                "text_analysis",
                "Report word, character, and letter counts of a text",
            )
            .with_inputs(["text"])
            .with_outputs(["word_count", "character_count", "letter_count"]),
        ]
    }

    async fn handle(&self, instruction: &str) -> MeshResult<String> {
        Ok(self.process(instruction))
    }
}
