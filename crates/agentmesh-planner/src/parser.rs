use regex::Regex;
use std::sync::LazyLock;

/// Labels the decision engine asks the model to use. A line starting with one
/// of these ends the section above it.
pub const SECTION_LABELS: &[&str] = &[
    "intent",
    "category",
    "confidence",
    "required_agents",
    "reasoning",
    "decision",
    "clarification",
    "agent_coordination",
    "execution_plan",
];

#[allow(clippy::expect_used)]
static LABEL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\s>#*\-]*([A-Za-z][A-Za-z_ ]*?)\s*\**\s*:(.*)$").expect("valid label regex")
});

#[allow(clippy::expect_used)]
static DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("valid digits regex"));

/// Lower-cases a label value and joins its words with underscores.
///
/// `"Text Processing"` becomes `"text_processing"`.
pub fn normalize_label(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '`')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// Extracts labeled sections and normalized values from free-text model output.
///
/// Sections look like `Label: value`, optionally decorated with markdown
/// (`**Intent:** ...`, `- Category: ...`). A section runs until the next line
/// carrying one of [`SECTION_LABELS`]. The parser holds no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser;

impl ResponseParser {
    /// Creates a parser.
    pub const fn new() -> Self {
        Self
    }

    /// Returns the trimmed text of the section named `label`, or `None` when
    /// the label is absent or its section is blank. Matching is case-insensitive
    /// and treats spaces and underscores alike.
    pub fn extract_section(&self, text: &str, label: &str) -> Option<String> {
        let wanted = normalize_label(label);
        let mut collected: Option<Vec<&str>> = None;

        for line in text.lines() {
            if let Some((found, rest)) = label_of(line) {
                if collected.is_some() {
                    break;
                }
                if found == wanted {
                    collected = Some(vec![rest]);
                }
                continue;
            }
            if let Some(lines) = collected.as_mut() {
                lines.push(line);
            }
        }

        let joined = collected?.join("\n");
        let trimmed = joined.trim().trim_matches('*').trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Whether a line of `text` opens the section `label`, even if the
    /// section itself is blank.
    pub fn has_section(&self, text: &str, label: &str) -> bool {
        let wanted = normalize_label(label);
        text.lines()
            .filter_map(label_of)
            .any(|(found, _)| found == wanted)
    }

    /// Parses the first contiguous run of decimal digits in `text`.
    ///
    /// Returns 0 when there are none. A run too large for `i64` saturates.
    pub fn extract_confidence(&self, text: &str) -> i64 {
        DIGITS
            .find(text)
            .map(|m| m.as_str().parse::<i64>().unwrap_or(i64::MAX))
            .unwrap_or(0)
    }

    /// Splits an agent list on commas, semicolons, and newlines, stripping
    /// bullets and dropping blanks, duplicates, and placeholders like `none`.
    pub fn parse_agent_list(&self, text: &str) -> Vec<String> {
        let mut agents: Vec<String> = Vec::new();
        for raw in text.split([',', ';', '\n']) {
            let name = raw
                .trim()
                .trim_start_matches(['-', '*', '•'])
                .trim()
                .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.')
                .trim();
            if name.is_empty() {
                continue;
            }
            let lower = name.to_lowercase();
            if matches!(lower.as_str(), "none" | "n/a" | "na" | "[]") {
                continue;
            }
            if !agents.iter().any(|a| a == name) {
                agents.push(name.to_string());
            }
        }
        agents
    }

    /// Returns the outermost brace-delimited slice of `text`, if any.
    pub fn extract_json_object<'a>(&self, text: &'a str) -> Option<&'a str> {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        (start < end).then(|| &text[start..=end])
    }

    /// Whether the section `label` starts with `value` (case-insensitive).
    pub fn section_starts_with(&self, text: &str, label: &str, value: &str) -> bool {
        self.extract_section(text, label)
            .map(|section| section.to_uppercase().starts_with(&value.to_uppercase()))
            .unwrap_or(false)
    }
}

/// Returns `(normalized_label, rest_of_line)` when the line opens a known section.
fn label_of(line: &str) -> Option<(String, &str)> {
    let caps = LABEL_LINE.captures(line)?;
    let label = normalize_label(caps.get(1)?.as_str());
    if !SECTION_LABELS.contains(&label.as_str()) {
        return None;
    }
    let rest = caps.get(2).map_or("", |m| m.as_str());
    Some((label, rest))
}

/// First `n` whitespace-separated words of `text`, or all of it when shorter.
pub fn first_words(text: &str, n: usize) -> String {
    text.split_whitespace().take(n).collect::<Vec<_>>().join(" ")
}
