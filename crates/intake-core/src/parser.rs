//! Line-oriented parser for LLM completion text.
//!
//! Completions are expected to look like:
//!
//! ```text
//! **Claim Info**
//! - Policy Number: ABC123
//! - Date of Loss: 2024-03-01
//! **Insured**
//! - Name: John Carver
//! ```
//!
//! The parser is an explicit two-state machine: it is either outside
//! any section or inside the most recently opened one. Section headers
//! never nest; a header encountered inside a section simply switches
//! to the new section. Lines that fit neither shape are ignored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::{normalize_key, ParsedDocument};

/// Two-character emphasis marker that opens and closes a section header.
const SECTION_MARKER: &str = "**";

/// Code-fence delimiter stripped from completions before parsing.
const CODE_FENCE: &str = "```";

/// Instruction tag some backends echo back; it and everything after it
/// are discarded.
const INSTRUCTION_MARKER: &str = "[INST]";

/// Suffix appended to a field value when lenient mode tolerates a loop.
pub const LOOP_ANNOTATION: &str = " (Loop Detected)";

/// Policy governing whether degenerate output aborts the parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// Loop detection and validation failures abort the whole call.
    Strict,
    /// Failures are annotated in the returned document instead.
    Lenient,
}

impl ParseMode {
    /// Whether failures should abort rather than annotate.
    pub fn is_strict(self) -> bool {
        matches!(self, ParseMode::Strict)
    }
}

impl Default for ParseMode {
    fn default() -> Self {
        ParseMode::Lenient
    }
}

/// Errors raised while parsing a completion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The same key/value pair was emitted twice in one section,
    /// indicating the backend is looping. Strict mode only.
    #[error("loop detected for field '{field}' in section '{section}'")]
    LoopDetected { section: String, field: String },
}

/// Parser state: outside any section, or inside a named one.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ParserState {
    NoSection,
    InSection(String),
}

/// Turns raw completion text into a [`ParsedDocument`].
#[derive(Debug, Clone, Copy)]
pub struct ResponseParser {
    mode: ParseMode,
}

impl ResponseParser {
    /// Create a parser with the given mode.
    pub fn new(mode: ParseMode) -> Self {
        Self { mode }
    }

    /// Parse completion text into a document.
    ///
    /// Returns an empty document when no section headers are found;
    /// that is not an error by itself. Fails only on loop detection in
    /// strict mode.
    pub fn parse(&self, raw: &str) -> Result<ParsedDocument, ParseError> {
        let cleaned = strip_completion_artifacts(raw);
        let mut document = ParsedDocument::new();
        let mut state = ParserState::NoSection;

        for line in cleaned.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(header) = section_header(line) {
                let name = normalize_key(header);
                if name.is_empty() {
                    continue;
                }
                tracing::debug!(section = %name, "opening section");
                document.open_section(name.clone());
                state = ParserState::InSection(name);
                continue;
            }

            let ParserState::InSection(section) = &state else {
                // Field-shaped lines outside any section are ignored.
                continue;
            };

            let Some(body) = field_body(line) else {
                continue;
            };
            let Some((raw_key, raw_value)) = body.split_once(':') else {
                tracing::warn!(line, "skipping line without key/value separator");
                continue;
            };

            let key = normalize_key(raw_key);
            let value = raw_value.trim();
            if key.is_empty() || value.is_empty() {
                continue;
            }

            let fields = document.open_section(section.clone());
            match fields.get(&key) {
                Some(existing) if existing == value => {
                    tracing::warn!(
                        section = %section,
                        field = %key,
                        value,
                        "loop detected: identical key/value repeated"
                    );
                    if self.mode.is_strict() {
                        return Err(ParseError::LoopDetected {
                            section: section.clone(),
                            field: key,
                        });
                    }
                    fields.insert(key, format!("{value}{LOOP_ANNOTATION}"));
                }
                _ => {
                    // Last write wins when a key reappears with a new value.
                    fields.insert(key, value.to_string());
                }
            }
        }

        Ok(document)
    }
}

/// Extract the inner text of a section header line, if it is one.
///
/// A header both starts and ends with the `**` marker and has content
/// between the markers.
fn section_header(line: &str) -> Option<&str> {
    if line.len() > SECTION_MARKER.len() * 2
        && line.starts_with(SECTION_MARKER)
        && line.ends_with(SECTION_MARKER)
    {
        Some(&line[SECTION_MARKER.len()..line.len() - SECTION_MARKER.len()])
    } else {
        None
    }
}

/// Extract the key/value portion of a field line.
///
/// Bulleted lines are fields; so are unbulleted lines containing a
/// colon, which some backends emit as continuations of the section.
fn field_body(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix('-') {
        Some(rest)
    } else if line.contains(':') {
        Some(line)
    } else {
        None
    }
}

/// Remove code fences and any echoed instruction tag before parsing.
fn strip_completion_artifacts(raw: &str) -> String {
    let truncated = match raw.find(INSTRUCTION_MARKER) {
        Some(index) => &raw[..index],
        None => raw,
    };
    truncated.replace(CODE_FENCE, "")
}
