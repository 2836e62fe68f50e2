//! The document model produced by response parsing.
//!
//! A [`ParsedDocument`] is a two-level structure: named sections, each
//! holding key/value fields. Section and field order follows the order
//! they first appeared in the completion text.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// Anything that is not a word character or whitespace.
    static ref PUNCTUATION: Regex = Regex::new(r"[^\w\s]").unwrap();

    /// One or more whitespace characters.
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Normalize a raw section name or field key.
///
/// Lower-cases, strips punctuation (including parentheses and the `**`
/// emphasis markers around section headers), and joins the remaining
/// words with underscores: `"Claim Info"` becomes `"claim_info"`,
/// `"Name (Last)"` becomes `"name_last"`.
pub fn normalize_key(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lowered, "");
    WHITESPACE.replace_all(stripped.trim(), "_").into_owned()
}

/// A named group of key/value fields within a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Section {
    fields: IndexMap<String, String>,
}

impl Section {
    /// Create an empty section.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a field value by normalized key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Store a field, returning any previous value for the key.
    pub fn insert(&mut self, key: String, value: String) -> Option<String> {
        self.fields.insert(key, value)
    }

    /// Iterate fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of fields in this section.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether this section holds no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The structured result of parsing one completion.
///
/// A document with zero sections is valid and means "nothing
/// extracted", not an error. Serializes as a plain nested map so the
/// JSON shape is `{"claim_info": {"policy_number": "ABC123"}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParsedDocument {
    sections: IndexMap<String, Section>,
}

impl ParsedDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a section by normalized name.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    /// Open a section, creating it if it does not exist yet.
    ///
    /// A repeated header reuses the existing section rather than
    /// replacing it.
    pub fn open_section(&mut self, name: String) -> &mut Section {
        self.sections.entry(name).or_default()
    }

    /// Insert a fully-built section, replacing any existing one.
    pub fn insert_section(&mut self, name: String, section: Section) {
        self.sections.insert(name, section);
    }

    /// Iterate sections in insertion order.
    pub fn sections(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.sections.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of sections.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Whether the document holds no sections at all.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Total number of fields across all sections.
    pub fn field_count(&self) -> usize {
        self.sections.values().map(Section::len).sum()
    }
}
