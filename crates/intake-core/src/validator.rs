//! Per-field validation of parsed documents.
//!
//! Validation rules come from configuration as a map of
//! `<field>_pattern` keys to regex strings (phone, email and date
//! patterns by convention, but the validator is generic over whatever
//! keys are configured). Patterns are compiled once, anchored at the
//! start of the value.

use std::collections::BTreeMap;
use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

use crate::document::{ParsedDocument, Section};
use crate::parser::ParseMode;

/// Literal sentinel meaning "no value supplied"; always accepted.
pub const NOT_AVAILABLE: &str = "N/A";

/// Suffix appended to a value that fails its pattern in lenient mode.
pub const INVALID_ANNOTATION: &str = " (Invalid Format)";

/// Suffix a configuration key must carry to be treated as a rule.
const PATTERN_SUFFIX: &str = "_pattern";

/// A value repeated more than this many times across a document flags
/// the output as degenerate.
pub const REPEAT_THRESHOLD: usize = 3;

/// Errors raised while compiling validation rules.
#[derive(Error, Debug)]
pub enum RuleError {
    /// A configured pattern is not a valid regex.
    #[error("invalid validation pattern for '{key}': {source}")]
    InvalidPattern {
        key: String,
        #[source]
        source: Box<regex::Error>,
    },
}

/// Errors raised while validating a document in strict mode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A field value did not match its configured pattern.
    #[error("validation failed for field '{field}' in section '{section}': value '{value}'")]
    PatternMismatch {
        section: String,
        field: String,
        value: String,
    },
}

/// Compiled per-field validation patterns.
///
/// Built from configuration once at startup so regex errors surface as
/// a fatal config problem rather than mid-parse.
#[derive(Debug, Default)]
pub struct ValidationRules {
    patterns: BTreeMap<String, Regex>,
}

impl ValidationRules {
    /// Compile rules from a raw `<field>_pattern` -> regex string map.
    ///
    /// Keys without the `_pattern` suffix are skipped with a warning.
    /// Patterns are anchored at the start of the value, matching the
    /// match-from-beginning convention the patterns were written for.
    pub fn compile(raw: &BTreeMap<String, String>) -> Result<Self, RuleError> {
        let mut patterns = BTreeMap::new();
        for (key, pattern) in raw {
            let Some(field) = key.strip_suffix(PATTERN_SUFFIX) else {
                tracing::warn!(key, "ignoring validation entry without '_pattern' suffix");
                continue;
            };
            let anchored = format!("^(?:{pattern})");
            let compiled = Regex::new(&anchored).map_err(|source| RuleError::InvalidPattern {
                key: key.clone(),
                source: Box::new(source),
            })?;
            patterns.insert(field.to_string(), compiled);
        }
        Ok(Self { patterns })
    }

    /// Look up the compiled pattern for a field key.
    pub fn pattern_for(&self, field: &str) -> Option<&Regex> {
        self.patterns.get(field)
    }

    /// Number of compiled rules.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether any rules are configured.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Applies validation rules to a parsed document.
#[derive(Debug, Clone, Copy)]
pub struct FieldValidator<'r> {
    rules: &'r ValidationRules,
    mode: ParseMode,
}

impl<'r> FieldValidator<'r> {
    /// Create a validator over compiled rules.
    pub fn new(rules: &'r ValidationRules, mode: ParseMode) -> Self {
        Self { rules, mode }
    }

    /// Validate every field, consuming the document and returning the
    /// validated one.
    ///
    /// Fields whose key has no configured pattern, or whose value is
    /// the `"N/A"` sentinel, pass through untouched. A mismatch fails
    /// the whole call in strict mode and annotates the value with
    /// ` (Invalid Format)` in lenient mode. Repetition detection runs
    /// afterwards and is advisory only.
    pub fn validate(&self, document: ParsedDocument) -> Result<ParsedDocument, ValidationError> {
        let mut validated = ParsedDocument::new();

        for (section_name, fields) in document.sections() {
            let mut section = Section::new();
            for (key, value) in fields.iter() {
                let checked = match self.rules.pattern_for(key) {
                    Some(pattern) if value != NOT_AVAILABLE => {
                        if pattern.is_match(value) {
                            value.to_string()
                        } else {
                            tracing::warn!(
                                section = %section_name,
                                field = %key,
                                value,
                                pattern = %pattern.as_str(),
                                "field failed validation"
                            );
                            if self.mode.is_strict() {
                                return Err(ValidationError::PatternMismatch {
                                    section: section_name.to_string(),
                                    field: key.to_string(),
                                    value: value.to_string(),
                                });
                            }
                            format!("{value}{INVALID_ANNOTATION}")
                        }
                    }
                    _ => value.to_string(),
                };
                section.insert(key.to_string(), checked);
            }
            validated.insert_section(section_name.to_string(), section);
        }

        let repeated = detect_repeated_values(&validated);
        if !repeated.is_empty() {
            tracing::warn!(values = ?repeated, "repeated output patterns detected");
        }

        Ok(validated)
    }
}

/// Values that appear more than [`REPEAT_THRESHOLD`] times across the
/// whole document.
///
/// Advisory only: repeated output hints at a degenerate completion but
/// never fails validation in either mode.
pub fn detect_repeated_values(document: &ParsedDocument) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for (_, section) in document.sections() {
        for (_, value) in section.iter() {
            *counts.entry(value).or_insert(0) += 1;
        }
    }

    let mut repeated: Vec<String> = counts
        .into_iter()
        .filter(|(_, count)| *count > REPEAT_THRESHOLD)
        .map(|(value, _)| value.to_string())
        .collect();
    repeated.sort();
    repeated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseMode, ResponseParser};

    fn rules(entries: &[(&str, &str)]) -> ValidationRules {
        let raw: BTreeMap<String, String> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ValidationRules::compile(&raw).unwrap()
    }

    fn doc_with(section: &str, fields: &[(&str, &str)]) -> ParsedDocument {
        let mut doc = ParsedDocument::new();
        let s = doc.open_section(section.to_string());
        for (k, v) in fields {
            s.insert(k.to_string(), v.to_string());
        }
        doc
    }

    #[test]
    fn test_matching_value_passes_unchanged() {
        let rules = rules(&[("phone_pattern", r"\d{3}-\d{3}-\d{4}")]);
        let doc = doc_with("insured", &[("phone", "555-867-5309")]);

        let validated = FieldValidator::new(&rules, ParseMode::Strict)
            .validate(doc)
            .unwrap();
        assert_eq!(
            validated.section("insured").unwrap().get("phone"),
            Some("555-867-5309")
        );
    }

    #[test]
    fn test_mismatch_annotated_in_lenient_mode() {
        let rules = rules(&[("phone_pattern", r"\d{3}-\d{3}-\d{4}")]);
        let doc = doc_with("insured", &[("phone", "notaphone")]);

        let validated = FieldValidator::new(&rules, ParseMode::Lenient)
            .validate(doc)
            .unwrap();
        assert_eq!(
            validated.section("insured").unwrap().get("phone"),
            Some("notaphone (Invalid Format)")
        );
    }

    #[test]
    fn test_mismatch_fails_in_strict_mode() {
        let rules = rules(&[("phone_pattern", r"\d{3}-\d{3}-\d{4}")]);
        let doc = doc_with("insured", &[("phone", "notaphone")]);

        let err = FieldValidator::new(&rules, ParseMode::Strict)
            .validate(doc)
            .unwrap_err();
        assert!(matches!(err, ValidationError::PatternMismatch { field, .. } if field == "phone"));
    }

    #[test]
    fn test_not_available_sentinel_always_accepted() {
        let rules = rules(&[("phone_pattern", r"\d{3}-\d{3}-\d{4}")]);
        let doc = doc_with("insured", &[("phone", "N/A")]);

        let validated = FieldValidator::new(&rules, ParseMode::Strict)
            .validate(doc)
            .unwrap();
        assert_eq!(validated.section("insured").unwrap().get("phone"), Some("N/A"));
    }

    #[test]
    fn test_unconfigured_field_passes_through() {
        let rules = rules(&[("phone_pattern", r"\d{3}-\d{3}-\d{4}")]);
        let doc = doc_with("insured", &[("name", "John Carver")]);

        let validated = FieldValidator::new(&rules, ParseMode::Strict)
            .validate(doc)
            .unwrap();
        assert_eq!(
            validated.section("insured").unwrap().get("name"),
            Some("John Carver")
        );
    }

    #[test]
    fn test_pattern_anchored_at_start() {
        // "abc123" contains digits but does not start with them.
        let rules = rules(&[("code_pattern", r"\d{3}")]);
        let doc = doc_with("claim_info", &[("code", "abc123")]);

        let validated = FieldValidator::new(&rules, ParseMode::Lenient)
            .validate(doc)
            .unwrap();
        assert_eq!(
            validated.section("claim_info").unwrap().get("code"),
            Some("abc123 (Invalid Format)")
        );
    }

    #[test]
    fn test_prefix_match_is_sufficient() {
        // re.match semantics: a match at the start passes even if the
        // value has a trailing remainder.
        let rules = rules(&[("date_pattern", r"\d{4}-\d{2}-\d{2}")]);
        let doc = doc_with("loss_details", &[("date", "2024-03-01 10:45")]);

        let validated = FieldValidator::new(&rules, ParseMode::Strict)
            .validate(doc)
            .unwrap();
        assert_eq!(
            validated.section("loss_details").unwrap().get("date"),
            Some("2024-03-01 10:45")
        );
    }

    #[test]
    fn test_invalid_pattern_is_a_rule_error() {
        let mut raw = BTreeMap::new();
        raw.insert("phone_pattern".to_string(), "(unclosed".to_string());
        let err = ValidationRules::compile(&raw).unwrap_err();
        assert!(matches!(err, RuleError::InvalidPattern { key, .. } if key == "phone_pattern"));
    }

    #[test]
    fn test_entry_without_suffix_is_skipped() {
        let mut raw = BTreeMap::new();
        raw.insert("phone".to_string(), r"\d+".to_string());
        let rules = ValidationRules::compile(&raw).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_repeated_values_flagged_past_threshold() {
        let doc = doc_with(
            "claim_info",
            &[
                ("a", "same"),
                ("b", "same"),
                ("c", "same"),
                ("d", "same"),
                ("e", "different"),
            ],
        );
        assert_eq!(detect_repeated_values(&doc), vec!["same".to_string()]);
    }

    #[test]
    fn test_repetition_at_threshold_is_not_flagged() {
        let doc = doc_with("claim_info", &[("a", "same"), ("b", "same"), ("c", "same")]);
        assert!(detect_repeated_values(&doc).is_empty());
    }

    #[test]
    fn test_repetition_counts_across_sections() {
        let mut doc = doc_with("one", &[("a", "same"), ("b", "same")]);
        let s = doc.open_section("two".to_string());
        s.insert("c".to_string(), "same".to_string());
        s.insert("d".to_string(), "same".to_string());

        assert_eq!(detect_repeated_values(&doc), vec!["same".to_string()]);
    }

    #[test]
    fn test_repetition_never_fails_validation() {
        let rules = ValidationRules::default();
        let doc = doc_with(
            "claim_info",
            &[("a", "same"), ("b", "same"), ("c", "same"), ("d", "same")],
        );
        let result = FieldValidator::new(&rules, ParseMode::Strict).validate(doc);
        assert!(result.is_ok());
    }

    #[test]
    fn test_parse_then_validate_pipeline() {
        let text = "**Insured**\n- Phone: 555-867-5309\n- Email: nobody\n";
        let doc = ResponseParser::new(ParseMode::Lenient).parse(text).unwrap();

        let rules = rules(&[
            ("phone_pattern", r"\d{3}-\d{3}-\d{4}"),
            ("email_pattern", r"[^@\s]+@[^@\s]+\.[a-z]{2,}"),
        ]);
        let validated = FieldValidator::new(&rules, ParseMode::Lenient)
            .validate(doc)
            .unwrap();

        let section = validated.section("insured").unwrap();
        assert_eq!(section.get("phone"), Some("555-867-5309"));
        assert_eq!(section.get("email"), Some("nobody (Invalid Format)"));
    }
}
