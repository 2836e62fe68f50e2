//! # intake-core
//!
//! Deterministic structured field extraction from LLM completions.
//!
//! This crate turns free-form completion text into a validated
//! section/field document. It is the synchronous half of the intake
//! engine, answering:
//! - What sections and fields did the backend emit?
//! - Do the field values match their configured formats?
//! - Is the output degenerate (looping or repeating itself)?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: same completion text always parses to the
//!    same document
//! 2. **No I/O**: parsing and validation never touch the network or
//!    filesystem; backend calls live in `intake-runtime`
//! 3. **Total in lenient mode**: arbitrary text parses to *some*
//!    document; problems become annotations, not errors
//!
//! ## Example
//!
//! ```rust
//! use intake_core::{FieldValidator, ParseMode, ResponseParser, ValidationRules};
//! use std::collections::BTreeMap;
//!
//! let completion = "**Claim Info**\n- Policy Number: ABC123\n";
//! let document = ResponseParser::new(ParseMode::Lenient)
//!     .parse(completion)
//!     .unwrap();
//!
//! let mut raw = BTreeMap::new();
//! raw.insert("policy_number_pattern".to_string(), r"[A-Z]{3}\d+".to_string());
//! let rules = ValidationRules::compile(&raw).unwrap();
//!
//! let validated = FieldValidator::new(&rules, ParseMode::Lenient)
//!     .validate(document)
//!     .unwrap();
//! assert_eq!(
//!     validated.section("claim_info").unwrap().get("policy_number"),
//!     Some("ABC123")
//! );
//! ```

pub mod document;
pub mod parser;
pub mod validator;

// Re-export main types at crate root
pub use document::{normalize_key, ParsedDocument, Section};
pub use parser::{ParseError, ParseMode, ResponseParser, LOOP_ANNOTATION};
pub use validator::{
    detect_repeated_values, FieldValidator, RuleError, ValidationError, ValidationRules,
    INVALID_ANNOTATION, NOT_AVAILABLE, REPEAT_THRESHOLD,
};
