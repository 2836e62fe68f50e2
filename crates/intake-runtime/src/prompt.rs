//! Prompt construction from a configured template.

use crate::config::ConfigError;

/// Placeholder token substituted with the input text.
pub const INPUT_PLACEHOLDER: &str = "{{input_text}}";

/// A prompt template with a single input placeholder.
///
/// The template is checked for the placeholder at construction so a
/// misconfigured template fails at startup, not per request.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Create a template, verifying it contains [`INPUT_PLACEHOLDER`].
    pub fn new(template: impl Into<String>) -> Result<Self, ConfigError> {
        let template = template.into();
        if !template.contains(INPUT_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder);
        }
        Ok(Self { template })
    }

    /// Render the prompt for the given input text.
    ///
    /// Pure substitution: no validation, no side effects. Callers
    /// guarantee the input is non-empty.
    pub fn render(&self, input_text: &str) -> String {
        self.template.replace(INPUT_PLACEHOLDER, input_text)
    }
}
