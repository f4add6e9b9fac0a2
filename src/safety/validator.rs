//! Input validation for inbound user messages.

use crate::error::FieldError;

/// Result of validating input.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Errors that block processing.
    pub errors: Vec<FieldError>,
    /// Warnings that don't block processing.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    /// Convert into a `Result`, dropping warnings.
    pub fn into_result(self) -> Result<(), Vec<FieldError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Validator for free-text input.
#[derive(Debug, Clone)]
pub struct Validator {
    /// Maximum input length in characters.
    max_chars: usize,
}

impl Validator {
    pub const DEFAULT_MAX_CHARS: usize = 4000;

    pub fn new() -> Self {
        Self {
            max_chars: Self::DEFAULT_MAX_CHARS,
        }
    }

    pub fn with_max_chars(mut self, max: usize) -> Self {
        self.max_chars = max;
        self
    }

    /// Validate `input`, attributing errors to `field`.
    pub fn validate(&self, field: &str, input: &str) -> ValidationResult {
        let mut result = ValidationResult::default();

        if input.trim().is_empty() {
            result.error(field, "must not be empty");
            return result;
        }

        let chars = input.chars().count();
        if chars > self.max_chars {
            result.error(
                field,
                format!("too long: {} characters (max {})", chars, self.max_chars),
            );
        }

        if input.contains('\0') {
            result.error(field, "contains null bytes");
        }

        if has_excessive_repetition(input) {
            result
                .warnings
                .push("input has excessive character repetition".to_string());
        }

        result
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// More than 20 identical characters in a row.
fn has_excessive_repetition(s: &str) -> bool {
    if s.len() < 50 {
        return false;
    }

    let mut prev = None;
    let mut run = 0usize;
    for c in s.chars() {
        if Some(c) == prev {
            run += 1;
            if run > 20 {
                return true;
            }
        } else {
            prev = Some(c);
            run = 1;
        }
    }
    false
}
