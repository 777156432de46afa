//! Local field validation
//!
//! Forms derive `validator::Validate`; this module provides the custom
//! rules they share and flattens `ValidationErrors` into one message per
//! field for display next to the offending input.

use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use validator::{ValidationError, ValidationErrors};

/// Required length of a phone number (digits only)
pub const PHONE_DIGITS: usize = 10;

/// Field name → first error message for that field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error; the first message recorded for a field wins
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = FieldErrors::new();
        for (field, errs) in errors.field_errors() {
            if let Some(err) = errs.first() {
                out.add(field.to_string(), describe(err));
            }
        }
        out
    }
}

/// Human-readable message for a validation error
fn describe(err: &ValidationError) -> String {
    if let Some(message) = &err.message {
        return message.to_string();
    }
    match err.code.as_ref() {
        "email" => "Enter a valid email address".to_string(),
        "length" => "Value has the wrong length".to_string(),
        "range" => "Value is out of range".to_string(),
        other => format!("Invalid value ({})", other),
    }
}

fn error_with_message(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

/// Required text: non-empty after trimming
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(error_with_message("required", "This field is required"));
    }
    Ok(())
}

/// Phone numbers are exactly ten ASCII digits
///
/// # Examples
///
/// ```
/// use festreg_common::validation::validate_phone;
///
/// assert!(validate_phone("9876543210").is_ok());
/// assert!(validate_phone("98765 43210").is_err());
/// assert!(validate_phone("12345").is_err());
/// ```
pub fn validate_phone(value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    if value.len() != PHONE_DIGITS || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(error_with_message(
            "phone",
            "Phone number must be exactly 10 digits",
        ));
    }
    Ok(())
}
