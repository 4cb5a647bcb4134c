//! Name validation for host registrations.

use crate::types::{Error, Result};

/// Validate that a string is not empty.
pub fn validate_non_empty(s: &str, field: &str) -> Result<()> {
    if s.trim().is_empty() {
        return Err(Error::validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// Validate a registration name: non-empty and free of whitespace.
pub fn validate_name(s: &str, field: &str) -> Result<()> {
    validate_non_empty(s, field)?;
    if s.chars().any(char::is_whitespace) {
        return Err(Error::validation(format!(
            "{} cannot contain whitespace: '{}'",
            field, s
        )));
    }
    Ok(())
}
