// ABOUTME: Validation of environment-provided settings
// ABOUTME: Typed checks for integers, floats and URLs

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid integer value for {0}: {1}. {2}")]
    InvalidInteger(String, String, String),

    #[error("Invalid number value for {0}: {1}. {2}")]
    InvalidNumber(String, String, String),

    #[error("Invalid value for {0}: {1}. Must be one of: {2}")]
    InvalidEnum(String, String, String),

    #[error("Invalid URL for {0}: {1}")]
    InvalidUrl(String, String),

    #[error("Value for {0} cannot be empty")]
    EmptyValue(String),
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Parse an integer setting with optional bounds
pub fn validate_integer(key: &str, value: &str, min: Option<u64>, max: Option<u64>) -> Result<u64> {
    let parsed = value.trim().parse::<u64>().map_err(|_| {
        ValidationError::InvalidInteger(
            key.to_string(),
            value.to_string(),
            "Not a valid integer".to_string(),
        )
    })?;

    if let Some(min_val) = min {
        if parsed < min_val {
            return Err(ValidationError::InvalidInteger(
                key.to_string(),
                value.to_string(),
                format!("Must be >= {}", min_val),
            ));
        }
    }

    if let Some(max_val) = max {
        if parsed > max_val {
            return Err(ValidationError::InvalidInteger(
                key.to_string(),
                value.to_string(),
                format!("Must be <= {}", max_val),
            ));
        }
    }

    Ok(parsed)
}

/// Parse a float setting within an inclusive range
pub fn validate_float(key: &str, value: &str, min: f32, max: f32) -> Result<f32> {
    let parsed = value.trim().parse::<f32>().map_err(|_| {
        ValidationError::InvalidNumber(
            key.to_string(),
            value.to_string(),
            "Not a valid number".to_string(),
        )
    })?;

    if !(min..=max).contains(&parsed) {
        return Err(ValidationError::InvalidNumber(
            key.to_string(),
            value.to_string(),
            format!("Must be between {} and {}", min, max),
        ));
    }

    Ok(parsed)
}

/// Basic URL check: scheme and no whitespace
pub fn validate_url(key: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyValue(key.to_string()));
    }

    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ValidationError::InvalidUrl(
            key.to_string(),
            "URL must start with http:// or https://".to_string(),
        ));
    }

    if value.contains(char::is_whitespace) {
        return Err(ValidationError::InvalidUrl(
            key.to_string(),
            "URL cannot contain spaces".to_string(),
        ));
    }

    Ok(())
}
