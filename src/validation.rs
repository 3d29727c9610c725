//! Validation of the incoming generation request.
//!
//! The body is accepted as an untyped `serde_json::Value` so each rule can
//! report its own message; checks run in a fixed order and the first
//! failure wins.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_NAME_LENGTH: usize = 50;
pub const MAX_TOPIC_LENGTH: usize = 1000;
pub const MIN_AGE: u8 = 1;
pub const MAX_AGE: u8 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Boy,
    Girl,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Boy => "boy",
            Gender::Girl => "girl",
        }
    }
}

/// A request that passed every rule.  Only [`validate`] constructs one, so
/// holders can rely on the bounds below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    name: String,
    age: u8,
    gender: Gender,
    topic: String,
    model: String,
}

impl GenerationRequest {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn age(&self) -> u8 {
        self.age
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid request body")]
    InvalidBody,
    #[error("Name is required and must be a non-empty string")]
    NameMissing,
    #[error("Name must be less than 50 characters")]
    NameTooLong,
    #[error("Age must be between 1 and 99")]
    AgeOutOfRange,
    #[error("Gender must be \"boy\" or \"girl\"")]
    InvalidGender,
    #[error("Topic is required and must be a non-empty string")]
    TopicMissing,
    #[error("Topic must be less than 1000 characters")]
    TopicTooLong,
}

/// Check `raw` against the request rules and return the normalized request.
///
/// `name` and `topic` are trimmed; `model` falls back to `default_model`
/// when absent, empty or not a string.  Length limits apply to the value as
/// sent, before trimming.
pub fn validate(raw: &Value, default_model: &str) -> Result<GenerationRequest, ValidationError> {
    let body = raw.as_object().ok_or(ValidationError::InvalidBody)?;

    let name = required_text(
        body.get("name"),
        MAX_NAME_LENGTH,
        ValidationError::NameMissing,
        ValidationError::NameTooLong,
    )?;
    let age = parse_age(body.get("age"))?;
    let gender = match body.get("gender").and_then(Value::as_str) {
        Some("boy") => Gender::Boy,
        Some("girl") => Gender::Girl,
        _ => return Err(ValidationError::InvalidGender),
    };
    let topic = required_text(
        body.get("topic"),
        MAX_TOPIC_LENGTH,
        ValidationError::TopicMissing,
        ValidationError::TopicTooLong,
    )?;
    let model = body
        .get("model")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or(default_model)
        .to_string();

    Ok(GenerationRequest {
        name,
        age,
        gender,
        topic,
        model,
    })
}

fn required_text(
    value: Option<&Value>,
    max_chars: usize,
    missing: ValidationError,
    too_long: ValidationError,
) -> Result<String, ValidationError> {
    let text = value.and_then(Value::as_str).ok_or(missing.clone())?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(missing);
    }
    if text.chars().count() > max_chars {
        return Err(too_long);
    }
    Ok(trimmed.to_string())
}

fn parse_age(value: Option<&Value>) -> Result<u8, ValidationError> {
    let age = value
        .and_then(Value::as_f64)
        .ok_or(ValidationError::AgeOutOfRange)?;
    if age.fract() != 0.0 || age < f64::from(MIN_AGE) || age > f64::from(MAX_AGE) {
        return Err(ValidationError::AgeOutOfRange);
    }
    Ok(age as u8)
}
