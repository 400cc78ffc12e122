//! Survey field definitions and response normalization.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Input widget a survey field is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurveyFieldKind {
    #[default]
    Text,
    Textarea,
    Number,
    Select,
    Radio,
    Multiselect,
    /// Anything newer than this build knows about; passed through untouched.
    #[serde(other)]
    Other,
}

impl SurveyFieldKind {
    /// Kinds that offer a fixed list of options.
    #[must_use]
    pub const fn has_options(self) -> bool {
        matches!(self, Self::Select | Self::Radio | Self::Multiselect)
    }
}

/// One configured survey question.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SurveyField {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: SurveyFieldKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurveyError {
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("`sessionId` must be a non-empty string")]
    InvalidSessionId,
    #[error("`responses` must be a JSON object")]
    InvalidResponses,
}

/// A validated survey submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyRequest {
    pub session_id: String,
    pub responses: Map<String, Value>,
}

impl SurveyRequest {
    /// Validate a raw `{ sessionId, responses }` body.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError`] when the session id is missing or blank, or the
    /// responses are not a non-array object.
    pub fn from_value(body: &Value) -> Result<Self, SurveyError> {
        let object = body.as_object().ok_or(SurveyError::NotAnObject)?;
        let session_id = object
            .get("sessionId")
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
            .ok_or(SurveyError::InvalidSessionId)?
            .to_string();
        let responses = object
            .get("responses")
            .and_then(Value::as_object)
            .ok_or(SurveyError::InvalidResponses)?
            .clone();
        Ok(Self {
            session_id,
            responses,
        })
    }
}

/// Coerce a multiselect answer into a deduplicated list of trimmed strings.
///
/// Arrays keep their string elements, mappings contribute the keys of truthy
/// entries (or the string value itself), and a lone string becomes a
/// one-element list. Any other shape yields an empty list.
#[must_use]
pub fn normalize_multiselect(value: &Value) -> Vec<String> {
    let candidates: Vec<&str> = match value {
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        Value::Object(entries) => entries
            .iter()
            .filter_map(|(key, value)| match value {
                Value::String(text) => Some(text.as_str()),
                other if is_truthy(other) => Some(key.as_str()),
                _ => None,
            })
            .collect(),
        Value::String(text) => vec![text.as_str()],
        _ => Vec::new(),
    };

    let mut normalized: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let trimmed = candidate.trim();
        if !trimmed.is_empty() && !normalized.iter().any(|seen| seen == trimmed) {
            normalized.push(trimmed.to_string());
        }
    }
    normalized
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Normalize every multiselect answer; other answers pass through unchanged.
///
/// A configured multiselect field with no submitted answer is left absent.
#[must_use]
pub fn normalize_responses(
    fields: &[SurveyField],
    responses: &Map<String, Value>,
) -> Map<String, Value> {
    let mut normalized = responses.clone();
    for field in fields
        .iter()
        .filter(|field| field.kind == SurveyFieldKind::Multiselect)
    {
        if let Some(answer) = normalized.get_mut(&field.name) {
            let values = normalize_multiselect(answer);
            *answer = Value::Array(values.into_iter().map(Value::String).collect());
        }
    }
    normalized
}
