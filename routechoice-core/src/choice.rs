//! Choice tokens and validation of choice-log requests.
//!
//! Token format: `<timeToSubmitMs>-<flag>`, e.g. `1500-0` for a participant who
//! kept the default route after 1.5 seconds, `820-1` for one who took an
//! alternative.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::constants::{
    CHOICE_FLAG_ALTERNATIVE, CHOICE_FLAG_DEFAULT, DEFAULT_CHOICE_LABEL, MAX_SCENARIO_INDEX,
};

/// One encoded scenario decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ChoiceToken {
    pub time_to_submit_ms: u64,
    /// `true` when the participant did not keep the default route.
    pub chosen: bool,
}

impl ChoiceToken {
    #[must_use]
    pub const fn new(time_to_submit_ms: u64, chosen: bool) -> Self {
        Self {
            time_to_submit_ms,
            chosen,
        }
    }

    /// Token for a submitted choice label.
    #[must_use]
    pub fn from_label(time_to_submit_ms: u64, choice_label: &str) -> Self {
        Self::new(time_to_submit_ms, !is_default_label(choice_label))
    }
}

/// Whether a submitted label means "kept the default route".
#[must_use]
pub fn is_default_label(choice_label: &str) -> bool {
    choice_label.trim().eq_ignore_ascii_case(DEFAULT_CHOICE_LABEL)
}

impl fmt::Display for ChoiceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = if self.chosen {
            CHOICE_FLAG_ALTERNATIVE
        } else {
            CHOICE_FLAG_DEFAULT
        };
        write!(f, "{}-{flag}", self.time_to_submit_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed choice token `{0}`")]
pub struct ChoiceTokenError(pub String);

impl FromStr for ChoiceToken {
    type Err = ChoiceTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ChoiceTokenError(s.to_string());
        let (time, flag) = s.rsplit_once('-').ok_or_else(malformed)?;
        let time_to_submit_ms = time.parse().map_err(|_| malformed())?;
        let chosen = match flag.chars().collect::<Vec<_>>().as_slice() {
            [c] if *c == CHOICE_FLAG_DEFAULT => false,
            [c] if *c == CHOICE_FLAG_ALTERNATIVE => true,
            _ => return Err(malformed()),
        };
        Ok(Self::new(time_to_submit_ms, chosen))
    }
}

impl From<ChoiceToken> for String {
    fn from(token: ChoiceToken) -> Self {
        token.to_string()
    }
}

impl TryFrom<String> for ChoiceToken {
    type Error = ChoiceTokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Reasons a choice-log request is rejected before touching any session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChoiceError {
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("missing field `{0}`")]
    Missing(&'static str),
    #[error("field `{field}` must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

/// A validated choice-log request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceRequest {
    pub session_id: String,
    pub scenario_index: usize,
    pub choice: String,
    pub time_to_submit_ms: u64,
    pub default_time: f64,
}

impl ChoiceRequest {
    /// Validate a raw `{ sessionId, scenarioIndex, choice, tts, defaultTime }` body.
    ///
    /// `tts` is the time to submit in milliseconds; fractional values are
    /// rounded to the nearest millisecond.
    ///
    /// # Errors
    ///
    /// Returns [`ChoiceError`] naming the first field that is absent or has the
    /// wrong primitive type.
    pub fn from_value(body: &Value) -> Result<Self, ChoiceError> {
        let object = body.as_object().ok_or(ChoiceError::NotAnObject)?;
        let field = |name: &'static str| object.get(name).filter(|v| !v.is_null());

        let session_id = field("sessionId")
            .ok_or(ChoiceError::Missing("sessionId"))?
            .as_str()
            .filter(|id| !id.trim().is_empty())
            .ok_or(ChoiceError::WrongType {
                field: "sessionId",
                expected: "a non-empty string",
            })?
            .to_string();

        let scenario_index = field("scenarioIndex")
            .ok_or(ChoiceError::Missing("scenarioIndex"))?
            .as_u64()
            .and_then(|index| usize::try_from(index).ok())
            .filter(|index| *index <= MAX_SCENARIO_INDEX)
            .ok_or(ChoiceError::WrongType {
                field: "scenarioIndex",
                expected: "an integer from 0 to 1023",
            })?;

        let choice = field("choice")
            .ok_or(ChoiceError::Missing("choice"))?
            .as_str()
            .ok_or(ChoiceError::WrongType {
                field: "choice",
                expected: "a string",
            })?
            .to_string();

        let tts = non_negative(field("tts").ok_or(ChoiceError::Missing("tts"))?).ok_or(
            ChoiceError::WrongType {
                field: "tts",
                expected: "a non-negative number",
            },
        )?;

        let default_time = non_negative(
            field("defaultTime").ok_or(ChoiceError::Missing("defaultTime"))?,
        )
        .ok_or(ChoiceError::WrongType {
            field: "defaultTime",
            expected: "a non-negative number",
        })?;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let time_to_submit_ms = tts.round() as u64;

        Ok(Self {
            session_id,
            scenario_index,
            choice,
            time_to_submit_ms,
            default_time,
        })
    }

    #[must_use]
    pub fn token(&self) -> ChoiceToken {
        ChoiceToken::from_label(self.time_to_submit_ms, &self.choice)
    }
}

fn non_negative(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .filter(|number| number.is_finite() && *number >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tokens_round_trip() {
        for time in [0_u64, 1, 1_500, 999_999] {
            for chosen in [true, false] {
                let token = ChoiceToken::new(time, chosen);
                let decoded: ChoiceToken = token.to_string().parse().unwrap();
                assert_eq!(decoded, token);
            }
        }
    }

    #[test]
    fn token_wire_format() {
        assert_eq!(ChoiceToken::from_label(1500, "default").to_string(), "1500-0");
        assert_eq!(ChoiceToken::from_label(820, "alternative_1").to_string(), "820-1");
        assert_eq!(
            serde_json::to_value(ChoiceToken::new(3, true)).unwrap(),
            json!("3-1")
        );
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for raw in ["", "12", "12-", "-1", "12-2", "abc-0", "12-01"] {
            assert!(raw.parse::<ChoiceToken>().is_err(), "{raw} should not parse");
        }
    }

    #[test]
    fn request_validation_names_the_field() {
        let valid = json!({
            "sessionId": "abc",
            "scenarioIndex": 2,
            "choice": "default",
            "tts": 1234.6,
            "defaultTime": 20
        });
        let request = ChoiceRequest::from_value(&valid).unwrap();
        assert_eq!(request.scenario_index, 2);
        assert_eq!(request.time_to_submit_ms, 1235);
        assert_eq!(request.token().to_string(), "1235-0");

        let mut missing = valid.clone();
        missing.as_object_mut().unwrap().remove("tts");
        assert_eq!(
            ChoiceRequest::from_value(&missing),
            Err(ChoiceError::Missing("tts"))
        );

        let mut negative = valid.clone();
        negative["scenarioIndex"] = json!(-1);
        assert!(matches!(
            ChoiceRequest::from_value(&negative),
            Err(ChoiceError::WrongType {
                field: "scenarioIndex",
                ..
            })
        ));

        let mut huge = valid.clone();
        huge["scenarioIndex"] = json!(MAX_SCENARIO_INDEX + 1);
        assert!(ChoiceRequest::from_value(&huge).is_err());

        let mut wrong = valid;
        wrong["choice"] = json!(3);
        assert!(matches!(
            ChoiceRequest::from_value(&wrong),
            Err(ChoiceError::WrongType {
                field: "choice",
                ..
            })
        ));

        assert_eq!(
            ChoiceRequest::from_value(&json!([1, 2])),
            Err(ChoiceError::NotAnObject)
        );
    }
}
