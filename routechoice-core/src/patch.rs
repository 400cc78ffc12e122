//! Validation of admin configuration patches and their mapping onto documents.
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;

use crate::config::{InstructionStep, PartialConfig, SubConfig};
use crate::geo::LatLng;
use crate::pool::ValuePool;
use crate::scenario::{ScenarioPool, ScenarioPoolEntry, Settings};
use crate::survey::SurveyField;

/// Which admin write produced the patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    /// `POST`: any of scenarios, settings, survey, consentText, scenarioText, instructions.
    Full,
    /// `PATCH`: only scenarios, settings and survey.
    Partial,
}

impl PatchKind {
    const fn allowed_fields(self) -> &'static [&'static str] {
        match self {
            Self::Full => &[
                "scenarios",
                "settings",
                "survey",
                "consentText",
                "scenarioText",
                "instructions",
            ],
            Self::Partial => &["scenarios", "settings", "survey"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigPatchError {
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("request body contains no configuration fields")]
    Empty,
    #[error("unsupported field `{0}`")]
    UnknownField(String),
    #[error("invalid `{path}`: {reason}")]
    Invalid { path: String, reason: String },
}

impl ConfigPatchError {
    fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A validated admin patch, fields already in canonical JSON form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigPatch {
    pub scenarios: Option<Value>,
    pub settings: Option<Value>,
    pub survey: Option<Value>,
    pub consent_text: Option<Value>,
    pub scenario_text: Option<Value>,
    pub instructions: Option<Value>,
}

impl ConfigPatch {
    /// Validate a raw admin body.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigPatchError`] for non-object bodies, fields the write kind
    /// does not accept, and any value that violates configuration invariants.
    pub fn parse(body: &Value, kind: PatchKind) -> Result<Self, ConfigPatchError> {
        let object = body.as_object().ok_or(ConfigPatchError::NotAnObject)?;
        if let Some(unknown) = object
            .keys()
            .find(|key| !kind.allowed_fields().contains(&key.as_str()))
        {
            return Err(ConfigPatchError::UnknownField(unknown.clone()));
        }
        if object.is_empty() {
            return Err(ConfigPatchError::Empty);
        }

        let mut patch = Self::default();
        if let Some(raw) = object.get("scenarios") {
            let pool: ScenarioPool = typed("scenarios", raw)?;
            validate_pool(&pool)?;
            patch.scenarios = Some(canonical("scenarios", &pool)?);
        }
        if let Some(raw) = object.get("settings") {
            let settings: Settings = typed("settings", raw)?;
            if settings.number_of_scenarios == 0 {
                return Err(ConfigPatchError::invalid(
                    "settings.number_of_scenarios",
                    "must be at least 1",
                ));
            }
            patch.settings = Some(canonical("settings", &settings)?);
        }
        if let Some(raw) = object.get("survey") {
            let fields: Vec<SurveyField> = typed("survey", unwrap_list(raw, "survey"))?;
            validate_survey(&fields)?;
            patch.survey = Some(canonical("survey", &fields)?);
        }
        if let Some(raw) = object.get("consentText") {
            if !raw.is_string() {
                return Err(ConfigPatchError::invalid("consentText", "must be a string"));
            }
            patch.consent_text = Some(raw.clone());
        }
        if let Some(raw) = object.get("scenarioText") {
            if !raw.is_object() {
                return Err(ConfigPatchError::invalid("scenarioText", "must be an object"));
            }
            patch.scenario_text = Some(raw.clone());
        }
        if let Some(raw) = object.get("instructions") {
            let steps: Vec<InstructionStep> = typed("instructions", unwrap_list(raw, "steps"))?;
            patch.instructions = Some(canonical("instructions", &steps)?);
        }
        Ok(patch)
    }

    /// Documents touched by this patch, each shallow-updated from its persisted form.
    #[must_use]
    pub fn apply(&self, persisted: &PartialConfig) -> Vec<(SubConfig, Value)> {
        let updates: [(SubConfig, &[(&str, &Option<Value>)]); 4] = [
            (
                SubConfig::Scenarios,
                &[("settings", &self.settings), ("scenarios", &self.scenarios)],
            ),
            (
                SubConfig::Texts,
                &[
                    ("consentText", &self.consent_text),
                    ("scenarioText", &self.scenario_text),
                ],
            ),
            (SubConfig::Instructions, &[("steps", &self.instructions)]),
            (SubConfig::Survey, &[("survey", &self.survey)]),
        ];

        updates
            .into_iter()
            .filter(|(_, fields)| fields.iter().any(|(_, value)| value.is_some()))
            .map(|(sub, fields)| {
                let mut document = match persisted.get(sub) {
                    Some(Value::Object(existing)) => existing.clone(),
                    _ => Map::new(),
                };
                for (key, value) in fields {
                    if let Some(value) = value {
                        document.insert((*key).to_string(), value.clone());
                    }
                }
                (sub, Value::Object(document))
            })
            .collect()
    }
}

fn typed<T: DeserializeOwned>(path: &str, raw: &Value) -> Result<T, ConfigPatchError> {
    serde_json::from_value(raw.clone())
        .map_err(|err| ConfigPatchError::invalid(path, err.to_string()))
}

fn canonical<T: Serialize>(path: &str, value: &T) -> Result<Value, ConfigPatchError> {
    serde_json::to_value(value).map_err(|err| ConfigPatchError::invalid(path, err.to_string()))
}

/// Accept either a bare list or an object wrapping it under `key`.
fn unwrap_list<'a>(raw: &'a Value, key: &str) -> &'a Value {
    match raw {
        Value::Object(object) => object.get(key).unwrap_or(raw),
        _ => raw,
    }
}

fn validate_pool(pool: &ScenarioPool) -> Result<(), ConfigPatchError> {
    for (key, entry) in pool.iter() {
        validate_entry(&format!("scenarios.{key}"), entry)?;
    }
    Ok(())
}

fn validate_entry(path: &str, entry: &ScenarioPoolEntry) -> Result<(), ConfigPatchError> {
    validate_points(&format!("{path}.start"), &entry.start)?;
    validate_points(&format!("{path}.end"), &entry.end)?;
    non_empty(&format!("{path}.default_route_time"), &entry.default_route_time)?;
    if entry.default_route_time.candidates().contains(&0) {
        return Err(ConfigPatchError::invalid(
            format!("{path}.default_route_time"),
            "route times must be positive",
        ));
    }
    for (name, field) in [
        ("scenario_name", &entry.scenario_name),
        ("value_name", &entry.value_name),
        ("description", &entry.description),
    ] {
        if let Some(pool) = field {
            non_empty(&format!("{path}.{name}"), pool)?;
        }
    }
    if entry.choice_list.is_empty() {
        return Err(ConfigPatchError::invalid(
            format!("{path}.choice_list"),
            "at least one alternative route is required",
        ));
    }
    for (index, alt) in entry.choice_list.iter().enumerate() {
        let alt_path = format!("{path}.choice_list[{index}]");
        validate_points(&format!("{alt_path}.middle_point"), &alt.middle_point)?;
        non_empty(&format!("{alt_path}.tts"), &alt.tts)?;
        for (name, field) in [("value_name", &alt.value_name), ("description", &alt.description)] {
            if let Some(pool) = field {
                non_empty(&format!("{alt_path}.{name}"), pool)?;
            }
        }
    }
    Ok(())
}

fn non_empty<T>(path: &str, pool: &ValuePool<T>) -> Result<(), ConfigPatchError> {
    if pool.is_empty() {
        return Err(ConfigPatchError::invalid(path, "pool must not be empty"));
    }
    Ok(())
}

fn validate_points(path: &str, pool: &ValuePool<LatLng>) -> Result<(), ConfigPatchError> {
    non_empty(path, pool)?;
    if let Some(bad) = pool.candidates().iter().find(|point| !point.is_valid()) {
        return Err(ConfigPatchError::invalid(
            path,
            format!("coordinate [{bad}] is out of range"),
        ));
    }
    Ok(())
}

fn validate_survey(fields: &[SurveyField]) -> Result<(), ConfigPatchError> {
    let mut seen = HashSet::new();
    for (index, field) in fields.iter().enumerate() {
        let name = field.name.trim();
        if name.is_empty() {
            return Err(ConfigPatchError::invalid(
                format!("survey[{index}].name"),
                "must not be empty",
            ));
        }
        if !seen.insert(name) {
            return Err(ConfigPatchError::invalid(
                format!("survey[{index}].name"),
                format!("duplicate field name `{name}`"),
            ));
        }
        if field.kind.has_options() && field.options.is_empty() {
            return Err(ConfigPatchError::invalid(
                format!("survey[{index}].options"),
                "choice fields need at least one option",
            ));
        }
    }
    Ok(())
}
