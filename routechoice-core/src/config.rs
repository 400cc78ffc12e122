//! Study configuration documents and the persisted-over-defaults merge.
//!
//! Four independent documents make up a study: scenarios, texts, instructions
//! and survey. Each persisted document is shallow-merged over its built-in
//! default, one level deep, so a persisted `scenarios` key replaces the default
//! map wholesale rather than patching individual scenarios.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::constants::{
    INSTRUCTIONS_CONFIG_KEY, SCENARIOS_CONFIG_KEY, SURVEY_CONFIG_KEY, TEXTS_CONFIG_KEY,
};
use crate::scenario::{ScenarioInstance, ScenariosConfig};
use crate::survey::SurveyField;

const BUILTIN_DEFAULTS: &str = include_str!("../assets/default_config.json");

/// One of the four independently persisted configuration documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubConfig {
    Scenarios,
    Texts,
    Instructions,
    Survey,
}

impl SubConfig {
    pub const ALL: [Self; 4] = [Self::Scenarios, Self::Texts, Self::Instructions, Self::Survey];

    /// Storage key the document lives under.
    #[must_use]
    pub const fn storage_key(self) -> &'static str {
        match self {
            Self::Scenarios => SCENARIOS_CONFIG_KEY,
            Self::Texts => TEXTS_CONFIG_KEY,
            Self::Instructions => INSTRUCTIONS_CONFIG_KEY,
            Self::Survey => SURVEY_CONFIG_KEY,
        }
    }
}

impl fmt::Display for SubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_key())
    }
}

/// The `textsConfig` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextsConfig {
    #[serde(default)]
    pub consent_text: String,
    /// Free-form lines shown above each scenario (`{ "line1": "...", ... }`).
    #[serde(default = "empty_object")]
    pub scenario_text: Value,
}

impl Default for TextsConfig {
    fn default() -> Self {
        Self {
            consent_text: String::new(),
            scenario_text: empty_object(),
        }
    }
}

/// One onboarding step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstructionStep {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// The `instructionsConfig` document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstructionsConfig {
    #[serde(default)]
    pub steps: Vec<InstructionStep>,
}

/// The `surveyConfig` document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SurveyConfig {
    #[serde(default)]
    pub survey: Vec<SurveyField>,
}

/// Raw, possibly partial, configuration documents as persisted or as shipped.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenarios_config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texts_config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions_config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub survey_config: Option<Value>,
}

impl PartialConfig {
    /// The defaults compiled into the binary.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled JSON asset is malformed.
    pub fn builtin() -> Result<Self, serde_json::Error> {
        serde_json::from_str(BUILTIN_DEFAULTS)
    }

    #[must_use]
    pub const fn get(&self, sub: SubConfig) -> Option<&Value> {
        match sub {
            SubConfig::Scenarios => self.scenarios_config.as_ref(),
            SubConfig::Texts => self.texts_config.as_ref(),
            SubConfig::Instructions => self.instructions_config.as_ref(),
            SubConfig::Survey => self.survey_config.as_ref(),
        }
    }

    pub fn set(&mut self, sub: SubConfig, value: Option<Value>) {
        let slot = match sub {
            SubConfig::Scenarios => &mut self.scenarios_config,
            SubConfig::Texts => &mut self.texts_config,
            SubConfig::Instructions => &mut self.instructions_config,
            SubConfig::Survey => &mut self.survey_config,
        };
        *slot = value;
    }
}

/// Fully resolved configuration consumed by sampling and the request handlers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalConfig {
    pub scenarios_config: ScenariosConfig,
    pub texts_config: TextsConfig,
    pub instructions_config: InstructionsConfig,
    pub survey_config: SurveyConfig,
}

impl CanonicalConfig {
    /// Canonical form of the built-in defaults alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled JSON asset is malformed.
    pub fn builtin() -> Result<Self, serde_json::Error> {
        Ok(merge(&PartialConfig::default(), &PartialConfig::builtin()?))
    }

    /// The participant-facing projection for one page load.
    #[must_use]
    pub fn participant_view(&self, scenarios: Vec<ScenarioInstance>) -> ParticipantView {
        ParticipantView {
            scenarios,
            consent_text: self.texts_config.consent_text.clone(),
            scenario_text: self.texts_config.scenario_text.clone(),
            instructions: self.instructions_config.steps.clone(),
            survey: self.survey_config.survey.clone(),
        }
    }
}

/// What a participant's browser receives from the public config endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub scenarios: Vec<ScenarioInstance>,
    pub consent_text: String,
    pub scenario_text: Value,
    pub instructions: Vec<InstructionStep>,
    pub survey: Vec<SurveyField>,
}

/// Shallow-merge one persisted document over its default.
///
/// A persisted non-array object wins key by key; anything else (missing,
/// array, scalar) leaves the default untouched.
#[must_use]
pub fn merge_layer(persisted: Option<&Value>, default: &Value) -> Value {
    match (persisted, default) {
        (Some(Value::Object(over)), Value::Object(base)) => {
            let mut merged = base.clone();
            for (key, value) in over {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        (Some(Value::Object(over)), _) => Value::Object(over.clone()),
        _ => default.clone(),
    }
}

/// Merge every persisted document over the defaults.
///
/// Never fails: a document that cannot be read into its typed shape after
/// merging falls back to the default document, and a broken default falls
/// back to the empty document.
#[must_use]
pub fn merge(persisted: &PartialConfig, defaults: &PartialConfig) -> CanonicalConfig {
    CanonicalConfig {
        scenarios_config: resolve_layer(SubConfig::Scenarios, persisted, defaults),
        texts_config: resolve_layer(SubConfig::Texts, persisted, defaults),
        instructions_config: resolve_layer(SubConfig::Instructions, persisted, defaults),
        survey_config: resolve_layer(SubConfig::Survey, persisted, defaults),
    }
}

fn resolve_layer<T>(sub: SubConfig, persisted: &PartialConfig, defaults: &PartialConfig) -> T
where
    T: DeserializeOwned + Default,
{
    let default_value = defaults.get(sub).cloned().unwrap_or_else(empty_object);
    let merged = merge_layer(persisted.get(sub), &default_value);
    match serde_json::from_value(merged) {
        Ok(resolved) => resolved,
        Err(err) => {
            log::warn!("persisted {sub} is malformed ({err}); serving defaults");
            serde_json::from_value(default_value).unwrap_or_else(|err| {
                log::error!("default {sub} is malformed ({err}); serving an empty document");
                T::default()
            })
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}
