//! Route Choice Study Core
//!
//! Platform-agnostic logic for the route choice study: configuration merging,
//! scenario sampling, choice tokens, session accounting and survey
//! normalization. This crate performs no I/O; storage and transport live in
//! the server crate behind the traits defined here.

pub mod choice;
pub mod config;
pub mod constants;
pub mod geo;
pub mod patch;
pub mod pool;
pub mod sampler;
pub mod scenario;
pub mod session;
pub mod survey;

// Re-export commonly used types
pub use choice::{ChoiceError, ChoiceRequest, ChoiceToken, ChoiceTokenError, is_default_label};
pub use config::{
    CanonicalConfig, InstructionStep, InstructionsConfig, ParticipantView, PartialConfig,
    SubConfig, SurveyConfig, TextsConfig, merge, merge_layer,
};
pub use geo::LatLng;
pub use patch::{ConfigPatch, ConfigPatchError, PatchKind};
pub use pool::{EmptyPool, ValuePool};
pub use sampler::{SampleError, SamplerRng, sample, select_subset};
pub use scenario::{
    AlternativeRouteInstance, AlternativeRouteTemplate, ScenarioInstance, ScenarioPool,
    ScenarioPoolEntry, ScenariosConfig, Settings,
};
pub use session::{CompletedSession, ParticipantRecord, Session, SessionRecord};
pub use survey::{
    SurveyError, SurveyField, SurveyFieldKind, SurveyRequest, normalize_multiselect,
    normalize_responses,
};

/// Source of the built-in study defaults.
/// Deployments that ship their own defaults provide another implementation.
pub trait DefaultsLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the default configuration documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the defaults cannot be read or parsed.
    fn load_defaults(&self) -> Result<PartialConfig, Self::Error>;
}

/// Defaults compiled into the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinDefaults;

impl DefaultsLoader for BuiltinDefaults {
    type Error = serde_json::Error;

    fn load_defaults(&self) -> Result<PartialConfig, Self::Error> {
        PartialConfig::builtin()
    }
}

/// Sample one participant view from a resolved configuration.
///
/// # Errors
///
/// Returns [`SampleError`] if a selected scenario has an empty pool.
pub fn build_participant_view(
    config: &CanonicalConfig,
    rng: &mut SamplerRng,
) -> Result<ParticipantView, SampleError> {
    let scenarios = sample(
        &config.scenarios_config.scenarios,
        &config.scenarios_config.settings,
        rng,
    )?;
    Ok(config.participant_view(scenarios))
}
