//! Shared constants for storage keys, wire labels and defaults.

// Persisted configuration documents ----------------------------------------
pub const SCENARIOS_CONFIG_KEY: &str = "scenariosConfig";
pub const TEXTS_CONFIG_KEY: &str = "textsConfig";
pub const INSTRUCTIONS_CONFIG_KEY: &str = "instructionsConfig";
pub const SURVEY_CONFIG_KEY: &str = "surveyConfig";

// Settings fallbacks when a document omits them ------------------------------
pub const DEFAULT_NUMBER_OF_SCENARIOS: u32 = 3;
pub const DEFAULT_SCENARIO_SHUFFLE: bool = true;

// Choice logging -------------------------------------------------------------
/// Choice label a participant submits when keeping the default route.
pub const DEFAULT_CHOICE_LABEL: &str = "default";
pub const CHOICE_FLAG_DEFAULT: char = '0';
pub const CHOICE_FLAG_ALTERNATIVE: char = '1';
/// Largest scenario index a choice may be logged at.
pub const MAX_SCENARIO_INDEX: usize = 1023;

// RNG stream domain tags -------------------------------------------------------
pub(crate) const STREAM_SUBSET: &[u8] = b"subset";
pub(crate) const STREAM_ORDER: &[u8] = b"order";
pub(crate) const STREAM_POOLS: &[u8] = b"pools";
pub(crate) const STREAM_PRESELECT: &[u8] = b"preselect";
