//! Scenario templates, settings and the resolved per-page-load instances.
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::constants::{DEFAULT_NUMBER_OF_SCENARIOS, DEFAULT_SCENARIO_SHUFFLE};
use crate::geo::LatLng;
use crate::pool::ValuePool;

/// Alternative route as configured; pools are resolved at sampling time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeRouteTemplate {
    pub middle_point: ValuePool<LatLng>,
    /// Extra minutes versus the default route.
    pub tts: ValuePool<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_name: Option<ValuePool<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<ValuePool<String>>,
    #[serde(default)]
    pub preselected: bool,
}

/// A scenario template whose varying fields are pools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioPoolEntry {
    pub start: ValuePool<LatLng>,
    pub end: ValuePool<LatLng>,
    pub default_route_time: ValuePool<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_name: Option<ValuePool<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_name: Option<ValuePool<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<ValuePool<String>>,
    #[serde(default)]
    pub choice_list: Vec<AlternativeRouteTemplate>,
    #[serde(default)]
    pub randomly_preselect_route: bool,
}

/// Scenario templates keyed by id, kept in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScenarioPool {
    entries: Vec<(String, ScenarioPoolEntry)>,
}

impl ScenarioPool {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ScenarioPoolEntry> {
        self.entries
            .iter()
            .find(|(entry_key, _)| entry_key == key)
            .map(|(_, entry)| entry)
    }

    /// Insert or replace an entry; replacements keep their original position.
    pub fn insert(&mut self, key: impl Into<String>, entry: ScenarioPoolEntry) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = entry;
        } else {
            self.entries.push((key, entry));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScenarioPoolEntry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }
}

impl FromIterator<(String, ScenarioPoolEntry)> for ScenarioPool {
    fn from_iter<I: IntoIterator<Item = (String, ScenarioPoolEntry)>>(iter: I) -> Self {
        let mut pool = Self::empty();
        for (key, entry) in iter {
            pool.insert(key, entry);
        }
        pool
    }
}

impl Serialize for ScenarioPool {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, entry) in &self.entries {
            map.serialize_entry(key, entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ScenarioPool {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PoolVisitor;

        impl<'de> Visitor<'de> for PoolVisitor {
            type Value = ScenarioPool;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of scenario id to scenario template")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut pool = ScenarioPool::empty();
                while let Some((key, entry)) = access.next_entry::<String, ScenarioPoolEntry>()? {
                    pool.insert(key, entry);
                }
                Ok(pool)
            }
        }

        deserializer.deserialize_map(PoolVisitor)
    }
}

/// How many scenarios a participant sees and whether their order is randomized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "Settings::default_number_of_scenarios")]
    pub number_of_scenarios: u32,
    #[serde(default = "Settings::default_scenario_shuffle")]
    pub scenario_shuffle: bool,
}

impl Settings {
    const fn default_number_of_scenarios() -> u32 {
        DEFAULT_NUMBER_OF_SCENARIOS
    }

    const fn default_scenario_shuffle() -> bool {
        DEFAULT_SCENARIO_SHUFFLE
    }

    /// Number of scenarios actually shown for a pool of `pool_len` templates.
    #[must_use]
    pub fn effective_count(&self, pool_len: usize) -> usize {
        usize::try_from(self.number_of_scenarios)
            .unwrap_or(usize::MAX)
            .min(pool_len)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            number_of_scenarios: Self::default_number_of_scenarios(),
            scenario_shuffle: Self::default_scenario_shuffle(),
        }
    }
}

/// The `scenariosConfig` document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScenariosConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub scenarios: ScenarioPool,
}

impl ScenariosConfig {
    /// Scenario count a session is expected to cover under this configuration.
    #[must_use]
    pub fn total_scenarios(&self) -> usize {
        self.settings.effective_count(self.scenarios.len())
    }
}

/// An alternative route with every pool resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeRouteInstance {
    pub middle_point: LatLng,
    pub tts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub preselected: bool,
}

/// A concrete scenario shown to a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioInstance {
    pub id: String,
    pub start: LatLng,
    pub end: LatLng,
    pub default_route_time: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub choice_list: Vec<AlternativeRouteInstance>,
}

impl ScenarioInstance {
    /// Index of the preselected alternative, if any.
    #[must_use]
    pub fn preselected_index(&self) -> Option<usize> {
        self.choice_list.iter().position(|alt| alt.preselected)
    }
}
