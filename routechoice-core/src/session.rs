//! Participant sessions: choice accumulation and survey finalization.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::choice::{ChoiceRequest, ChoiceToken};
use crate::survey::{SurveyField, normalize_responses};

/// A session that is still collecting scenario choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_time: Option<f64>,
    #[serde(default)]
    pub total_scenarios: usize,
    /// One slot per scenario; `None` until that scenario is answered.
    pub choices: Vec<Option<ChoiceToken>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl Session {
    #[must_use]
    pub fn new(session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: now,
            default_time: None,
            total_scenarios: 0,
            choices: Vec::new(),
            last_updated_at: None,
        }
    }

    /// Record one decision at its scenario index.
    ///
    /// The choice vector grows to cover both the configured scenario count and
    /// the submitted index; existing slots keep their positions and a revisit
    /// overwrites the earlier token for that index.
    pub fn record_choice(
        &mut self,
        request: &ChoiceRequest,
        total_scenarios: usize,
        now: DateTime<Utc>,
    ) {
        let required = total_scenarios.max(request.scenario_index.saturating_add(1));
        if self.choices.len() < required {
            self.choices.resize(required, None);
        }
        self.total_scenarios = total_scenarios;
        self.default_time = Some(request.default_time);
        self.choices[request.scenario_index] = Some(request.token());
        self.last_updated_at = Some(now);
    }

    /// Number of scenarios answered so far.
    #[must_use]
    pub fn answered(&self) -> usize {
        self.choices.iter().flatten().count()
    }

    /// Attach survey responses and project the session into its completed form.
    ///
    /// Returns the completed session together with the full participant record
    /// (completed session plus choice tokens) destined for the append-only log.
    #[must_use]
    pub fn finalize(
        self,
        fields: &[SurveyField],
        responses: &Map<String, Value>,
        now: DateTime<Utc>,
    ) -> (CompletedSession, ParticipantRecord) {
        let completed = CompletedSession {
            session_id: self.session_id,
            timestamp: self.timestamp,
            created_at: self.timestamp,
            total_scenarios: self.total_scenarios,
            survey_responses: normalize_responses(fields, responses),
            completed_at: now,
            last_updated_at: now,
        };
        let record = ParticipantRecord {
            session: completed.clone(),
            default_time: self.default_time,
            choices: self.choices,
        };
        (completed, record)
    }
}

/// A session after survey submission; choice bookkeeping is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSession {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub total_scenarios: usize,
    pub survey_responses: Map<String, Value>,
    pub completed_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// One line of the finalized-records log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecord {
    #[serde(flatten)]
    pub session: CompletedSession,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_time: Option<f64>,
    pub choices: Vec<Option<ChoiceToken>>,
}

/// Whatever is stored under a session key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionRecord {
    Completed(CompletedSession),
    Active(Session),
}

impl SessionRecord {
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::Completed(session) => &session.session_id,
            Self::Active(session) => &session.session_id,
        }
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}
