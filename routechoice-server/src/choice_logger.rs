//! Recording one scenario decision into a participant session.
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use chrono::Utc;
use routechoice_core::{ChoiceError, ChoiceRequest, Session, SessionRecord};
use serde_json::{Value, json};
use thiserror::Error;

use crate::AppState;
use crate::error::ApiError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum ChoiceLogError {
    #[error("Invalid request: {0}")]
    Invalid(#[from] ChoiceError),
    #[error("Session `{0}` is already completed")]
    AlreadyCompleted(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<ChoiceLogError> for ApiError {
    fn from(err: ChoiceLogError) -> Self {
        match err {
            ChoiceLogError::Storage(err) => Self::Internal(err.to_string()),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

/// Write the decision at its scenario index, creating the session on first use.
///
/// # Errors
///
/// Fails for completed sessions and for sessions that cannot be encoded.
pub async fn log_choice(
    state: &AppState,
    request: &ChoiceRequest,
) -> Result<Session, ChoiceLogError> {
    let total_scenarios = state
        .config
        .canonical()
        .await
        .scenarios_config
        .total_scenarios();
    let now = Utc::now();

    let mut session = match state.sessions.load(&request.session_id).await {
        Some(SessionRecord::Active(session)) => session,
        Some(SessionRecord::Completed(_)) => {
            return Err(ChoiceLogError::AlreadyCompleted(request.session_id.clone()));
        }
        None => {
            log::info!("starting session {}", request.session_id);
            Session::new(request.session_id.clone(), now)
        }
    };
    session.record_choice(request, total_scenarios, now);
    state
        .sessions
        .save(&SessionRecord::Active(session.clone()))
        .await?;
    log::debug!(
        "session {} scenario {} -> {}",
        session.session_id,
        request.scenario_index,
        request.token()
    );
    Ok(session)
}

/// `POST /api/log-choice`
pub async fn log_choice_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;
    let request = ChoiceRequest::from_value(&body).map_err(ChoiceLogError::from)?;
    log_choice(&state, &request).await?;
    Ok(Json(json!({ "success": true })))
}
