//! Closing a session with the participant's survey answers.
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use chrono::Utc;
use routechoice_core::{CompletedSession, SessionRecord, SurveyError, SurveyRequest};
use serde_json::{Value, json};
use thiserror::Error;

use crate::AppState;
use crate::error::ApiError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum SurveyLogError {
    #[error("Invalid request: {0}")]
    Invalid(#[from] SurveyError),
    #[error("Session not found")]
    SessionNotFound(String),
    #[error("Survey already submitted")]
    AlreadyCompleted(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<SurveyLogError> for ApiError {
    fn from(err: SurveyLogError) -> Self {
        match err {
            SurveyLogError::Storage(err) => Self::Internal(err.to_string()),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

/// Normalize the answers, store the completed session and append it to the records log.
///
/// # Errors
///
/// Fails when the session does not exist or is already completed. A records
/// log failure is logged but does not fail the submission.
pub async fn log_survey(
    state: &AppState,
    request: &SurveyRequest,
) -> Result<CompletedSession, SurveyLogError> {
    let session = match state.sessions.load(&request.session_id).await {
        Some(SessionRecord::Active(session)) => session,
        Some(SessionRecord::Completed(_)) => {
            return Err(SurveyLogError::AlreadyCompleted(request.session_id.clone()));
        }
        None => {
            log::warn!("survey for unknown session {}", request.session_id);
            return Err(SurveyLogError::SessionNotFound(request.session_id.clone()));
        }
    };

    let fields = state.config.canonical().await.survey_config.survey;
    let (completed, record) = session.finalize(&fields, &request.responses, Utc::now());
    state
        .sessions
        .save(&SessionRecord::Completed(completed.clone()))
        .await?;
    if let Err(err) = state.records.append(&record).await {
        log::error!(
            "could not append session {} to {}: {err}",
            completed.session_id,
            state.records.path().display()
        );
    }
    log::info!(
        "session {} completed with {} answered scenarios",
        completed.session_id,
        record.choices.iter().flatten().count()
    );
    Ok(completed)
}

/// `POST /api/log-survey`
pub async fn log_survey_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;
    let request = SurveyRequest::from_value(&body).map_err(SurveyLogError::from)?;
    log_survey(&state, &request).await?;
    Ok(Json(json!({ "success": true })))
}
