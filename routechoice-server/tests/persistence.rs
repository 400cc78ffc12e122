use clap::Parser;
use routechoice_core::{CanonicalConfig, ChoiceRequest, ConfigPatch, PatchKind, SessionRecord};
use routechoice_server::AppState;
use routechoice_server::choice_logger::log_choice;
use routechoice_server::settings::Args;
use routechoice_server::storage::FileBackend;
use serde_json::json;
use std::path::Path;

fn args_for(data_dir: &Path) -> Args {
    let data_dir = data_dir.display().to_string();
    Args::parse_from([
        "routechoice-server",
        "--data-dir",
        data_dir.as_str(),
        "--session-key-prefix",
        "session:",
    ])
}

#[tokio::test]
async fn config_and_sessions_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let args = args_for(dir.path());

    let first = AppState::from_args(&args).unwrap();
    let patch = ConfigPatch::parse(&json!({"consentText": "Persisted consent"}), PatchKind::Full)
        .unwrap();
    first.config.apply_patch(&patch).await.unwrap();
    let request = ChoiceRequest::from_value(&json!({
        "sessionId": "p-1",
        "scenarioIndex": 1,
        "choice": "alternative",
        "tts": 800,
        "defaultTime": 20
    }))
    .unwrap();
    log_choice(&first, &request).await.unwrap();

    let files = FileBackend::new(dir.path());
    assert!(files.path_for("textsConfig").exists());
    assert!(files.path_for("session:p-1").exists());

    let second = AppState::from_args(&args).unwrap();
    let config = second.config.canonical().await;
    assert_eq!(config.texts_config.consent_text, "Persisted consent");
    let Some(SessionRecord::Active(session)) = second.sessions.load("p-1").await else {
        panic!("session should be reloaded from disk");
    };
    assert_eq!(session.answered(), 1);
}

#[tokio::test]
async fn malformed_documents_fall_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let files = FileBackend::new(dir.path());
    std::fs::write(files.path_for("surveyConfig"), b"{\"survey\": ").unwrap();
    std::fs::write(files.path_for("textsConfig"), b"[1, 2, 3]").unwrap();

    let state = AppState::from_args(&args_for(dir.path())).unwrap();
    let config = state.config.canonical().await;
    assert_eq!(config, CanonicalConfig::builtin().unwrap());
}
