//! Route Choice Study Server
//!
//! axum service around `routechoice-core`: serves sampled study configurations,
//! records scenario choices and survey answers, and lets the admin edit the
//! study.

pub mod auth;
pub mod choice_logger;
pub mod error;
pub mod geometry;
pub mod records;
pub mod sessions;
pub mod settings;
pub mod storage;
pub mod study_config;
pub mod survey_finalizer;

use axum::{
    Router,
    routing::{get, post},
};
use routechoice_core::{BuiltinDefaults, DefaultsLoader, PartialConfig};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::AdminAuth;
use crate::geometry::RouteGeometry;
use crate::records::RecordsLog;
use crate::sessions::SessionStore;
use crate::settings::Args;
use crate::storage::{FileBackend, KeyValueBackend, LayeredStore, RestKvBackend};
use crate::study_config::ConfigStore;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("built-in study defaults are malformed: {0}")]
    Defaults(#[from] serde_json::Error),
    #[error("could not build the HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub sessions: Arc<SessionStore>,
    pub records: Arc<RecordsLog>,
    pub auth: Arc<AdminAuth>,
    pub geometry: Arc<RouteGeometry>,
}

impl AppState {
    /// Build the state with the durable backend the settings select: the REST
    /// key-value service when configured, files under the data directory otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] if the defaults cannot be parsed or the HTTP
    /// client cannot be built.
    pub fn from_args(args: &Args) -> Result<Self, StartupError> {
        let client = reqwest::Client::builder().build()?;
        let durable: Arc<dyn KeyValueBackend> = match args.kv_rest() {
            Some((url, token)) => Arc::new(RestKvBackend::new(client.clone(), url, token)),
            None => Arc::new(FileBackend::new(&args.data_dir)),
        };
        log::info!("persisting to the {} backend", durable.name());
        Self::with_store(args, Arc::new(LayeredStore::new(durable)), client)
    }

    /// Build the state around an existing store.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] if the defaults cannot be parsed.
    pub fn with_store(
        args: &Args,
        store: Arc<LayeredStore>,
        client: reqwest::Client,
    ) -> Result<Self, StartupError> {
        let defaults: PartialConfig = BuiltinDefaults.load_defaults()?;
        Ok(Self {
            config: Arc::new(ConfigStore::new(store.clone(), defaults)),
            sessions: Arc::new(SessionStore::new(store, args.session_key_prefix.clone())),
            records: Arc::new(RecordsLog::new(args.records_log_path())),
            auth: Arc::new(AdminAuth::new(
                args.admin_auth,
                args.admin_username.clone(),
                args.admin_password.clone(),
                args.admin_cookie_secret.clone(),
            )),
            geometry: Arc::new(RouteGeometry::new(client, args.routing_url.clone())),
        })
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route(
            "/api/route-endpoints",
            get(study_config::get_route_endpoints)
                .post(study_config::post_route_endpoints)
                .patch(study_config::patch_route_endpoints),
        )
        .route("/api/log-choice", post(choice_logger::log_choice_handler))
        .route("/api/log-survey", post(survey_finalizer::log_survey_handler))
        .route("/api/route-geometry", get(geometry::route_geometry))
        .route("/api/admin/login", post(auth::login))
        .route("/api/admin/logout", post(auth::logout))
        .layer(cors)
        .with_state(state)
}
