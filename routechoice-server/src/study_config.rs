//! Persisted study configuration and the `/api/route-endpoints` handlers.
use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::HeaderName,
    response::{IntoResponse, Response},
};
use routechoice_core::{
    CanonicalConfig, ConfigPatch, PartialConfig, PatchKind, SamplerRng, SubConfig,
    build_participant_view, merge,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::AppState;
use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::storage::{LayeredStore, StorageError};

/// Response header carrying the seed a participant view was sampled with.
pub const SAMPLE_SEED_HEADER: HeaderName = HeaderName::from_static("x-sample-seed");

/// Reads and writes the four configuration documents.
pub struct ConfigStore {
    store: Arc<LayeredStore>,
    defaults: PartialConfig,
}

impl ConfigStore {
    #[must_use]
    pub fn new(store: Arc<LayeredStore>, defaults: PartialConfig) -> Self {
        Self { store, defaults }
    }

    /// Whatever is persisted; unreadable documents come back as absent.
    pub async fn load_persisted(&self) -> PartialConfig {
        let mut persisted = PartialConfig::default();
        for sub in SubConfig::ALL {
            persisted.set(sub, self.store.get(sub.storage_key()).await);
        }
        persisted
    }

    /// Persisted documents merged over the defaults.
    pub async fn canonical(&self) -> CanonicalConfig {
        merge(&self.load_persisted().await, &self.defaults)
    }

    /// Write every document the patch touches.
    ///
    /// Documents are committed one at a time and only served once stored. If a
    /// write fails, the documents this patch already wrote are put back.
    ///
    /// # Errors
    ///
    /// Returns the first storage failure.
    pub async fn apply_patch(&self, patch: &ConfigPatch) -> Result<Vec<SubConfig>, StorageError> {
        let persisted = self.load_persisted().await;
        let mut written = Vec::new();
        for (sub, document) in patch.apply(&persisted) {
            if let Err(err) = self.store.commit(sub.storage_key(), &document).await {
                log::error!("writing {sub} failed: {err}");
                self.restore(&persisted, &written).await;
                return Err(err);
            }
            log::info!("updated {sub}");
            written.push(sub);
        }
        Ok(written)
    }

    async fn restore(&self, persisted: &PartialConfig, written: &[SubConfig]) {
        for &sub in written.iter().rev() {
            let key = sub.storage_key();
            let restored = match persisted.get(sub) {
                Some(previous) => self.store.commit(key, previous).await,
                None => self.store.delete(key).await,
            };
            match restored {
                Ok(()) => log::warn!("rolled back {sub}"),
                Err(err) => log::error!("rolling back {sub} failed: {err}"),
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SampleQuery {
    pub seed: Option<u64>,
}

/// `GET /api/route-endpoints`: the merged config for admins, a sampled view otherwise.
pub async fn get_route_endpoints(
    State(state): State<AppState>,
    admin: Option<AdminUser>,
    Query(query): Query<SampleQuery>,
) -> Result<Response, ApiError> {
    let config = state.config.canonical().await;
    if admin.is_some() {
        return Ok(Json(config).into_response());
    }

    let mut rng = query
        .seed
        .map_or_else(SamplerRng::from_entropy, SamplerRng::from_user_seed);
    let view = build_participant_view(&config, &mut rng)
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(([(SAMPLE_SEED_HEADER, rng.seed().to_string())], Json(view)).into_response())
}

/// `POST /api/route-endpoints`
pub async fn post_route_endpoints(
    State(state): State<AppState>,
    _admin: AdminUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    update_config(&state, payload, PatchKind::Full).await
}

/// `PATCH /api/route-endpoints`
pub async fn patch_route_endpoints(
    State(state): State<AppState>,
    _admin: AdminUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    update_config(&state, payload, PatchKind::Partial).await
}

async fn update_config(
    state: &AppState,
    payload: Result<Json<Value>, JsonRejection>,
    kind: PatchKind,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = payload?;
    let patch =
        ConfigPatch::parse(&body, kind).map_err(|err| ApiError::bad_request(err.to_string()))?;
    state.config.apply_patch(&patch).await?;
    Ok(Json(json!({ "success": true })))
}
