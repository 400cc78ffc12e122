//! Driving-route polylines from an OSRM-compatible routing service.
//!
//! Each participant's map slot has at most one fetch in flight. Starting a
//! fetch for a slot aborts that participant's previous one, whose caller is
//! told it was superseded. Fetches without a session id are never tracked.
use axum::{
    Json,
    extract::{Query, State},
};
use reqwest::Client;
use routechoice_core::LatLng;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::task::AbortHandle;

use crate::AppState;
use crate::error::ApiError;

const DEFAULT_SLOT: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("route request for slot `{0}` was superseded")]
pub struct Superseded(pub String);

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    #[serde(default)]
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    /// `[lng, lat]` pairs.
    coordinates: Vec<[f64; 2]>,
}

/// `(session id, slot)` a fetch is registered under.
type SlotKey = (String, String);

pub struct RouteGeometry {
    client: Client,
    base_url: Option<String>,
    generation: AtomicU64,
    in_flight: Mutex<HashMap<SlotKey, (u64, AbortHandle)>>,
}

impl RouteGeometry {
    #[must_use]
    pub fn new(client: Client, base_url: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<SlotKey, (u64, AbortHandle)>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the route through `points`, replacing any fetch `session` has in
    /// flight for `slot`.
    ///
    /// Resolves to `None` when no routing service is configured or it has no
    /// usable route. Dropping the returned future aborts the upstream request.
    ///
    /// # Errors
    ///
    /// Returns [`Superseded`] when a newer fetch for the same session and slot
    /// started first.
    pub async fn fetch(
        &self,
        session: Option<&str>,
        slot: &str,
        points: &[LatLng],
    ) -> Result<Option<Vec<LatLng>>, Superseded> {
        let Some(base_url) = &self.base_url else {
            return Ok(None);
        };
        let url = route_url(base_url, points);
        let client = self.client.clone();
        let task = tokio::spawn(async move { fetch_route(&client, &url).await });

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let key = session.map(|session| (session.to_string(), slot.to_string()));
        if let Some(key) = &key
            && let Some((_, previous)) = self
                .slots()
                .insert(key.clone(), (generation, task.abort_handle()))
        {
            previous.abort();
        }
        let _guard = InFlight {
            geometry: self,
            key,
            generation,
            task: task.abort_handle(),
        };

        match task.await {
            Ok(route) => Ok(route),
            Err(err) if err.is_cancelled() => Err(Superseded(slot.to_string())),
            Err(err) => {
                log::error!("route fetch task for slot `{slot}` failed: {err}");
                Ok(None)
            }
        }
    }
}

/// Aborts the upstream request and releases the slot once its caller is done
/// waiting, including when the caller is dropped mid-fetch.
struct InFlight<'a> {
    geometry: &'a RouteGeometry,
    key: Option<SlotKey>,
    generation: u64,
    task: AbortHandle,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.task.abort();
        let Some(key) = &self.key else {
            return;
        };
        let mut slots = self.geometry.slots();
        if slots
            .get(key)
            .is_some_and(|(current, _)| *current == self.generation)
        {
            slots.remove(key);
        }
    }
}

fn route_url(base_url: &str, points: &[LatLng]) -> String {
    let path: Vec<String> = points
        .iter()
        .map(|point| format!("{},{}", point.lng(), point.lat()))
        .collect();
    format!(
        "{base_url}/route/v1/driving/{}?overview=full&geometries=geojson",
        path.join(";")
    )
}

async fn fetch_route(client: &Client, url: &str) -> Option<Vec<LatLng>> {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(err) => {
            log::warn!("routing service unreachable: {err}");
            return None;
        }
    };
    if !response.status().is_success() {
        log::warn!("routing service answered {}", response.status());
        return None;
    }
    match response.json::<OsrmResponse>().await {
        Ok(body) => route_coordinates(body),
        Err(err) => {
            log::warn!("routing service reply unreadable: {err}");
            None
        }
    }
}

fn route_coordinates(body: OsrmResponse) -> Option<Vec<LatLng>> {
    if !body.code.is_empty() && body.code != "Ok" {
        log::debug!("routing service found no route: {}", body.code);
        return None;
    }
    let route = body.routes.into_iter().next()?;
    Some(
        route
            .geometry
            .coordinates
            .into_iter()
            .map(|[lng, lat]| LatLng::new(lat, lng))
            .collect(),
    )
}

/// Parse `lat,lng;lat,lng;...` into at least two valid points.
///
/// # Errors
///
/// Returns a message naming the first malformed point.
pub fn parse_points(raw: &str) -> Result<Vec<LatLng>, String> {
    let points = raw
        .split(';')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| {
            let (lat, lng) = pair
                .split_once(',')
                .ok_or_else(|| format!("point `{pair}` must be `lat,lng`"))?;
            let point = LatLng::new(
                lat.trim().parse().map_err(|_| format!("bad latitude in `{pair}`"))?,
                lng.trim().parse().map_err(|_| format!("bad longitude in `{pair}`"))?,
            );
            if point.is_valid() {
                Ok(point)
            } else {
                Err(format!("point `{pair}` is out of range"))
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    if points.len() < 2 {
        return Err("at least two points are required".into());
    }
    Ok(points)
}

#[derive(Debug, Deserialize)]
pub struct GeometryQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    pub slot: Option<String>,
    pub points: String,
}

/// `GET /api/route-geometry`
pub async fn route_geometry(
    State(state): State<AppState>,
    Query(query): Query<GeometryQuery>,
) -> Result<Json<Value>, ApiError> {
    let points = parse_points(&query.points).map_err(ApiError::BadRequest)?;
    let slot = query.slot.as_deref().unwrap_or(DEFAULT_SLOT);
    let route = state
        .geometry
        .fetch(query.session_id.as_deref(), slot, &points)
        .await
        .map_err(|err| ApiError::Conflict(err.to_string()))?;
    Ok(Json(json!({ "coordinates": route })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    #[test]
    fn urls_use_lng_lat_order() {
        let url = route_url(
            "http://osrm.local",
            &[LatLng::new(45.42, -75.69), LatLng::new(45.5, -75.8)],
        );
        assert_eq!(
            url,
            "http://osrm.local/route/v1/driving/-75.69,45.42;-75.8,45.5?overview=full&geometries=geojson"
        );
    }

    #[test]
    fn point_lists_are_validated() {
        let points = parse_points("45.42,-75.69; 45.5,-75.8;").unwrap();
        assert_eq!(points, vec![LatLng::new(45.42, -75.69), LatLng::new(45.5, -75.8)]);
        assert!(parse_points("45.42,-75.69").is_err());
        assert!(parse_points("45.42;45.5,-75.8").is_err());
        assert!(parse_points("95,0;45.5,-75.8").is_err());
        assert!(parse_points("north,0;45.5,-75.8").is_err());
    }

    #[test]
    fn osrm_geometry_is_flipped_to_lat_lng() {
        let body: OsrmResponse = serde_json::from_value(json!({
            "code": "Ok",
            "routes": [{"geometry": {"coordinates": [[-75.69, 45.42], [-75.8, 45.5]]}}]
        }))
        .unwrap();
        assert_eq!(
            route_coordinates(body),
            Some(vec![LatLng::new(45.42, -75.69), LatLng::new(45.5, -75.8)])
        );

        let body: OsrmResponse =
            serde_json::from_value(json!({"code": "NoRoute", "routes": []})).unwrap();
        assert!(route_coordinates(body).is_none());
    }

    #[tokio::test]
    async fn unconfigured_service_yields_no_route() {
        let geometry = RouteGeometry::new(Client::new(), None);
        let points = [LatLng::new(45.0, -75.0), LatLng::new(45.1, -75.1)];
        assert_eq!(geometry.fetch(Some("p-1"), "a", &points).await, Ok(None));
    }

    /// Routing service that accepts connections but never answers.
    async fn silent_router() -> Arc<RouteGeometry> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        Arc::new(RouteGeometry::new(
            Client::new(),
            Some(format!("http://{address}")),
        ))
    }

    /// Routing service that answers every request with one route after `delay`.
    async fn slow_router(delay: Duration) -> Arc<RouteGeometry> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0_u8; 1024];
                    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(read) => request.extend_from_slice(&buf[..read]),
                        }
                    }
                    tokio::time::sleep(delay).await;
                    let body = json!({
                        "code": "Ok",
                        "routes": [{"geometry": {"coordinates": [[-75.0, 45.0], [-75.1, 45.1]]}}]
                    })
                    .to_string();
                    let reply = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                         content-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(reply.as_bytes()).await;
                });
            }
        });
        Arc::new(RouteGeometry::new(
            Client::new(),
            Some(format!("http://{address}")),
        ))
    }

    fn points() -> Vec<LatLng> {
        vec![LatLng::new(45.0, -75.0), LatLng::new(45.1, -75.1)]
    }

    fn spawn_fetch(
        geometry: &Arc<RouteGeometry>,
        session: Option<&'static str>,
        slot: &'static str,
    ) -> JoinHandle<Result<Option<Vec<LatLng>>, Superseded>> {
        let geometry = geometry.clone();
        tokio::spawn(async move { geometry.fetch(session, slot, &points()).await })
    }

    async fn wait_for_slots(geometry: &RouteGeometry, count: usize) {
        timeout(Duration::from_secs(5), async {
            while geometry.slots().len() != count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn newer_fetch_supersedes_older_one() {
        let geometry = silent_router().await;

        let first = spawn_fetch(&geometry, Some("p-1"), "map-1");
        wait_for_slots(&geometry, 1).await;
        let second = spawn_fetch(&geometry, Some("p-1"), "map-1");

        assert_eq!(first.await.unwrap(), Err(Superseded("map-1".to_string())));
        second.abort();
    }

    #[tokio::test]
    async fn participants_do_not_supersede_each_other() {
        let geometry = slow_router(Duration::from_millis(200)).await;
        let expected = Some(vec![LatLng::new(45.0, -75.0), LatLng::new(45.1, -75.1)]);

        let first = spawn_fetch(&geometry, Some("p-1"), DEFAULT_SLOT);
        wait_for_slots(&geometry, 1).await;
        let second = spawn_fetch(&geometry, Some("p-2"), DEFAULT_SLOT);
        let anonymous = spawn_fetch(&geometry, None, DEFAULT_SLOT);

        assert_eq!(first.await.unwrap(), Ok(expected.clone()));
        assert_eq!(second.await.unwrap(), Ok(expected.clone()));
        assert_eq!(anonymous.await.unwrap(), Ok(expected));
        assert!(geometry.slots().is_empty());
    }

    #[tokio::test]
    async fn dropped_caller_releases_its_slot() {
        let geometry = silent_router().await;
        let caller = spawn_fetch(&geometry, Some("p-1"), "map-1");
        wait_for_slots(&geometry, 1).await;
        let upstream = geometry.slots().values().next().unwrap().1.clone();

        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());
        assert!(geometry.slots().is_empty());
        timeout(Duration::from_secs(5), async {
            while !upstream.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
