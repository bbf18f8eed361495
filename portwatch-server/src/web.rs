use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use portwatch_core::proximity::{find_connections, vessels_near, NearbyVessel, SearchRadius};
use portwatch_core::region::classify;
use portwatch_core::routes::RouteLibrary;
use portwatch_core::summary::{port_summary, Page, PortSummary, RawSummaryQuery, SummaryQuery};
use portwatch_core::synth::PositionSynthesizer;
use portwatch_core::{Port, PortId, Region, Vessel, VesselId, VesselStatus};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_graceful_shutdown::SubsystemHandle;

use crate::broadcast::ProximityBroadcaster;
use crate::config::Settings;
use crate::error::ApiError;
use crate::registry::SubscriberRegistry;
use crate::store::FleetStore;
use crate::ws::stream_handler;

pub type SharedSynthesizer = Arc<Mutex<PositionSynthesizer<StdRng>>>;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn FleetStore>,
    pub registry: Arc<SubscriberRegistry>,
    pub broadcaster: Arc<ProximityBroadcaster>,
    pub synthesizer: SharedSynthesizer,
    pub settings: Settings,
}

impl AppState {
    /// Wire a store to a fresh registry and broadcaster.
    ///
    /// With a `seed`, synthesis and berth placement are reproducible.
    pub fn new(store: Arc<dyn FleetStore>, settings: Settings, seed: Option<u64>) -> Self {
        let registry = Arc::new(SubscriberRegistry::new());
        let broadcaster = Arc::new(ProximityBroadcaster::new(
            store.clone(),
            registry.clone(),
            settings.default_radius,
            settings.tick_interval,
        ));
        let synthesizer = match seed {
            Some(seed) => PositionSynthesizer::from_seed(RouteLibrary::standard(), seed),
            None => PositionSynthesizer::from_os_rng(RouteLibrary::standard()),
        };

        AppState {
            store,
            registry,
            broadcaster,
            synthesizer: Arc::new(Mutex::new(synthesizer)),
            settings,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/proximity/summary", get(proximity_summary))
        .route("/api/v1/ports/{id}/vessels", get(port_vessels))
        .route("/api/v1/vessels/synthesize", post(synthesize_fleet))
        .route("/api/v1/vessels/{id}/connect", post(connect_vessel))
        .route("/api/v1/stream", get(stream_handler))
        .with_state(state)
}

/// Summary query parameters, validated by `SummaryQuery::parse`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryParams {
    region: Option<String>,
    page: Option<String>,
    limit: Option<String>,
    sort_by: Option<String>,
    sort_order: Option<String>,
    port_type: Option<String>,
    radius: Option<String>,
}

async fn proximity_summary(
    State(state): State<AppState>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<Page<PortSummary>>, ApiError> {
    let raw = RawSummaryQuery {
        region: params.region.as_deref(),
        page: params.page.as_deref(),
        limit: params.limit.as_deref(),
        sort_by: params.sort_by.as_deref(),
        sort_order: params.sort_order.as_deref(),
        port_type: params.port_type.as_deref(),
    };
    let query = SummaryQuery::parse(&raw, state.settings.max_page_limit)?;
    let radius = parse_radius(params.radius.as_deref(), state.settings.default_radius)?;

    let snapshot = state.store.snapshot().await;
    let connections = find_connections(&snapshot.vessels, &snapshot.ports, radius);
    Ok(Json(port_summary(&snapshot.ports, &connections, &query)))
}

fn parse_radius(value: Option<&str>, default: SearchRadius) -> Result<SearchRadius, ApiError> {
    Ok(value.map(SearchRadius::parse).transpose()?.unwrap_or(default))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NearbyParams {
    distance_km: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortWithVessels {
    pub port: Port,
    pub region: Region,
    pub distance_km: f64,
    pub vessels: Vec<NearbyVessel>,
}

async fn port_vessels(
    State(state): State<AppState>,
    Path(id): Path<PortId>,
    Query(params): Query<NearbyParams>,
) -> Result<Json<PortWithVessels>, ApiError> {
    let radius = parse_radius(params.distance_km.as_deref(), state.settings.default_radius)?;

    let snapshot = state.store.snapshot().await;
    let port = snapshot.port(id).ok_or(ApiError::PortNotFound(id))?;

    Ok(Json(PortWithVessels {
        port: port.clone(),
        region: classify(port.position),
        distance_km: radius.km(),
        vessels: vessels_near(port, &snapshot.vessels, radius),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub port_id: PortId,
    #[serde(default)]
    pub move_to_port: bool,
}

async fn connect_vessel(
    State(state): State<AppState>,
    Path(id): Path<VesselId>,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<Vessel>, ApiError> {
    let snapshot = state.store.snapshot().await;
    let mut vessel = snapshot.vessel(id).cloned().ok_or(ApiError::VesselNotFound(id))?;
    let port = snapshot
        .port(request.port_id)
        .ok_or(ApiError::PortNotFound(request.port_id))?;

    vessel.destination_port_id = Some(port.id);
    if request.move_to_port {
        let berth = state.synthesizer.lock().await.berth_near(port.position);
        vessel.position = Some(berth);
        vessel.region = Some(classify(berth));
        vessel.status = VesselStatus::Moored;
        vessel.speed = 0.0;
    }

    state.store.save_vessels(vec![vessel.clone()]).await?;
    log::info!(
        "Vessel {} connected to port {}{}",
        vessel.id,
        port.id,
        if request.move_to_port { " and moved to berth" } else { "" }
    );
    state.broadcaster.trigger();
    Ok(Json(vessel))
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SynthesizeResponse {
    pub updated: usize,
}

async fn synthesize_fleet(
    State(state): State<AppState>,
) -> Result<Json<SynthesizeResponse>, ApiError> {
    let snapshot = state.store.snapshot().await;
    let mut vessels: Vec<Vessel> = snapshot
        .vessels
        .iter()
        .filter(|v| !v.live_tracked)
        .cloned()
        .collect();

    let synthesizer = state.synthesizer.clone();
    let vessels = tokio::task::spawn_blocking(move || {
        synthesizer.blocking_lock().synthesize_fleet(&mut vessels);
        vessels
    })
    .await
    .map_err(|e| ApiError::Internal(format!("synthesis task failed: {}", e)))?;

    let updated = vessels.len();
    state.store.save_vessels(vessels).await?;
    log::info!("Synthesized positions for {} vessels", updated);
    state.broadcaster.trigger();
    Ok(Json(SynthesizeResponse { updated }))
}

pub struct Web {
    state: AppState,
    port: u16,
}

impl Web {
    pub fn new(state: AppState, port: u16) -> Self {
        Web { state, port }
    }

    pub async fn run(self, subsys: SubsystemHandle) -> anyhow::Result<()> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Cannot listen on {}", addr))?;
        log::info!("Starting HTTP web server on {}", addr);

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(async move { subsys.on_shutdown_requested().await })
            .await?;
        log::debug!("Web server stopped");
        Ok(())
    }
}
