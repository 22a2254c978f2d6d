use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::EngineOptions;
use crate::dump::{self, DumpFileInfo};
use crate::error::Error;
use crate::index::GlobalIndex;
use crate::models::*;
use crate::reconstruct::{reconstruct_with, Reconstruction};

/// Half-width of a window query when `radius` is not given, in ms
pub const DEFAULT_WINDOW_RADIUS: i64 = 5_000;

/// A dump together with everything rebuilt from it
pub struct LoadedFight {
    pub fight: Fight,
    pub reconstruction: Reconstruction,
    /// `timelines` response body, serialized once per load
    timelines_json: Bytes,
}

pub struct AppState {
    dump_dir: PathBuf,
    engine: EngineOptions,
    cache: Mutex<HashMap<String, (u64, Arc<LoadedFight>)>>,
}

pub fn build_router(dump_dir: PathBuf, engine: EngineOptions) -> Router {
    let state = Arc::new(AppState {
        dump_dir,
        engine,
        cache: Mutex::new(HashMap::new()),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/dumps", get(list_dumps))
        .route("/api/dumps/{filename}/summary", get(fight_summary))
        .route("/api/dumps/{filename}/timelines", get(fight_timelines))
        .route("/api/dumps/{filename}/timestamps", get(fight_timestamps))
        .route("/api/dumps/{filename}/snapshot", get(fight_snapshot))
        .route("/api/dumps/{filename}/window", get(fight_window))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotMode {
    /// Stored frame at exactly `t`
    Exact,
    /// Stored frame at the closest global timestamp
    Nearest,
    /// Stored frame when `t` is on the index, otherwise computed on demand
    #[default]
    Interpolate,
}

#[derive(Debug, Deserialize)]
struct SnapshotParams {
    t: i64,
    #[serde(default)]
    mode: SnapshotMode,
}

#[derive(Debug, Deserialize)]
struct WindowParams {
    t: i64,
    radius: Option<i64>,
}

#[derive(Debug, Serialize)]
struct FrameView {
    timestamp: i64,
    actors: Frame,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActorSummary {
    id: ActorId,
    name: String,
    kind: ActorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    sample_count: usize,
    death_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeathView {
    actor_id: ActorId,
    timestamp: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FightSummary {
    fight: Fight,
    duration: i64,
    actors: Vec<ActorSummary>,
    timestamp_count: usize,
    deaths: Vec<DeathView>,
}

async fn list_dumps(State(state): State<Arc<AppState>>) -> Json<Vec<DumpFileInfo>> {
    Json(dump::list_dumps(&state.dump_dir))
}

async fn fight_summary(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, Error> {
    let (loaded, cache_status) = load_fight(&state, &filename).await?;
    let result = &loaded.reconstruction;

    let summary = FightSummary {
        fight: loaded.fight.clone(),
        duration: result.fight_duration,
        actors: result
            .timelines
            .values()
            .map(|t| ActorSummary {
                id: t.actor_id,
                name: t.name.clone(),
                kind: t.kind,
                role: t.role.clone(),
                sample_count: t.positions.len(),
                death_count: t.deaths.len(),
            })
            .collect(),
        timestamp_count: result.index.len(),
        deaths: result
            .deaths()
            .into_iter()
            .map(|(actor_id, timestamp)| DeathView { actor_id, timestamp })
            .collect(),
    };

    let headers = [("X-Cache-Status", cache_status)];
    Ok((headers, Json(summary)).into_response())
}

async fn fight_timelines(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, Error> {
    let (loaded, _) = load_fight(&state, &filename).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], loaded.timelines_json.clone()).into_response())
}

async fn fight_timestamps(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Json<GlobalIndex>, Error> {
    let (loaded, _) = load_fight(&state, &filename).await?;
    Ok(Json(loaded.reconstruction.index.clone()))
}

async fn fight_snapshot(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    Query(params): Query<SnapshotParams>,
) -> Result<Json<FrameView>, Error> {
    let (loaded, _) = load_fight(&state, &filename).await?;
    let result = &loaded.reconstruction;
    let t = params.t;

    let view = match params.mode {
        SnapshotMode::Exact => result.snapshots.query(t).map(|frame| FrameView {
            timestamp: t,
            actors: frame.clone(),
        }),
        SnapshotMode::Nearest => result.query_nearest(t).map(|(timestamp, frame)| FrameView {
            timestamp,
            actors: frame.clone(),
        }),
        SnapshotMode::Interpolate => Some(FrameView {
            timestamp: t,
            actors: result.query(t).into_owned(),
        }),
    };

    view.map(Json)
        .ok_or_else(|| Error::NotFound(format!("no snapshot at t={t} in {filename}")))
}

async fn fight_window(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    Query(params): Query<WindowParams>,
) -> Result<Json<Vec<FrameView>>, Error> {
    let radius = params.radius.unwrap_or(DEFAULT_WINDOW_RADIUS);
    if radius < 0 {
        return Err(Error::InvalidQuery(format!("radius must be non-negative, got {radius}")));
    }

    let (loaded, _) = load_fight(&state, &filename).await?;
    let frames = loaded
        .reconstruction
        .window(params.t, radius)
        .into_iter()
        .map(|(timestamp, frame)| FrameView {
            timestamp,
            actors: frame.clone(),
        })
        .collect();
    Ok(Json(frames))
}

/// Load and reconstruct a dump, reusing the cached result while the file size is unchanged
async fn load_fight(state: &AppState, filename: &str) -> Result<(Arc<LoadedFight>, &'static str), Error> {
    dump::validate_filename(filename)?;

    let path = dump::find_file_recursive(&state.dump_dir, filename)
        .ok_or_else(|| Error::NotFound(format!("dump {filename}")))?;

    let current_size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

    {
        let cache = state.cache.lock().await;
        if let Some((cached_size, cached)) = cache.get(filename) {
            if *cached_size == current_size {
                debug!(filename, size = current_size, "Cache hit");
                return Ok((cached.clone(), "HIT"));
            }
            info!(filename, old = cached_size, new = current_size, "Cache stale, size changed");
        } else {
            info!(filename, size = current_size, "No cache, loading");
        }
    }

    let engine = state.engine.clone();
    let load_name = filename.to_string();
    let loaded = tokio::task::spawn_blocking(move || -> Result<LoadedFight, Error> {
        let start = std::time::Instant::now();
        let dump = dump::load_dump(&path)?;
        let reconstruction = reconstruct_with(&dump.fight, &dump.events, &dump.context, &engine);
        let timelines_json = Bytes::from(serde_json::to_vec(&reconstruction.timelines)?);
        info!(
            filename = %load_name,
            events = dump.events.len(),
            actors = reconstruction.timelines.len(),
            dropped = reconstruction.stats.dropped,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Reconstructed dump"
        );
        Ok(LoadedFight {
            fight: dump.fight,
            reconstruction,
            timelines_json,
        })
    })
    .await
    .map_err(|e| Error::Task(e.to_string()))??;

    let loaded = Arc::new(loaded);
    state
        .cache
        .lock()
        .await
        .insert(filename.to_string(), (current_size, loaded.clone()));

    Ok((loaded, "PARSED"))
}
