/**
 * API REST PI PANEL - Serveur HTTP du panneau d'administration
 *
 * RÔLE :
 * Expose le gestionnaire de fichiers confiné et le monitoring du Pi.
 * Chaque handler lit un instantané de la config puis délègue à `Console`.
 *
 * FONCTIONNEMENT :
 * - Routes : /health, /api/files, /api/monitoring, /api/edit, /api/delete*,
 *   /api/folders, /api/upload, /api/download, /api/control, /api/service,
 *   /api/settings, /api/boot-config
 * - Réponses JSON, erreurs via `ApiError`
 *
 * SÉCURITÉ :
 * - HTTP Basic obligatoire sur toutes les routes sauf /health
 * - Identifiants relus dans la config à chaque requête
 */

use crate::admin;
use crate::error::ApiError;
use crate::health::{HealthTracker, KernelHealth};
use crate::state::{new_state, Shared};
use crate::transfer;
use crate::views::{ListingResponse, MonitoringView};
use axum::extract::{DefaultBodyLimit, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::headers::authorization::Basic;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use panel_core::{BulkReport, Console, MonitorProbe, PanelConfig, SortKey};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Shared<PanelConfig>,
    pub config_path: Arc<PathBuf>,
    pub probe: Arc<MonitorProbe>,
    pub health_tracker: HealthTracker,
}

impl AppState {
    pub fn new(cfg: PanelConfig, config_path: PathBuf) -> Self {
        Self {
            cfg: new_state(cfg),
            config_path: Arc::new(config_path),
            probe: Arc::new(MonitorProbe::new()),
            health_tracker: HealthTracker::new(),
        }
    }

    /// Config as of the start of the request
    pub fn snapshot(&self) -> PanelConfig {
        self.cfg.lock().clone()
    }

    pub fn check_credentials(&self, login: &str, password: &str) -> bool {
        let cfg = self.cfg.lock();
        cfg.login == login && cfg.password == password
    }

    /// Persist a new preferred sensor; a failed save is only logged
    pub async fn remember_sensor(&self, sensor: &str) {
        let sensor = sensor.trim();
        let updated = {
            let mut cfg = self.cfg.lock();
            if cfg.ssd_sensor == sensor {
                return;
            }
            cfg.ssd_sensor = sensor.to_string();
            cfg.clone()
        };
        info!("Preferred sensor set to {:?}", sensor);
        if let Err(e) = updated.save_to(&self.config_path).await {
            warn!("Failed to persist sensor preference: {:#}", e);
        }
    }
}

async fn require_basic_auth(
    State(app): State<AppState>,
    auth: Option<TypedHeader<Authorization<Basic>>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // Health check toujours accessible
    if req.uri().path().starts_with("/health") {
        return Ok(next.run(req).await);
    }

    let ok = auth
        .map(|TypedHeader(header)| app.check_credentials(header.username(), header.password()))
        .unwrap_or(false);

    if !ok {
        warn!("Unauthorized request to {}", req.uri().path());
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/api/monitoring", get(get_monitoring))
        .route("/api/files", get(list_files))
        .route("/api/download", get(transfer::download))
        .route("/api/edit", get(read_file).put(write_file))
        .route("/api/delete", post(delete_file))
        .route("/api/delete-folder", post(delete_folder))
        .route("/api/delete-bulk", post(delete_bulk))
        .route("/api/folders", post(create_folder))
        .route(
            "/api/upload",
            post(transfer::upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/control", post(admin::control))
        .route("/api/service", post(admin::service))
        .route("/api/settings", get(admin::get_settings).post(admin::update_settings))
        .route(
            "/api/boot-config",
            get(admin::read_boot_config).put(admin::write_boot_config),
        )
        .with_state(app_state.clone())
        .layer(middleware::from_fn_with_state(app_state, require_basic_auth))
}

#[derive(Debug, Default, Deserialize)]
pub struct PathQuery {
    pub path: Option<String>,
}

impl PathQuery {
    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub path: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub ssd_sensor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SensorQuery {
    pub ssd_sensor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditBody {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkBody {
    pub paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FolderBody {
    #[serde(default)]
    pub path: String,
    pub name: String,
}

// GET /health
async fn get_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health())
}

// GET /api/monitoring?ssd_sensor=
async fn get_monitoring(
    State(app): State<AppState>,
    Query(q): Query<SensorQuery>,
) -> Json<MonitoringView> {
    let cfg = app.snapshot();
    let snapshot = Console::new(&cfg, &app.probe)
        .poll_metrics(q.ssd_sensor.as_deref())
        .await;
    Json(MonitoringView::new(snapshot, cfg.monitor_refresh))
}

// GET /api/files?path=&sort=&order=&ssd_sensor=
async fn list_files(
    State(app): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<ListingResponse>, ApiError> {
    let chosen = q.ssd_sensor.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if let Some(sensor) = chosen {
        app.remember_sensor(sensor).await;
    }

    let cfg = app.snapshot();
    let sort = SortKey::from_query(q.sort.as_deref(), q.order.as_deref());
    let view = Console::new(&cfg, &app.probe)
        .render_listing(q.path.as_deref().unwrap_or(""), sort, chosen)
        .await?;
    Ok(Json(ListingResponse::new(view, cfg.monitor_refresh)))
}

// GET /api/edit?path=
async fn read_file(
    State(app): State<AppState>,
    Query(q): Query<PathQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cfg = app.snapshot();
    let content = Console::new(&cfg, &app.probe).read_file(q.path()).await?;
    Ok(Json(serde_json::json!({ "path": q.path(), "content": content })))
}

// PUT /api/edit?path=
async fn write_file(
    State(app): State<AppState>,
    Query(q): Query<PathQuery>,
    Json(body): Json<EditBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cfg = app.snapshot();
    Console::new(&cfg, &app.probe)
        .write_file(q.path(), &body.content)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true, "message": "File saved successfully" })))
}

// POST /api/delete?path=
async fn delete_file(
    State(app): State<AppState>,
    Query(q): Query<PathQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cfg = app.snapshot();
    Console::new(&cfg, &app.probe).delete_file(q.path()).await?;
    Ok(Json(serde_json::json!({ "ok": true, "message": "File deleted" })))
}

// POST /api/delete-folder?path=
async fn delete_folder(
    State(app): State<AppState>,
    Query(q): Query<PathQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cfg = app.snapshot();
    Console::new(&cfg, &app.probe).delete_folder(q.path()).await?;
    Ok(Json(serde_json::json!({ "ok": true, "message": "Folder deleted" })))
}

// POST /api/delete-bulk {paths}
async fn delete_bulk(
    State(app): State<AppState>,
    Json(body): Json<BulkBody>,
) -> Result<Json<BulkReport>, ApiError> {
    let cfg = app.snapshot();
    let report = Console::new(&cfg, &app.probe).delete_bulk(&body.paths).await?;
    Ok(Json(report))
}

// POST /api/folders {path, name}
async fn create_folder(
    State(app): State<AppState>,
    Json(body): Json<FolderBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cfg = app.snapshot();
    let created = Console::new(&cfg, &app.probe)
        .create_folder(&body.path, &body.name)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true, "path": created })))
}
