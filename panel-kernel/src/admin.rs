/**
 * ADMINISTRATION DU PI - Alimentation, service, réglages, config.txt
 *
 * RÔLE : Handlers des actions privilégiées. Les commandes système passent
 * par `CommandExecutor`; les réglages modifient la config partagée puis la
 * persistent sur disque.
 */

use crate::error::ApiError;
use crate::http::AppState;
use axum::extract::State;
use axum::Json;
use panel_core::{Console, ExecutionResult, PanelConfig, PowerAction, ServiceAction, SettingsUpdate};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct ActionBody {
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct BootConfigBody {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub changes: Vec<String>,
    pub settings: PanelConfig,
}

// POST /api/control {action: reboot|shutdown}
pub async fn control(
    State(app): State<AppState>,
    Json(body): Json<ActionBody>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let action: PowerAction = body
        .action
        .parse()
        .map_err(|e: anyhow::Error| ApiError::BadRequest(e.to_string()))?;

    let cfg = app.snapshot();
    let result = Console::new(&cfg, &app.probe).power(action).await?;
    Ok(Json(result))
}

// POST /api/service {action: restart|enable|disable|stop}
pub async fn service(
    State(app): State<AppState>,
    Json(body): Json<ActionBody>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let action: ServiceAction = body
        .action
        .parse()
        .map_err(|e: anyhow::Error| ApiError::BadRequest(e.to_string()))?;

    let cfg = app.snapshot();
    let result = Console::new(&cfg, &app.probe).service(action).await?;
    Ok(Json(result))
}

// GET /api/settings
pub async fn get_settings(State(app): State<AppState>) -> Json<PanelConfig> {
    Json(app.snapshot().redacted())
}

// POST /api/settings
pub async fn update_settings(
    State(app): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let (changes, updated) = {
        let mut cfg = app.cfg.lock();
        let changes = cfg.apply(update);
        (changes, cfg.clone())
    };
    updated.save_to(&app.config_path).await?;

    info!("Settings updated: {:?}", changes);
    Ok(Json(SettingsResponse {
        changes,
        settings: updated.redacted(),
    }))
}

// GET /api/boot-config
pub async fn read_boot_config(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cfg = app.snapshot();
    let content = Console::new(&cfg, &app.probe).read_boot_config().await?;
    Ok(Json(serde_json::json!({
        "path": cfg.config_location.path(),
        "content": content,
    })))
}

// PUT /api/boot-config
pub async fn write_boot_config(
    State(app): State<AppState>,
    Json(body): Json<BootConfigBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cfg = app.snapshot();
    Console::new(&cfg, &app.probe)
        .write_boot_config(&body.content)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true, "message": "Boot config saved" })))
}
