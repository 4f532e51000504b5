/**
 * PI PANEL KERNEL - Point d'entrée du serveur d'administration
 *
 * RÔLE : Charge la config, installe le logging, construit l'état partagé et
 * sert l'API HTTP.
 *
 * ARCHITECTURE : API REST Axum devant `panel_core` (fichiers confinés +
 * monitoring), config TOML relue à chaque requête.
 * UTILITÉ : Administration d'un Raspberry Pi depuis un navigateur.
 */

mod admin;
mod error;
mod health;
mod http;
mod state;
mod transfer;
mod views;

use crate::http::AppState;
use anyhow::{Context, Result};
use panel_core::PanelConfig;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("panel_kernel=info,panel_core=info")),
        )
        .init();

    // config partagée
    let config_path = PanelConfig::config_file_path()?;
    let cfg = PanelConfig::load_from(&config_path)
        .await
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    info!("Config loaded from {}", config_path.display());

    if !cfg.root_dir.is_dir() {
        warn!(
            "Root directory {} does not exist, file operations will fail",
            cfg.root_dir.display()
        );
    }
    if cfg.login == "admin" && cfg.password == "admin" {
        warn!("SECURITY: default credentials in use, change them in settings");
    }

    let port = cfg.port;
    let app_state = AppState::new(cfg, config_path);

    // HTTP
    let app = http::build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("listening on http://{addr}");
    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}
