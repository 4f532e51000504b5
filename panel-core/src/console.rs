//! Console facade: the operations the HTTP layer calls
//!
//! A `Console` is built per request from the current configuration, so a
//! settings change takes effect on the next call. The confined root is
//! canonicalized on every operation.

use crate::catalog::{self, DirEntry, SortKey};
use crate::config::PanelConfig;
use crate::confine::ConfinedRoot;
use crate::error::{ConsoleError, ConsoleResult};
use crate::execution::{CommandExecutor, ExecutionResult, PowerAction, ServiceAction};
use crate::metrics::{MetricsSnapshot, MonitorProbe};
use crate::mutate::{BulkReport, FileMutator};
use crate::upload::UploadSession;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

const SERVICE_TIMEOUT_SECS: u32 = 30;

/// Everything the listing page needs
#[derive(Debug, Serialize)]
pub struct ListingView {
    pub path: String,
    pub parent_path: String,
    pub entries: Vec<DirEntry>,
    pub warnings: Vec<String>,
    pub metrics: MetricsSnapshot,
}

pub struct Console<'a> {
    config: &'a PanelConfig,
    probe: &'a MonitorProbe,
}

impl<'a> Console<'a> {
    pub fn new(config: &'a PanelConfig, probe: &'a MonitorProbe) -> Self {
        Self { config, probe }
    }

    fn root(&self) -> ConsoleResult<ConfinedRoot> {
        ConfinedRoot::new(&self.config.root_dir)
    }

    fn sensor<'s>(&'s self, preferred: Option<&'s str>) -> Option<&'s str> {
        preferred
            .filter(|s| !s.is_empty())
            .or_else(|| self.config.preferred_sensor())
    }

    /// Resolve, capture metrics, list
    pub async fn render_listing(
        &self,
        relative_dir: &str,
        sort: SortKey,
        preferred_sensor: Option<&str>,
    ) -> ConsoleResult<ListingView> {
        let root = self.root()?;
        let dir = root.resolve(relative_dir)?;
        let metrics = self.poll_metrics(preferred_sensor).await;
        let listing = catalog::list(&dir, sort).await?;

        Ok(ListingView {
            path: dir.relative().to_string(),
            parent_path: dir.parent_relative(),
            entries: listing.entries,
            warnings: listing.warnings,
            metrics,
        })
    }

    pub async fn poll_metrics(&self, preferred_sensor: Option<&str>) -> MetricsSnapshot {
        let settings = self.config.monitor_settings();
        self.probe.capture(&settings, self.sensor(preferred_sensor)).await
    }

    pub async fn delete_file(&self, path: &str) -> ConsoleResult<()> {
        let root = self.root()?;
        FileMutator::new(&root).delete_file(path).await
    }

    pub async fn delete_folder(&self, path: &str) -> ConsoleResult<()> {
        let root = self.root()?;
        FileMutator::new(&root).delete_folder(path).await
    }

    pub async fn delete_bulk<S: AsRef<str>>(&self, paths: &[S]) -> ConsoleResult<BulkReport> {
        let root = self.root()?;
        Ok(FileMutator::new(&root).delete_bulk(paths).await)
    }

    pub async fn create_folder(&self, parent: &str, name: &str) -> ConsoleResult<String> {
        let root = self.root()?;
        FileMutator::new(&root).create_folder(parent, name).await
    }

    pub async fn read_file(&self, path: &str) -> ConsoleResult<String> {
        let root = self.root()?;
        FileMutator::new(&root).read_file(path).await
    }

    pub async fn write_file(&self, path: &str, content: &str) -> ConsoleResult<()> {
        let root = self.root()?;
        FileMutator::new(&root).write_file(path, content).await
    }

    pub async fn begin_upload(&self, relative_dir: &str) -> ConsoleResult<UploadSession> {
        let root = self.root()?;
        UploadSession::open(&root, relative_dir, self.config.upload_overwrite).await
    }

    /// Absolute path and file name of a confined regular file
    pub async fn download_target(&self, path: &str) -> ConsoleResult<(PathBuf, String)> {
        let root = self.root()?;
        let target = FileMutator::new(&root).existing_file(path).await?;
        let name = target
            .as_path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok((target.as_path().to_path_buf(), name))
    }

    pub async fn read_boot_config(&self) -> ConsoleResult<String> {
        let path = self.config.config_location.path();
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConsoleError::io(path.display().to_string(), e))
    }

    pub async fn write_boot_config(&self, content: &str) -> ConsoleResult<()> {
        let path = self.config.config_location.path();
        tokio::fs::write(path, content)
            .await
            .map_err(|e| ConsoleError::io(path.display().to_string(), e))?;
        info!(path = %path.display(), "boot config updated");
        Ok(())
    }

    pub async fn power(&self, action: PowerAction) -> anyhow::Result<ExecutionResult> {
        CommandExecutor::execute_power_command(action).await
    }

    pub async fn service(&self, action: ServiceAction) -> anyhow::Result<ExecutionResult> {
        CommandExecutor::execute_service_command(action, &self.config.service_name, SERVICE_TIMEOUT_SECS)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Reading;
    use panel_devkit::TestTree;

    fn config_for(tree: &TestTree) -> PanelConfig {
        PanelConfig {
            root_dir: tree.root().to_path_buf(),
            sensor_timeout_secs: 1,
            ..PanelConfig::default()
        }
    }

    #[tokio::test]
    async fn test_render_listing() {
        let tree = TestTree::new();
        tree.file("roms/snes/b.sfc", vec![0u8; 10]);
        tree.file("roms/snes/a.sfc", vec![0u8; 20]);
        let config = config_for(&tree);
        let probe = MonitorProbe::new();
        let console = Console::new(&config, &probe);

        let view = console
            .render_listing("roms/snes", SortKey::default(), None)
            .await
            .unwrap();

        assert_eq!(view.path, "roms/snes");
        assert_eq!(view.parent_path, "roms");
        let names: Vec<&str> = view.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a.sfc", "b.sfc"]);
        assert!(view.metrics.sensors.is_empty());
        assert_eq!(view.metrics.selected_temp, Reading::Unavailable);
    }

    #[tokio::test]
    async fn test_render_listing_rejects_escape() {
        let tree = TestTree::new();
        let config = config_for(&tree);
        let probe = MonitorProbe::new();
        let console = Console::new(&config, &probe);

        let err = console
            .render_listing("../..", SortKey::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsoleError::AccessDenied));
    }

    #[tokio::test]
    async fn test_mutations_through_facade() {
        let tree = TestTree::new();
        tree.file("notes.txt", "v1");
        tree.file("old/a.txt", "a");
        let config = config_for(&tree);
        let probe = MonitorProbe::new();
        let console = Console::new(&config, &probe);

        console.write_file("notes.txt", "v2").await.unwrap();
        assert_eq!(console.read_file("notes.txt").await.unwrap(), "v2");

        assert_eq!(console.create_folder("", "saves").await.unwrap(), "saves");
        let report = console.delete_bulk(&["old", "ghost"]).await.unwrap();
        assert_eq!(report.deleted, ["old"]);
        assert_eq!(report.failures.len(), 1);

        let (path, name) = console.download_target("notes.txt").await.unwrap();
        assert_eq!(name, "notes.txt");
        assert!(path.starts_with(std::fs::canonicalize(tree.root()).unwrap()));
        assert!(matches!(
            console.download_target("saves").await,
            Err(ConsoleError::NotAFile { .. })
        ));
    }

    #[tokio::test]
    async fn test_upload_respects_overwrite_setting() {
        let tree = TestTree::new();
        tree.file("save.srm", "old");
        let mut config = config_for(&tree);
        let probe = MonitorProbe::new();

        {
            let console = Console::new(&config, &probe);
            let mut session = console.begin_upload("").await.unwrap();
            session.receive("save.srm", &mut &b"new"[..]).await;
            assert_eq!(session.finish().stored(), 0);
        }

        config.upload_overwrite = true;
        let console = Console::new(&config, &probe);
        let mut session = console.begin_upload("").await.unwrap();
        session.receive("save.srm", &mut &b"new"[..]).await;
        assert_eq!(session.finish().stored(), 1);
        assert_eq!(tree.read("save.srm"), b"new");
    }

    #[tokio::test]
    async fn test_missing_root_is_reported() {
        let tree = TestTree::new();
        let config = PanelConfig {
            root_dir: tree.path("does-not-exist"),
            ..PanelConfig::default()
        };
        let probe = MonitorProbe::new();
        let console = Console::new(&config, &probe);
        assert!(console.read_file("x").await.is_err());
    }
}
