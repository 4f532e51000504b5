//! JSON views: raw core values plus their human-readable renderings

use panel_core::format::{human_size, human_timestamp};
use panel_core::{DirEntry, ListingView, MetricsSnapshot};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct EntryView {
    #[serde(flatten)]
    pub entry: DirEntry,
    pub modified_display: String,
    pub size_display: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MonitoringView {
    #[serde(flatten)]
    pub snapshot: MetricsSnapshot,
    pub cpu_temp_display: String,
    pub selected_temp_display: String,
    pub mem_total_display: String,
    pub mem_used_display: String,
    pub disk_total_display: String,
    pub disk_used_display: String,
    pub disk_free_display: String,
    /// Seconds the client should wait before polling again
    pub refresh_secs: f64,
}

#[derive(Debug, Serialize)]
pub struct ListingResponse {
    pub path: String,
    pub parent_path: String,
    pub entries: Vec<EntryView>,
    pub warnings: Vec<String>,
    pub metrics: MonitoringView,
}

impl From<DirEntry> for EntryView {
    fn from(entry: DirEntry) -> Self {
        Self {
            modified_display: human_timestamp(entry.modified),
            size_display: entry.size.map(human_size),
            entry,
        }
    }
}

impl MonitoringView {
    pub fn new(snapshot: MetricsSnapshot, refresh_secs: f64) -> Self {
        let disk = snapshot.disk.value().copied();
        let disk_field = |f: fn(&panel_core::metrics::DiskUsage) -> u64| {
            disk.as_ref().map_or_else(|| "N/A".to_string(), |d| human_size(f(d)))
        };

        Self {
            cpu_temp_display: snapshot.cpu_temp.display("°C"),
            selected_temp_display: snapshot.selected_temp.display("°C"),
            mem_total_display: human_size(snapshot.mem_total),
            mem_used_display: human_size(snapshot.mem_used),
            disk_total_display: disk_field(|d| d.total),
            disk_used_display: disk_field(|d| d.used),
            disk_free_display: disk_field(|d| d.free),
            refresh_secs,
            snapshot,
        }
    }
}

impl ListingResponse {
    pub fn new(view: ListingView, refresh_secs: f64) -> Self {
        Self {
            path: view.path,
            parent_path: view.parent_path,
            entries: view.entries.into_iter().map(EntryView::from).collect(),
            warnings: view.warnings,
            metrics: MonitoringView::new(view.metrics, refresh_secs),
        }
    }
}
