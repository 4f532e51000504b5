//! Pi Panel core
//!
//! Confined file management and host monitoring for a single-board
//! computer. Every filesystem operation goes through [`ConfinedRoot`],
//! the HTTP layer only talks to [`Console`].

pub mod catalog;
pub mod config;
pub mod confine;
pub mod console;
pub mod error;
pub mod execution;
pub mod format;
pub mod metrics;
pub mod mutate;
pub mod upload;

pub use catalog::{DirEntry, Listing, SortField, SortKey, SortOrder};
pub use config::{BootConfigLocation, PanelConfig, SettingsUpdate};
pub use confine::{ConfinedRoot, ResolvedPath};
pub use console::{Console, ListingView};
pub use error::{ConsoleError, ConsoleResult};
pub use execution::{CommandExecutor, ExecutionResult, PowerAction, ServiceAction};
pub use metrics::{MetricsSnapshot, MonitorProbe, Reading};
pub use mutate::BulkReport;
pub use upload::{UploadOutcome, UploadReport, UploadSession};
