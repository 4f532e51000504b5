//! Directory catalog for the confined tree
//!
//! Lists direct children only, re-stats each one, classifies it and sorts the
//! result. Nothing is cached: the directory on disk is the only source of
//! truth, and listings are eager (no pagination).

use crate::confine::ResolvedPath;
use crate::error::{ConsoleError, ConsoleResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tokio::fs;
use tracing::{debug, warn};

pub const FOLDER_TAG: &str = "folder";

/// Field a listing is sorted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Name,
    Date,
    Type,
    Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SortKey {
    pub field: SortField,
    pub order: SortOrder,
}

/// One child of a listed directory
#[derive(Debug, Clone, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub relative_path: String,
    pub is_directory: bool,
    pub modified: DateTime<Utc>,
    /// `None` for directories
    pub size: Option<u64>,
    pub type_tag: String,
}

/// Sorted entries plus non-fatal problems met while listing
#[derive(Debug, Default, Serialize)]
pub struct Listing {
    pub entries: Vec<DirEntry>,
    pub warnings: Vec<String>,
}

impl SortField {
    /// Lenient parse of a query value; unknown values sort by name
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "date" => SortField::Date,
            "type" => SortField::Type,
            "size" => SortField::Size,
            _ => SortField::Name,
        }
    }
}

impl SortOrder {
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }
}

impl SortKey {
    pub fn new(field: SortField, order: SortOrder) -> Self {
        Self { field, order }
    }

    pub fn from_query(sort: Option<&str>, order: Option<&str>) -> Self {
        Self {
            field: sort.map(SortField::parse).unwrap_or_default(),
            order: order.map(SortOrder::parse).unwrap_or_default(),
        }
    }
}

impl DirEntry {
    fn from_metadata(parent: &ResolvedPath, name: String, meta: &Metadata) -> Self {
        let is_directory = meta.is_dir();
        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| DateTime::<Utc>::from(UNIX_EPOCH));

        DirEntry {
            relative_path: parent.child_relative(&name),
            type_tag: type_tag(&name, is_directory),
            size: (!is_directory).then(|| meta.len()),
            is_directory,
            modified,
            name,
        }
    }

    fn sort_size(&self) -> u64 {
        self.size.unwrap_or(0)
    }
}

/// `"folder"`, the lowercased extension with its dot, or `""`
pub fn type_tag(name: &str, is_directory: bool) -> String {
    if is_directory {
        return FOLDER_TAG.to_string();
    }
    Path::new(name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Outcome of a failed `read_dir`: permission problems still render
fn unreadable(dir: &ResolvedPath, e: io::Error) -> ConsoleResult<Listing> {
    if e.kind() != io::ErrorKind::PermissionDenied {
        return Err(ConsoleError::io(dir.relative(), e));
    }
    warn!(path = dir.relative(), "directory not readable");
    Ok(Listing {
        entries: Vec::new(),
        warnings: vec!["Insufficient permissions to read directory contents.".to_string()],
    })
}

/// List the direct children of `dir`, sorted by `key`
pub async fn list(dir: &ResolvedPath, key: SortKey) -> ConsoleResult<Listing> {
    let meta = fs::metadata(dir.as_path())
        .await
        .map_err(|e| ConsoleError::from_stat(dir.relative(), e))?;
    if !meta.is_dir() {
        return Err(ConsoleError::NotAFolder {
            path: dir.relative().to_string(),
        });
    }

    let mut listing = Listing::default();
    let mut reader = match fs::read_dir(dir.as_path()).await {
        Ok(reader) => reader,
        Err(e) => return unreadable(dir, e),
    };

    loop {
        let entry = match reader.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(path = dir.relative(), "directory enumeration interrupted: {}", e);
                listing
                    .warnings
                    .push(format!("Listing of {:?} is incomplete: {}", dir.relative(), e));
                break;
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        match fs::metadata(entry.path()).await {
            Ok(meta) => listing.entries.push(DirEntry::from_metadata(dir, name, &meta)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(name = %name, "entry vanished during listing");
            }
            Err(e) => {
                warn!(name = %name, "cannot stat entry: {}", e);
                listing
                    .warnings
                    .push(format!("Could not read {:?}: {}", dir.child_relative(&name), e));
            }
        }
    }

    sort_entries(&mut listing.entries, key);
    Ok(listing)
}

/// Sort in place; equal keys fall back to name order (always ascending)
pub fn sort_entries(entries: &mut [DirEntry], key: SortKey) {
    entries.sort_by(|a, b| {
        let primary = match key.field {
            SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortField::Date => a.modified.cmp(&b.modified),
            SortField::Type => (a.type_tag.as_str(), a.name.to_lowercase())
                .cmp(&(b.type_tag.as_str(), b.name.to_lowercase())),
            SortField::Size => a.sort_size().cmp(&b.sort_size()),
        };
        let primary = match key.order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        primary.then_with(|| by_name(a, b))
    });
}

fn by_name(a: &DirEntry, b: &DirEntry) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.name.cmp(&b.name))
}
