//! Path confinement under a single authorized root
//!
//! Every filesystem-touching operation goes through [`ConfinedRoot::resolve`]:
//! - lexical normalization of the untrusted relative path (`.`/`..` collapse)
//! - canonicalization of the deepest existing ancestor (symlinks resolved)
//! - component-wise prefix check against the canonical root
//!
//! Any failure is reported as [`ConsoleError::AccessDenied`] without the
//! offending absolute path.

use crate::error::{ConsoleError, ConsoleResult};
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Canonical directory the console is allowed to touch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfinedRoot {
    root: PathBuf,
}

/// Absolute path proven to lie within a [`ConfinedRoot`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    absolute: PathBuf,
    relative: String,
}

impl ConfinedRoot {
    /// Canonicalize `path` and check that it is a directory
    pub fn new(path: impl AsRef<Path>) -> ConsoleResult<Self> {
        let root = std::fs::canonicalize(path.as_ref()).map_err(|e| ConsoleError::from_stat("", e))?;
        if !root.is_dir() {
            return Err(ConsoleError::NotAFolder { path: String::new() });
        }
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve an untrusted relative path against the root
    pub fn resolve(&self, relative: &str) -> ConsoleResult<ResolvedPath> {
        let segments = normalize(relative)?;
        let relative = segments.join("/");

        let Some((name, parents)) = segments.split_last() else {
            return Ok(ResolvedPath {
                absolute: self.root.clone(),
                relative,
            });
        };

        let mut parent = self.root.clone();
        parent.extend(parents);
        let parent = self.canonicalize_existing(&parent, &relative)?;
        let absolute = parent.join(name);

        // The final component stays un-dereferenced, but where it points must
        // still be inside the root.
        match std::fs::canonicalize(&absolute) {
            Ok(target) if target.starts_with(&self.root) => {}
            Ok(_) => return Err(self.denied(&relative)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if is_symlink(&absolute) {
                    return Err(self.denied(&relative));
                }
            }
            Err(e) => return Err(ConsoleError::io(relative, e)),
        }

        Ok(ResolvedPath { absolute, relative })
    }

    /// Canonical form of `path` where only a prefix of it may exist yet
    fn canonicalize_existing(&self, path: &Path, relative: &str) -> ConsoleResult<PathBuf> {
        let mut existing = path.to_path_buf();
        let mut tail = Vec::new();

        let canonical = loop {
            match std::fs::canonicalize(&existing) {
                Ok(canonical) => break canonical,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if is_symlink(&existing) {
                        return Err(self.denied(relative));
                    }
                    let (Some(name), Some(up)) = (existing.file_name(), existing.parent()) else {
                        return Err(self.denied(relative));
                    };
                    tail.push(name.to_os_string());
                    existing = up.to_path_buf();
                }
                Err(e) => return Err(ConsoleError::io(relative, e)),
            }
        };

        if !canonical.starts_with(&self.root) {
            return Err(self.denied(relative));
        }
        Ok(tail.into_iter().rev().fold(canonical, |acc, name| acc.join(name)))
    }

    fn denied(&self, relative: &str) -> ConsoleError {
        warn!(path = relative, "path escapes confined root");
        ConsoleError::AccessDenied
    }
}

impl ResolvedPath {
    pub fn as_path(&self) -> &Path {
        &self.absolute
    }

    /// Normalized relative form, `""` for the root itself
    pub fn relative(&self) -> &str {
        &self.relative
    }

    pub fn is_root(&self) -> bool {
        self.relative.is_empty()
    }

    /// Relative path of a direct child called `name`
    pub fn child_relative(&self, name: &str) -> String {
        if self.relative.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.relative, name)
        }
    }

    pub fn parent_relative(&self) -> String {
        parent_of(&self.relative)
    }
}

/// POSIX dirname of a relative path; `""` for top-level entries
pub fn parent_of(relative: &str) -> String {
    relative
        .trim_end_matches('/')
        .rsplit_once('/')
        .map(|(parent, _)| parent.to_string())
        .unwrap_or_default()
}

/// Reduce a user-supplied file or folder name to a safe single component
///
/// Separators become word breaks, whitespace runs become `_`, anything
/// outside `[A-Za-z0-9_.-]` is dropped and leading/trailing `.`/`_` are
/// trimmed. `None` when nothing usable is left.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let spaced: String = raw
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let filtered: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let trimmed = filtered.trim_matches(|c| c == '.' || c == '_');

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn normalize(relative: &str) -> ConsoleResult<Vec<String>> {
    if relative.contains('\0') || relative.starts_with('/') {
        return Err(ConsoleError::AccessDenied);
    }

    let mut segments: Vec<String> = Vec::new();
    for segment in relative.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(ConsoleError::AccessDenied);
                }
            }
            name => segments.push(name.to_string()),
        }
    }
    Ok(segments)
}

fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}
