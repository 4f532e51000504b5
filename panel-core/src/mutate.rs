//! File mutations scoped to the confined root
//!
//! Each operation resolves its path through [`ConfinedRoot::resolve`] first.
//! Nothing here is transactional: a recursive delete that fails partway
//! leaves the tree partially removed, and that outcome is reported as an
//! `IoFailure` rather than hidden.

use crate::confine::{sanitize_name, ConfinedRoot, ResolvedPath};
use crate::error::{ConsoleError, ConsoleResult};
use serde::Serialize;
use tokio::fs;
use tracing::{info, warn};

/// Outcome of a bulk delete, item by item
#[derive(Debug, Default, Serialize)]
pub struct BulkReport {
    pub deleted: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Serialize)]
pub struct ItemFailure {
    pub path: String,
    pub reason: String,
}

impl BulkReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Delete / create / edit operations on one confined root
pub struct FileMutator<'a> {
    root: &'a ConfinedRoot,
}

impl<'a> FileMutator<'a> {
    pub fn new(root: &'a ConfinedRoot) -> Self {
        Self { root }
    }

    /// Remove a regular file
    pub async fn delete_file(&self, path: &str) -> ConsoleResult<()> {
        let target = self.root.resolve(path)?;
        let meta = stat(&target).await?;
        if !meta.is_file() {
            return Err(ConsoleError::NotAFile {
                path: target.relative().to_string(),
            });
        }

        fs::remove_file(target.as_path())
            .await
            .map_err(|e| ConsoleError::io(target.relative(), e))?;
        info!(path = target.relative(), "file deleted");
        Ok(())
    }

    /// Remove a directory and everything below it
    pub async fn delete_folder(&self, path: &str) -> ConsoleResult<()> {
        let target = self.root.resolve(path)?;
        if target.is_root() {
            warn!("refusing to delete the confined root");
            return Err(ConsoleError::AccessDenied);
        }
        let meta = stat(&target).await?;
        if !meta.is_dir() {
            return Err(ConsoleError::NotAFolder {
                path: target.relative().to_string(),
            });
        }

        fs::remove_dir_all(target.as_path())
            .await
            .map_err(|e| ConsoleError::io(target.relative(), e))?;
        info!(path = target.relative(), "folder deleted");
        Ok(())
    }

    /// Delete every path independently, dispatching on its actual type
    pub async fn delete_bulk<S: AsRef<str>>(&self, paths: &[S]) -> BulkReport {
        let mut report = BulkReport::default();

        for path in paths {
            let path = path.as_ref();
            match self.delete_any(path).await {
                Ok(()) => report.deleted.push(path.to_string()),
                Err(e) => {
                    warn!(path, "bulk delete item failed: {}", e);
                    report.failures.push(ItemFailure {
                        path: path.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            deleted = report.deleted.len(),
            failed = report.failures.len(),
            "bulk delete finished"
        );
        report
    }

    async fn delete_any(&self, path: &str) -> ConsoleResult<()> {
        let target = self.root.resolve(path)?;
        let meta = stat(&target).await?;
        if meta.is_dir() {
            self.delete_folder(path).await
        } else {
            self.delete_file(path).await
        }
    }

    /// Create `name` (sanitized) inside `parent`; returns its relative path
    pub async fn create_folder(&self, parent: &str, name: &str) -> ConsoleResult<String> {
        let name = name.trim();
        let invalid = || ConsoleError::InvalidName {
            name: name.to_string(),
        };
        if name.is_empty() {
            return Err(invalid());
        }
        let safe = sanitize_name(name).ok_or_else(invalid)?;

        let parent = self.root.resolve(parent)?;
        let meta = stat(&parent).await?;
        if !meta.is_dir() {
            return Err(ConsoleError::NotAFolder {
                path: parent.relative().to_string(),
            });
        }

        let relative = parent.child_relative(&safe);
        fs::create_dir(parent.as_path().join(&safe))
            .await
            .map_err(|e| ConsoleError::io(relative.as_str(), e))?;
        info!(path = %relative, "folder created");
        Ok(relative)
    }

    /// Whole-file UTF-8 read for the edit flow
    pub async fn read_file(&self, path: &str) -> ConsoleResult<String> {
        let target = self.existing_file(path).await?;
        fs::read_to_string(target.as_path())
            .await
            .map_err(|e| ConsoleError::io(target.relative(), e))
    }

    /// Replace the content of an existing file
    pub async fn write_file(&self, path: &str, content: &str) -> ConsoleResult<()> {
        let target = self.existing_file(path).await?;
        fs::write(target.as_path(), content)
            .await
            .map_err(|e| ConsoleError::io(target.relative(), e))?;
        info!(path = target.relative(), bytes = content.len(), "file updated");
        Ok(())
    }

    /// Resolve `path` and require a regular file behind it
    pub async fn existing_file(&self, path: &str) -> ConsoleResult<ResolvedPath> {
        let target = self.root.resolve(path)?;
        let meta = stat(&target).await?;
        if !meta.is_file() {
            return Err(ConsoleError::NotAFile {
                path: target.relative().to_string(),
            });
        }
        Ok(target)
    }
}

async fn stat(target: &ResolvedPath) -> ConsoleResult<std::fs::Metadata> {
    fs::metadata(target.as_path())
        .await
        .map_err(|e| ConsoleError::from_stat(target.relative(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use panel_devkit::TestTree;

    fn setup() -> (TestTree, ConfinedRoot) {
        let tree = TestTree::new();
        let root = ConfinedRoot::new(tree.root()).unwrap();
        (tree, root)
    }

    #[tokio::test]
    async fn test_delete_file() {
        let (tree, root) = setup();
        tree.file("roms/game.zip", "x");
        tree.dir("roms/saves");
        let mutator = FileMutator::new(&root);

        mutator.delete_file("roms/game.zip").await.unwrap();
        assert!(!tree.exists("roms/game.zip"));

        let err = mutator.delete_file("roms/saves").await.unwrap_err();
        assert!(matches!(err, ConsoleError::NotAFile { .. }));
        let err = mutator.delete_file("roms/game.zip").await.unwrap_err();
        assert!(matches!(err, ConsoleError::NotFound { .. }));
        let err = mutator.delete_file("../outside").await.unwrap_err();
        assert!(matches!(err, ConsoleError::AccessDenied));
    }

    #[tokio::test]
    async fn test_delete_folder_is_recursive() {
        let (tree, root) = setup();
        tree.file("roms/snes/a.sfc", "a");
        tree.file("roms/snes/deep/b.sfc", "b");
        tree.file("keep.txt", "k");
        let mutator = FileMutator::new(&root);

        mutator.delete_folder("roms/snes").await.unwrap();
        assert!(!tree.exists("roms/snes"));
        assert!(tree.exists("roms"));

        let err = mutator.delete_folder("keep.txt").await.unwrap_err();
        assert!(matches!(err, ConsoleError::NotAFolder { .. }));
        let err = mutator.delete_folder("").await.unwrap_err();
        assert!(matches!(err, ConsoleError::AccessDenied));
        assert!(tree.root().exists());
    }

    #[tokio::test]
    async fn test_bulk_delete_continues_past_failures() {
        let (tree, root) = setup();
        tree.file("one.txt", "1");
        tree.file("three/inner.txt", "3");
        let mutator = FileMutator::new(&root);

        let report = mutator
            .delete_bulk(&["one.txt", "two.txt", "three"])
            .await;

        assert_eq!(report.deleted, ["one.txt", "three"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, "two.txt");
        assert!(!report.is_clean());
        assert!(!tree.exists("one.txt"));
        assert!(!tree.exists("three"));
    }

    #[tokio::test]
    async fn test_bulk_delete_reports_escapes_per_item() {
        let (tree, root) = setup();
        tree.file("a.txt", "a");
        let mutator = FileMutator::new(&root);

        let report = mutator.delete_bulk(&["../../etc/passwd", "a.txt"]).await;
        assert_eq!(report.deleted, ["a.txt"]);
        assert_eq!(report.failures[0].reason, "Access denied");
    }

    #[tokio::test]
    async fn test_create_folder_sanitizes_name() {
        let (tree, root) = setup();
        tree.dir("roms");
        let mutator = FileMutator::new(&root);

        let created = mutator.create_folder("roms", "../evil").await.unwrap();
        assert_eq!(created, "roms/evil");
        assert!(tree.path("roms/evil").is_dir());
        assert!(!tree.root().parent().unwrap().join("evil").exists());

        let created = mutator.create_folder("", "new saves").await.unwrap();
        assert_eq!(created, "new_saves");
    }

    #[tokio::test]
    async fn test_create_folder_rejections() {
        let (tree, root) = setup();
        tree.dir("existing");
        tree.file("file.txt", "x");
        let mutator = FileMutator::new(&root);

        for bad in ["", "   ", "..", "/"] {
            let err = mutator.create_folder("", bad).await.unwrap_err();
            assert!(matches!(err, ConsoleError::InvalidName { .. }), "{bad:?}");
        }

        let err = mutator.create_folder("", "existing").await.unwrap_err();
        assert!(matches!(err, ConsoleError::IoFailure { ref path, .. } if path == "existing"));

        let err = mutator.create_folder("file.txt", "child").await.unwrap_err();
        assert!(matches!(err, ConsoleError::NotAFolder { .. }));
    }

    #[tokio::test]
    async fn test_write_then_read_round_trip() {
        let (tree, root) = setup();
        tree.file("configs/retroarch.cfg", "old");
        let mutator = FileMutator::new(&root);

        let content = "video_smooth = \"true\"\n# ünïcødé ✓ 日本語\n";
        mutator.write_file("configs/retroarch.cfg", content).await.unwrap();
        assert_eq!(mutator.read_file("configs/retroarch.cfg").await.unwrap(), content);

        mutator.write_file("configs/retroarch.cfg", "").await.unwrap();
        assert_eq!(mutator.read_file("configs/retroarch.cfg").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_edit_requires_existing_file() {
        let (tree, root) = setup();
        tree.dir("configs");
        tree.file("blob.bin", [0xff, 0xfe, 0x00]);
        let mutator = FileMutator::new(&root);

        let err = mutator.write_file("configs", "x").await.unwrap_err();
        assert!(matches!(err, ConsoleError::NotAFile { .. }));
        let err = mutator.read_file("nope.txt").await.unwrap_err();
        assert!(matches!(err, ConsoleError::NotFound { .. }));
        let err = mutator.read_file("blob.bin").await.unwrap_err();
        assert!(matches!(err, ConsoleError::IoFailure { .. }));
    }
}
