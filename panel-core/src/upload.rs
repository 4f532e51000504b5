//! Streaming upload into the confined tree
//!
//! Bodies are copied through one fixed [`CHUNK_SIZE`] buffer, so memory use
//! does not depend on the payload size. An interrupted source stops the copy
//! and leaves the partial file in place: there is no resume and no automatic
//! cleanup.

use crate::confine::{sanitize_name, ConfinedRoot, ResolvedPath};
use crate::error::{ConsoleError, ConsoleResult};
use serde::Serialize;
use std::io;
use std::path::Path;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{info, warn};

/// Size of the single buffer used to copy an upload
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Result for one file of an upload request
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UploadOutcome {
    Stored { name: String, bytes: u64 },
    Skipped { reason: String },
    Failed { name: String, reason: String },
}

#[derive(Debug, Default, Serialize)]
pub struct UploadReport {
    pub directory: String,
    pub outcomes: Vec<UploadOutcome>,
}

impl UploadReport {
    pub fn stored(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, UploadOutcome::Stored { .. }))
            .count()
    }
}

/// Copy `source` into `dest` chunk by chunk
///
/// With `overwrite == false` an existing `dest` is refused
/// (`AlreadyExists`). Returns the number of bytes written.
pub async fn receive<R>(dest: &Path, source: &mut R, overwrite: bool) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut options = OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let mut file = options.open(dest).await?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        written += n as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// One upload request: a destination directory and the files sent to it
pub struct UploadSession {
    root: ConfinedRoot,
    dir: ResolvedPath,
    overwrite: bool,
    report: UploadReport,
}

impl UploadSession {
    /// Resolve the destination directory once for the whole request
    pub async fn open(root: &ConfinedRoot, dir: &str, overwrite: bool) -> ConsoleResult<Self> {
        let dir = root.resolve(dir)?;
        let meta = fs::metadata(dir.as_path())
            .await
            .map_err(|e| ConsoleError::from_stat(dir.relative(), e))?;
        if !meta.is_dir() {
            return Err(ConsoleError::NotAFolder {
                path: dir.relative().to_string(),
            });
        }

        Ok(Self {
            root: root.clone(),
            report: UploadReport {
                directory: dir.relative().to_string(),
                outcomes: Vec::new(),
            },
            dir,
            overwrite,
        })
    }

    /// Store one file; failures are recorded and do not affect siblings
    pub async fn receive<R>(&mut self, filename: &str, source: &mut R) -> &UploadOutcome
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let outcome = self.store(filename, source).await;
        self.report.outcomes.push(outcome);
        &self.report.outcomes[self.report.outcomes.len() - 1]
    }

    async fn store<R>(&self, filename: &str, source: &mut R) -> UploadOutcome
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if filename.trim().is_empty() {
            warn!(dir = self.dir.relative(), "upload part without a file name");
            return UploadOutcome::Skipped {
                reason: "One of the uploaded files has no name.".to_string(),
            };
        }
        let Some(name) = sanitize_name(filename) else {
            warn!(dir = self.dir.relative(), filename, "upload name has no usable characters");
            return UploadOutcome::Skipped {
                reason: format!("File name {filename:?} has no usable characters."),
            };
        };

        let dest = match self.destination(&name).await {
            Ok(dest) => dest,
            Err(e) => {
                return UploadOutcome::Failed {
                    reason: e.to_string(),
                    name,
                }
            }
        };
        match receive(dest.as_path(), source, self.overwrite).await {
            Ok(bytes) => {
                info!(path = dest.relative(), bytes, "file uploaded");
                UploadOutcome::Stored { name, bytes }
            }
            Err(e) => {
                warn!(path = dest.relative(), "upload failed: {}", e);
                UploadOutcome::Failed {
                    reason: ConsoleError::io(dest.relative(), e).to_string(),
                    name,
                }
            }
        }
    }

    /// Confined target for `name`; an existing symlink is never written through
    async fn destination(&self, name: &str) -> ConsoleResult<ResolvedPath> {
        let dest = self.root.resolve(&self.dir.child_relative(name))?;
        if self.overwrite {
            if let Ok(meta) = fs::symlink_metadata(dest.as_path()).await {
                if meta.file_type().is_symlink() {
                    warn!(path = dest.relative(), "refusing to overwrite through a symlink");
                    return Err(ConsoleError::AccessDenied);
                }
            }
        }
        Ok(dest)
    }

    pub fn finish(self) -> UploadReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panel_devkit::{pattern_byte, FailingReader, PatternReader, TestTree};
    use std::sync::atomic::Ordering;
    use tokio::io::BufReader;

    const FIFTY_MB: u64 = 50 * 1024 * 1024;

    #[tokio::test]
    async fn test_large_upload_is_byte_identical_and_chunked() {
        let tree = TestTree::new();
        let dest = tree.path("big.bin");
        let mut source = PatternReader::new(FIFTY_MB);
        let max_request = source.max_request();

        let written = receive(&dest, &mut source, false).await.unwrap();

        assert_eq!(written, FIFTY_MB);
        assert!(max_request.load(Ordering::Relaxed) <= CHUNK_SIZE);

        let file = tokio::fs::File::open(&dest).await.unwrap();
        assert_eq!(file.metadata().await.unwrap().len(), FIFTY_MB);
        let mut reader = BufReader::new(file);
        let mut buf = vec![0u8; 64 * 1024];
        let mut offset = 0u64;
        loop {
            let n = reader.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            for (i, byte) in buf[..n].iter().enumerate() {
                assert_eq!(*byte, pattern_byte(offset + i as u64), "mismatch at {}", offset + i as u64);
            }
            offset += n as u64;
        }
        assert_eq!(offset, FIFTY_MB);
    }

    #[tokio::test]
    async fn test_interrupted_upload_leaves_partial_file() {
        let tree = TestTree::new();
        let dest = tree.path("partial.bin");
        let mut source = FailingReader::new(20_000);

        let err = receive(&dest, &mut source, false).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 20_000);
    }

    #[tokio::test]
    async fn test_collision_policy() {
        let tree = TestTree::new();
        let dest = tree.file("save.srm", "original");

        let err = receive(&dest, &mut &b"new"[..], false).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(tree.read("save.srm"), b"original");

        receive(&dest, &mut &b"new"[..], true).await.unwrap();
        assert_eq!(tree.read("save.srm"), b"new");
    }

    #[tokio::test]
    async fn test_session_isolates_failures() {
        let tree = TestTree::new();
        tree.dir("roms");
        tree.file("roms/taken.zip", "old");
        let root = ConfinedRoot::new(tree.root()).unwrap();

        let mut session = UploadSession::open(&root, "roms", false).await.unwrap();
        session.receive("", &mut &b"orphan"[..]).await;
        session.receive("taken.zip", &mut &b"clash"[..]).await;
        session.receive("../../escape.zip", &mut &b"payload"[..]).await;
        session.receive("broken.zip", &mut FailingReader::new(10)).await;
        let report = session.finish();

        assert_eq!(report.directory, "roms");
        assert_eq!(report.outcomes.len(), 4);
        assert!(matches!(report.outcomes[0], UploadOutcome::Skipped { .. }));
        assert!(matches!(report.outcomes[1], UploadOutcome::Failed { ref name, .. } if name == "taken.zip"));
        assert!(matches!(
            report.outcomes[2],
            UploadOutcome::Stored { ref name, bytes: 7 } if name == "escape.zip"
        ));
        assert!(matches!(report.outcomes[3], UploadOutcome::Failed { .. }));
        assert_eq!(report.stored(), 1);

        assert_eq!(tree.read("roms/escape.zip"), b"payload");
        assert_eq!(tree.read("roms/taken.zip"), b"old");
        assert!(!tree.root().parent().unwrap().join("escape.zip").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_overwrite_never_follows_symlinks() {
        let tree = TestTree::new();
        tree.dir("roms");
        let outside = tree.sibling("outside");
        std::fs::write(outside.join("victim.txt"), "precious").unwrap();
        tree.symlink("roms/game.zip", &outside.join("victim.txt"));
        tree.file("roms/real.sav", "inside");
        tree.symlink("roms/alias.sav", &tree.path("roms/real.sav"));
        let root = ConfinedRoot::new(tree.root()).unwrap();

        let mut session = UploadSession::open(&root, "roms", true).await.unwrap();
        session.receive("game.zip", &mut &b"PWNED"[..]).await;
        session.receive("alias.sav", &mut &b"through link"[..]).await;
        session.receive("fresh.zip", &mut &b"ok"[..]).await;
        let report = session.finish();

        assert!(matches!(report.outcomes[0], UploadOutcome::Failed { ref name, .. } if name == "game.zip"));
        assert!(matches!(report.outcomes[1], UploadOutcome::Failed { ref name, .. } if name == "alias.sav"));
        assert_eq!(report.stored(), 1);
        assert_eq!(std::fs::read(outside.join("victim.txt")).unwrap(), b"precious");
        assert_eq!(tree.read("roms/real.sav"), b"inside");
        assert_eq!(tree.read("roms/fresh.zip"), b"ok");
    }

    #[tokio::test]
    async fn test_session_requires_confined_directory() {
        let tree = TestTree::new();
        tree.file("file.txt", "x");
        let root = ConfinedRoot::new(tree.root()).unwrap();

        assert!(matches!(
            UploadSession::open(&root, "../", false).await,
            Err(ConsoleError::AccessDenied)
        ));
        assert!(matches!(
            UploadSession::open(&root, "file.txt", false).await,
            Err(ConsoleError::NotAFolder { .. })
        ));
    }
}
