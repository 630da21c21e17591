//! Segment directory: the public location the transcoder writes HLS output into.
//!
//! Only two writers touch this directory: the active transcoder process and
//! [purge](SegmentDirectory::purge). Everything in it is served read-only
//! under the configured public mount.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Well-known playlist file name.
pub const PLAYLIST_FILE: &str = "stream.m3u8";

/// Segment file name pattern handed to the transcoder.
pub const SEGMENT_PATTERN: &str = "segment_%03d.ts";

/// Outcome of a best-effort purge.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    pub removed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct SegmentDirectory {
    root: PathBuf,
}

impl SegmentDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn playlist_path(&self) -> PathBuf {
        self.root.join(PLAYLIST_FILE)
    }

    pub fn segment_pattern_path(&self) -> PathBuf {
        self.root.join(SEGMENT_PATTERN)
    }

    /// Create the directory if it does not exist yet.
    pub async fn ensure(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create segment directory '{}'", self.root.display()))
    }

    /// Fresh existence check of the playlist file. Independent of any
    /// in-memory stream state.
    pub async fn playlist_exists(&self) -> bool {
        tokio::fs::try_exists(self.playlist_path())
            .await
            .unwrap_or(false)
    }

    /// Names of the playlist and segment files currently on disk, sorted.
    pub async fn artifacts(&self) -> Vec<String> {
        let mut names = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.root).await else {
            return names;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_stream_artifact(&name) {
                names.push(name);
            }
        }
        names.sort();
        names
    }

    /// Delete every playlist and segment file. Individual failures are
    /// logged and counted, never returned.
    pub async fn purge(&self) -> PurgeReport {
        let mut report = PurgeReport::default();

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
            Err(e) => {
                warn!(
                    error_kind = "FilesystemCleanupFailure",
                    dir = %self.root.display(),
                    error = %e,
                    "Failed to read segment directory"
                );
                report.failed += 1;
                return report;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(
                        error_kind = "FilesystemCleanupFailure",
                        dir = %self.root.display(),
                        error = %e,
                        "Failed to list segment directory"
                    );
                    report.failed += 1;
                    break;
                }
            };

            let name = entry.file_name().to_string_lossy().to_string();
            if !is_stream_artifact(&name) {
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => report.removed += 1,
                // Already rotated away by the transcoder
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(
                        error_kind = "FilesystemCleanupFailure",
                        file = %entry.path().display(),
                        error = %e,
                        "Failed to delete stream artifact"
                    );
                    report.failed += 1;
                }
            }
        }

        debug!(
            dir = %self.root.display(),
            removed = report.removed,
            failed = report.failed,
            "Segment directory purged"
        );
        report
    }
}

/// Playlist, segment, and the transcoder's temporary playlist files.
fn is_stream_artifact(name: &str) -> bool {
    name.ends_with(".m3u8") || name.ends_with(".ts") || name.ends_with(".m3u8.tmp")
}
