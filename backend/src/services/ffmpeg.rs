//! FFmpeg command-line integration
//!
//! The transcoder is treated as an opaque process: this module only knows how
//! to ask whether it runs at all ([probe_capability](FfmpegService::probe_capability))
//! and how to build the live HLS command line ([live_hls_command](FfmpegService::live_hls_command)).

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::services::segments::SegmentDirectory;

/// Segment timing for the sliding-window playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HlsSettings {
    /// Target segment duration in seconds
    pub segment_seconds: u32,
    /// Number of segments kept in the playlist
    pub playlist_size: u32,
}

impl Default for HlsSettings {
    fn default() -> Self {
        Self {
            segment_seconds: 2,
            playlist_size: 5,
        }
    }
}

/// FFmpeg wrapper holding the executable path
#[derive(Debug, Clone)]
pub struct FfmpegService {
    ffmpeg_path: String,
}

impl FfmpegService {
    /// Create a new FFmpeg service using `ffmpeg` from PATH
    pub fn new() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }

    /// Create with a custom ffmpeg path
    pub fn with_ffmpeg_path(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.ffmpeg_path
    }

    /// Check whether ffmpeg can run in this environment.
    ///
    /// Runs `ffmpeg -version` and returns true only if it printed at least one
    /// line (stdout or stderr) and exited with status 0 within `timeout`.
    /// Spawn errors, non-zero exits and timeouts all yield false; a timed-out
    /// process is killed.
    pub async fn probe_capability(&self, timeout: Duration) -> bool {
        let mut child = match Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(ffmpeg = %self.ffmpeg_path, error = %e, "Failed to spawn ffmpeg for availability probe");
                return false;
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let run = async move {
            let ((out_lines, banner), (err_lines, _)) =
                tokio::join!(count_lines(stdout), count_lines(stderr));
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((out_lines + err_lines, banner, status))
        };

        match tokio::time::timeout(timeout, run).await {
            Ok(Ok((lines, banner, status))) => {
                let available = lines > 0 && status.success();
                if available {
                    info!(
                        ffmpeg = %self.ffmpeg_path,
                        version = banner.as_deref().unwrap_or(""),
                        "ffmpeg is available"
                    );
                } else {
                    warn!(
                        ffmpeg = %self.ffmpeg_path,
                        exit_code = ?status.code(),
                        output_lines = lines,
                        "ffmpeg availability probe failed"
                    );
                }
                available
            }
            Ok(Err(e)) => {
                warn!(ffmpeg = %self.ffmpeg_path, error = %e, "ffmpeg availability probe errored");
                false
            }
            Err(_) => {
                warn!(
                    ffmpeg = %self.ffmpeg_path,
                    timeout_ms = timeout.as_millis() as u64,
                    "ffmpeg availability probe timed out"
                );
                false
            }
        }
    }

    /// Argument template for the live sliding-window HLS output. Only the
    /// source address and the two output paths vary.
    pub fn live_hls_args(
        source_address: &str,
        segments: &SegmentDirectory,
        settings: HlsSettings,
    ) -> Vec<String> {
        let segment_pattern = segments.segment_pattern_path();
        let playlist = segments.playlist_path();

        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "warning".into(),
            "-y".into(),
            // Input
            "-i".into(),
            source_address.to_string(),
            // Web-compatible codec pair
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "veryfast".into(),
            "-tune".into(),
            "zerolatency".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "128k".into(),
            "-ac".into(),
            "2".into(),
            // Sliding-window live playlist
            "-f".into(),
            "hls".into(),
            "-hls_time".into(),
            settings.segment_seconds.to_string(),
            "-hls_list_size".into(),
            settings.playlist_size.to_string(),
            "-hls_flags".into(),
            "delete_segments+append_list".into(),
            "-hls_allow_cache".into(),
            "0".into(),
            "-hls_segment_filename".into(),
            segment_pattern.to_string_lossy().to_string(),
            playlist.to_string_lossy().to_string(),
        ]
    }

    /// Build the live HLS transcoding command with both output streams piped
    /// for diagnostics.
    pub fn live_hls_command(
        &self,
        source_address: &str,
        segments: &SegmentDirectory,
        settings: HlsSettings,
    ) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(Self::live_hls_args(source_address, segments, settings))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for FfmpegService {
    fn default() -> Self {
        Self::new()
    }
}

/// Count lines on an optional pipe, returning the first non-empty one.
async fn count_lines<R: AsyncRead + Unpin>(reader: Option<R>) -> (usize, Option<String>) {
    let Some(reader) = reader else {
        return (0, None);
    };
    let mut lines = BufReader::new(reader).lines();
    let mut count = 0;
    let mut first = None;
    while let Ok(Some(line)) = lines.next_line().await {
        if first.is_none() && !line.trim().is_empty() {
            debug!(line = %line, "ffmpeg probe output");
            first = Some(line);
        }
        count += 1;
    }
    (count, first)
}
