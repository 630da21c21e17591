//! Integration tests for the stream supervisor
//!
//! A generated shell script stands in for ffmpeg. It understands just enough
//! of the live HLS command line to behave like the real thing:
//! - `-version` prints a banner and exits 0
//! - sources containing `bad-host` print an error and exit 1 immediately
//! - sources containing `slow` wait a second before the first segment
//! - sources containing `drop` exit 3 one second after starting to write
//! - sources containing `eof` exit 0 one second after starting to write
//! - anything else writes a segment and playlist and runs until terminated
//!
//! Every live process records itself as `<live dir>/<pid>` containing its
//! source address; the file is removed when the process is terminated.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use tempfile::TempDir;
use tokio::sync::Mutex;

use livecast::services::stream::{StreamError, StreamErrorKind, StreamState};
use livecast::services::{HlsSettings, Service, StreamServiceConfig, StreamSupervisor};

/// Spawning while another test holds a freshly written script open for
/// writing fails with ETXTBSY, so these tests run one at a time.
static SERIAL: Mutex<()> = Mutex::const_new(());

const GRACE: Duration = Duration::from_millis(300);

// ============================================================================
// Fixtures
// ============================================================================

struct Fixture {
    _temp: TempDir,
    hls_dir: PathBuf,
    live_dir: PathBuf,
    ffmpeg: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let hls_dir = temp.path().join("hls");
        let live_dir = temp.path().join("live");
        std::fs::create_dir_all(&hls_dir).unwrap();
        std::fs::create_dir_all(&live_dir).unwrap();

        let ffmpeg = temp.path().join("ffmpeg");
        write_script(&ffmpeg, &fake_ffmpeg(&live_dir));

        Self {
            _temp: temp,
            hls_dir,
            live_dir,
            ffmpeg,
        }
    }

    fn supervisor(&self) -> Arc<StreamSupervisor> {
        supervisor_with(&self.ffmpeg, &self.hls_dir)
    }

    /// Sources of the fake transcoders currently alive.
    fn live_sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = std::fs::read_dir(&self.live_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter_map(|e| std::fs::read_to_string(e.path()).ok())
            .map(|s| s.trim().to_string())
            .collect();
        sources.sort();
        sources
    }
}

fn supervisor_with(ffmpeg: &Path, hls_dir: &Path) -> Arc<StreamSupervisor> {
    Arc::new(StreamSupervisor::new(StreamServiceConfig {
        ffmpeg_path: ffmpeg.to_string_lossy().to_string(),
        hls_dir: hls_dir.to_path_buf(),
        playlist_url: "http://relay.test:3001/hls/stream.m3u8".to_string(),
        grace_period: GRACE,
        probe_timeout: Duration::from_secs(2),
        hls: HlsSettings::default(),
    }))
}

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn fake_ffmpeg(live_dir: &Path) -> String {
    format!(
        r#"#!/bin/sh
LIVE="{live}"
if [ "$1" = "-version" ]; then
  echo "ffmpeg version 6.1-livecast-test Copyright (c) the FFmpeg developers"
  exit 0
fi

src=""
seg=""
last=""
while [ $# -gt 0 ]; do
  case "$1" in
    -i) src="$2"; shift ;;
    -hls_segment_filename) seg="$2"; shift ;;
  esac
  last="$1"
  shift
done

child=""
pause() {{
  sleep "$1" >/dev/null 2>&1 &
  child=$!
  wait $child
}}
trap 'kill $child 2>/dev/null; rm -f "$LIVE/$$"; exit 0' TERM

case "$src" in
  *bad-host*)
    echo "[tcp @ 0x55d0] Connection to tcp://bad-host:1935 failed: Connection refused" >&2
    echo "$src: Connection refused" >&2
    exit 1
    ;;
esac

echo "$src" > "$LIVE/$$"

case "$src" in
  *slow*) pause 1 ;;
esac

name=$(printf "$seg" 0)
echo "$src" > "$name"
printf '#EXTM3U\n#EXT-X-TARGETDURATION:2\n#EXTINF:2.0,\n%s\n' "$(basename "$name")" > "$last"

case "$src" in
  *drop*)
    pause 1
    echo "Input stream ended unexpectedly" >&2
    rm -f "$LIVE/$$"
    exit 3
    ;;
  *eof*)
    pause 1
    rm -f "$LIVE/$$"
    exit 0
    ;;
esac

pause 30
rm -f "$LIVE/$$"
"#,
        live = live_dir.display()
    )
}

async fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}

async fn started_supervisor(fixture: &Fixture) -> Arc<StreamSupervisor> {
    let supervisor = fixture.supervisor();
    supervisor.start().await.unwrap();
    assert!(supervisor.has_capability());
    supervisor
}

// ============================================================================
// Availability probe
// ============================================================================

mod probe {
    use super::*;
    use livecast::services::FfmpegService;

    async fn probe(body: &str, timeout: Duration) -> bool {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ffmpeg");
        write_script(&path, body);
        FfmpegService::with_ffmpeg_path(path.to_string_lossy()).probe_capability(timeout).await
    }

    #[tokio::test]
    async fn test_output_and_exit_zero_is_available() {
        let _serial = SERIAL.lock().await;
        assert!(probe("#!/bin/sh\necho 'ffmpeg version 6.1'\nexit 0\n", Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_banner_on_stderr_counts() {
        let _serial = SERIAL.lock().await;
        assert!(probe("#!/bin/sh\necho 'ffmpeg version 6.1' >&2\nexit 0\n", Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_unavailable() {
        let _serial = SERIAL.lock().await;
        assert!(!probe("#!/bin/sh\necho 'ffmpeg version 6.1'\nexit 1\n", Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_silent_success_is_unavailable() {
        let _serial = SERIAL.lock().await;
        assert!(!probe("#!/bin/sh\nexit 0\n", Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        let _serial = SERIAL.lock().await;
        let started = Instant::now();
        assert!(!probe("#!/bin/sh\necho 'ffmpeg version 6.1'\nexec sleep 5\n", Duration::from_millis(300)).await);
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_service_start_purges_stale_artifacts() {
        let _serial = SERIAL.lock().await;
        let fixture = Fixture::new();
        std::fs::write(fixture.hls_dir.join("stream.m3u8"), "#EXTM3U\n").unwrap();
        std::fs::write(fixture.hls_dir.join("segment_041.ts"), "old").unwrap();

        let supervisor = started_supervisor(&fixture).await;

        assert!(supervisor.segments().artifacts().await.is_empty());
        assert_eq!(supervisor.state(), StreamState::Idle);
    }

    #[tokio::test]
    async fn test_stop_twice_without_start_acks() {
        let _serial = SERIAL.lock().await;
        let fixture = Fixture::new();
        let supervisor = started_supervisor(&fixture).await;

        let first = supervisor.stop_stream().await;
        let second = supervisor.stop_stream().await;

        assert!(!first.stopped_job);
        assert!(!second.stopped_job);
        assert_eq!(supervisor.state(), StreamState::Idle);
        assert!(supervisor.segments().artifacts().await.is_empty());
    }

    #[tokio::test]
    async fn test_good_source_runs_until_stopped() {
        let _serial = SERIAL.lock().await;
        let fixture = Fixture::new();
        let supervisor = started_supervisor(&fixture).await;

        let started = supervisor.start_stream("rtmp://origin/live/main").await.unwrap();
        assert_eq!(started.playlist_url, "http://relay.test:3001/hls/stream.m3u8");
        assert_eq!(started.source_address, "rtmp://origin/live/main");

        let status = supervisor.status().await;
        assert!(status.is_running);
        assert_eq!(status.state, StreamState::Running);
        assert_eq!(status.hls_url.as_deref(), Some("http://relay.test:3001/hls/stream.m3u8"));
        assert_eq!(status.source_address.as_deref(), Some("rtmp://origin/live/main"));
        assert!(status.started_at.is_some());
        assert!(status.hls_available);

        let ack = supervisor.stop_stream().await;
        assert!(ack.stopped_job);
        assert!(ack.removed_files >= 2);

        let status = supervisor.status().await;
        assert!(!status.is_running);
        assert!(!status.hls_available);
        assert_eq!(status.state, StreamState::Idle);
        assert!(wait_until(Duration::from_secs(3), || fixture.live_sources().is_empty()).await);
    }

    #[tokio::test]
    async fn test_cancelled_start_still_reaches_running() {
        let _serial = SERIAL.lock().await;
        let fixture = Fixture::new();
        let supervisor = started_supervisor(&fixture).await;

        let cancelled = tokio::time::timeout(
            GRACE / 3,
            supervisor.start_stream("rtmp://origin/live/main"),
        )
        .await;
        assert!(cancelled.is_err());

        assert!(wait_until(GRACE * 5, || supervisor.state() == StreamState::Running).await);
        let status = supervisor.status().await;
        assert!(status.is_running);
        assert_eq!(status.source_address.as_deref(), Some("rtmp://origin/live/main"));

        supervisor.stop_stream().await;
        assert!(wait_until(Duration::from_secs(3), || fixture.live_sources().is_empty()).await);
    }

    #[tokio::test]
    async fn test_stop_twice_after_start_leaves_directory_empty() {
        let _serial = SERIAL.lock().await;
        let fixture = Fixture::new();
        let supervisor = started_supervisor(&fixture).await;
        supervisor.start_stream("rtmp://origin/live/main").await.unwrap();

        supervisor.stop_stream().await;
        supervisor.stop_stream().await;

        assert_eq!(supervisor.state(), StreamState::Idle);
        assert!(supervisor.segments().artifacts().await.is_empty());
    }

    #[tokio::test]
    async fn test_playlist_appears_after_slow_upstream() {
        let _serial = SERIAL.lock().await;
        let fixture = Fixture::new();
        let supervisor = started_supervisor(&fixture).await;

        supervisor.start_stream("srt://slow-upstream:9000").await.unwrap();
        let status = supervisor.status().await;
        assert!(status.is_running);
        assert!(!status.hls_available);

        let segments = supervisor.segments().clone();
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut available = false;
        while Instant::now() < deadline && !available {
            tokio::time::sleep(Duration::from_millis(50)).await;
            available = segments.playlist_exists().await;
        }
        assert!(available);
        assert!(supervisor.status().await.hls_available);

        supervisor.stop_stream().await;
    }
}

// ============================================================================
// Failures
// ============================================================================

mod failures {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_capability_gating_never_spawns() {
        let _serial = SERIAL.lock().await;
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("spawned");
        let ffmpeg = temp.path().join("ffmpeg");
        write_script(
            &ffmpeg,
            &format!(
                "#!/bin/sh\nif [ \"$1\" = \"-version\" ]; then exit 1; fi\ntouch \"{}\"\nexec sleep 30\n",
                marker.display()
            ),
        );
        let supervisor = supervisor_with(&ffmpeg, &temp.path().join("hls"));
        supervisor.start().await.unwrap();
        assert!(!supervisor.has_capability());

        let started = Instant::now();
        let result = supervisor.start_stream("rtmp://origin/live/main").await;

        assert!(started.elapsed() < Duration::from_millis(50));
        assert_matches!(result, Err(StreamError::CapabilityUnavailable));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!marker.exists());
        assert_eq!(supervisor.state(), StreamState::Idle);
    }

    #[tokio::test]
    async fn test_bad_host_is_start_failure() {
        let _serial = SERIAL.lock().await;
        let fixture = Fixture::new();
        let supervisor = started_supervisor(&fixture).await;

        let err = supervisor
            .start_stream("rtmp://bad-host:1935/live/key")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), StreamErrorKind::ProcessStartFailure);
        assert_eq!(err.exit_code(), Some(1));
        assert!(err.diagnostics().iter().any(|l| l.contains("Connection refused")));

        let status = supervisor.status().await;
        assert!(!status.is_running);
        assert_eq!(status.state, StreamState::Failed);
        assert_eq!(status.hls_url, None);
        let failure = status.last_failure.unwrap();
        assert_eq!(failure.error_kind, StreamErrorKind::ProcessStartFailure);
        assert_eq!(failure.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_exit_after_running_is_runtime_failure() {
        let _serial = SERIAL.lock().await;
        let fixture = Fixture::new();
        let supervisor = started_supervisor(&fixture).await;

        supervisor.start_stream("rtmp://origin/drop").await.unwrap();
        assert_eq!(supervisor.state(), StreamState::Running);

        assert!(wait_until(Duration::from_secs(5), || supervisor.state() == StreamState::Failed).await);
        let status = supervisor.status().await;
        assert!(!status.is_running);
        let failure = status.last_failure.unwrap();
        assert_eq!(failure.error_kind, StreamErrorKind::ProcessRuntimeFailure);
        assert_eq!(failure.exit_code, Some(3));
        assert!(failure.diagnostics.iter().any(|l| l.contains("ended unexpectedly")));

        // Failed jobs leave their files until the next stop or start
        assert!(status.hls_available);
        supervisor.stop_stream().await;
        assert!(!supervisor.status().await.hls_available);
    }

    #[tokio::test]
    async fn test_clean_exit_after_running_goes_idle() {
        let _serial = SERIAL.lock().await;
        let fixture = Fixture::new();
        let supervisor = started_supervisor(&fixture).await;

        supervisor.start_stream("rtmp://origin/eof").await.unwrap();

        assert!(wait_until(Duration::from_secs(5), || supervisor.state() == StreamState::Idle).await);
        let status = supervisor.status().await;
        assert!(!status.is_running);
        assert!(status.last_failure.is_none());
    }
}

// ============================================================================
// Mutual exclusion
// ============================================================================

mod exclusion {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_second_start_supersedes_first() {
        let _serial = SERIAL.lock().await;
        let fixture = Fixture::new();
        let supervisor = started_supervisor(&fixture).await;

        let first = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.start_stream("rtmp://origin/a").await })
        };

        let segments = supervisor.segments().clone();
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline && !segments.playlist_exists().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let second = supervisor.start_stream("rtmp://origin/b").await.unwrap();
        assert_eq!(second.source_address, "rtmp://origin/b");
        assert_matches!(first.await.unwrap(), Err(StreamError::Superseded));

        assert!(
            wait_until(Duration::from_secs(3), || fixture.live_sources() == vec!["rtmp://origin/b".to_string()])
                .await
        );
        let segment = std::fs::read_to_string(fixture.hls_dir.join("segment_000.ts")).unwrap();
        assert_eq!(segment.trim(), "rtmp://origin/b");

        let status = supervisor.status().await;
        assert_eq!(status.state, StreamState::Running);
        assert_eq!(status.source_address.as_deref(), Some("rtmp://origin/b"));

        supervisor.stop_stream().await;
        assert!(wait_until(Duration::from_secs(3), || fixture.live_sources().is_empty()).await);
    }
}

// ============================================================================
// HTTP surface
// ============================================================================

mod http {
    use super::*;
    use pretty_assertions::assert_eq;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use livecast::AppState;
    use livecast::app::build_app;
    use livecast::config::{Config, LogFormat};
    use livecast::db::Database;
    use livecast::services::ServicesManager;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_playlist_not_found_after_stop() {
        let _serial = SERIAL.lock().await;
        let fixture = Fixture::new();
        let supervisor = started_supervisor(&fixture).await;

        let config = Arc::new(Config {
            host: Some("relay.test".to_string()),
            port: 3001,
            database_url: "sqlite::memory:".to_string(),
            hls_dir: fixture.hls_dir.clone(),
            hls_public_path: "/hls".to_string(),
            static_dir: fixture.hls_dir.join("no-frontend"),
            ffmpeg_path: fixture.ffmpeg.to_string_lossy().to_string(),
            probe_timeout: Duration::from_secs(2),
            grace_period: GRACE,
            segment_seconds: 2,
            playlist_size: 5,
            log_format: LogFormat::Json,
        });
        let state = AppState {
            config,
            db: Database::connect("sqlite::memory:").await.unwrap(),
            stream: supervisor.clone(),
            services: Arc::new(ServicesManager::new()),
        };
        let app = build_app(state).await;

        let started = supervisor.start_stream("rtmp://origin/live/main").await.unwrap();
        let path = started.playlist_url.trim_start_matches("http://relay.test:3001");
        assert_eq!(path, "/hls/stream.m3u8");

        let get = |uri: &str| Request::get(uri).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(get(path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        supervisor.stop_stream().await;

        let response = app.oneshot(get(path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
