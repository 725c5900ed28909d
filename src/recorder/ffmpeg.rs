//! ffmpeg-based capture backend.
//!
//! Spawns an ffmpeg child grabbing the full display surface, encodes with the
//! best codec the local build supports, and streams the muxed container out
//! of stdout. Stdout bytes are coalesced into fragments on a fixed cadence;
//! stderr is parsed for progress and permission failures.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::CaptureError;
use crate::recorder::backend::{
    CaptureBackend, CaptureProfile, CaptureRequest, CaptureStream, CaptureSupport,
    StreamController, StreamEvent, PROFILE_PREFERENCES,
};

// Set to false to silence per-fragment output in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// ffmpeg that dies inside this window is a startup failure, not a fault.
const STARTUP_GRACE: Duration = Duration::from_millis(700);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
const READ_BUF_BYTES: usize = 64 * 1024;
const EVENT_CHANNEL_CAPACITY: usize = 8;
const PROGRESS_LOG_EVERY: Duration = Duration::from_secs(5);

/// The display-grab input ffmpeg should open, per platform.
#[derive(Debug, Clone)]
pub struct CaptureInput {
    pub format: String,
    pub source: String,
}

impl CaptureInput {
    fn default_for_platform() -> Self {
        #[cfg(target_os = "macos")]
        return Self {
            format: "avfoundation".into(),
            source: "1:none".into(),
        };

        #[cfg(target_os = "windows")]
        return Self {
            format: "gdigrab".into(),
            source: "desktop".into(),
        };

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        Self {
            format: "x11grab".into(),
            source: std::env::var("DISPLAY").unwrap_or_else(|_| ":0".into()),
        }
    }
}

pub struct FfmpegCaptureBackend {
    binary: String,
    input: CaptureInput,
    fragment_interval: Duration,
}

impl FfmpegCaptureBackend {
    pub fn new(ffmpeg_path: Option<String>, fragment_interval_ms: u64) -> Self {
        Self {
            binary: ffmpeg_path.unwrap_or_else(|| "ffmpeg".into()),
            input: CaptureInput::default_for_platform(),
            fragment_interval: Duration::from_millis(fragment_interval_ms.max(250)),
        }
    }

    /// One `ffmpeg -encoders` run; its output drives profile selection.
    async fn probe_encoders(&self) -> Result<String, CaptureError> {
        let output = Command::new(&self.binary)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => {
                    CaptureError::Unsupported(format!("{} not found on this system", self.binary))
                }
                _ => CaptureError::Other(
                    anyhow::Error::from(err).context("failed to probe ffmpeg encoders"),
                ),
            })?;

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl CaptureBackend for FfmpegCaptureBackend {
    async fn support(&self) -> CaptureSupport {
        match self.probe_encoders().await {
            Ok(encoders) => match select_profile(&encoders) {
                Some(profile) => CaptureSupport {
                    supported: true,
                    detail: Some(format!("{}/{}", profile.container, profile.codec)),
                },
                None => CaptureSupport {
                    supported: false,
                    detail: Some("no usable video encoder".into()),
                },
            },
            Err(err) => CaptureSupport {
                supported: false,
                detail: Some(err.to_string()),
            },
        }
    }

    async fn acquire(&self, request: &CaptureRequest) -> Result<CaptureStream, CaptureError> {
        let encoders = self.probe_encoders().await?;
        let profile = select_profile(&encoders)
            .ok_or_else(|| CaptureError::Unsupported("no usable video encoder".into()))?;

        let args = build_grab_args(&self.input, request, &profile);
        log_info!("spawning {} {}", self.binary, args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => {
                    CaptureError::Unsupported(format!("{} not found on this system", self.binary))
                }
                std::io::ErrorKind::PermissionDenied => CaptureError::PermissionDenied,
                _ => CaptureError::Other(
                    anyhow::Error::from(err).context("failed to spawn ffmpeg"),
                ),
            })?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .context("ffmpeg stdout was not piped")
            .map_err(CaptureError::Other)?;
        let stderr = child
            .stderr
            .take()
            .context("ffmpeg stderr was not piped")
            .map_err(CaptureError::Other)?;

        let permission_denied = Arc::new(AtomicBool::new(false));
        spawn_stderr_monitor(stderr, Arc::clone(&permission_denied));

        // A grab that cannot open the display dies immediately; give it a
        // moment so that surfaces as a distinguished startup outcome instead
        // of a mid-session fault.
        if let Ok(exit) = timeout(STARTUP_GRACE, child.wait()).await {
            // let the monitor catch the tail of stderr before classifying
            tokio::time::sleep(Duration::from_millis(100)).await;
            if permission_denied.load(Ordering::SeqCst) {
                return Err(CaptureError::PermissionDenied);
            }
            return Err(match exit {
                Ok(status) => {
                    CaptureError::Other(anyhow!("ffmpeg exited during startup: {status}"))
                }
                Err(err) => CaptureError::Other(
                    anyhow::Error::from(err).context("waiting on ffmpeg during startup"),
                ),
            });
        }

        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(fragment_pump(
            child,
            stdin,
            stdout,
            tx,
            token.clone(),
            self.fragment_interval,
        ));

        Ok(CaptureStream {
            profile,
            events: rx,
            controller: StreamController::new(token),
        })
    }
}

/// Reads encoded bytes off ffmpeg's stdout and coalesces them into fragments
/// on a fixed cadence. Owns the child; every exit path releases it.
async fn fragment_pump(
    mut child: Child,
    stdin: Option<ChildStdin>,
    mut stdout: ChildStdout,
    tx: mpsc::Sender<StreamEvent>,
    token: CancellationToken,
    fragment_interval: Duration,
) {
    let mut ticker = interval(fragment_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut chunk: Vec<u8> = Vec::new();
    let mut read_buf = vec![0u8; READ_BUF_BYTES];

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log_info!("capture stream stopping on request");
                shutdown_child(child, stdin).await;
                return;
            }
            _ = ticker.tick() => {
                if !chunk.is_empty() {
                    let fragment = std::mem::take(&mut chunk);
                    log_info!("fragment ready: {} bytes", fragment.len());
                    if tx.send(StreamEvent::Fragment(fragment)).await.is_err() {
                        // consumer is gone; treat like a stop
                        shutdown_child(child, stdin).await;
                        return;
                    }
                }
            }
            read = stdout.read(&mut read_buf) => match read {
                Ok(0) => {
                    // encoder quit on its own: sharing revoked or a crash
                    if !chunk.is_empty() {
                        let _ = tx.send(StreamEvent::Fragment(std::mem::take(&mut chunk))).await;
                    }
                    let event = match child.wait().await {
                        Ok(status) if status.success() => StreamEvent::Ended,
                        Ok(status) => StreamEvent::Fault(format!("ffmpeg exited: {status}")),
                        Err(err) => StreamEvent::Fault(format!("ffmpeg wait failed: {err}")),
                    };
                    if matches!(event, StreamEvent::Ended) {
                        log_warn!("capture stream ended by the platform");
                    }
                    let _ = tx.send(event).await;
                    return;
                }
                Ok(n) => chunk.extend_from_slice(&read_buf[..n]),
                Err(err) => {
                    log_error!("capture stdout read failed: {err}");
                    let _ = tx.send(StreamEvent::Fault(err.to_string())).await;
                    shutdown_child(child, stdin).await;
                    return;
                }
            },
        }
    }
}

/// Asks ffmpeg to finish cleanly (`q` on stdin), then kills it if it lingers.
async fn shutdown_child(mut child: Child, stdin: Option<ChildStdin>) {
    if let Some(mut stdin) = stdin {
        let _ = stdin.write_all(b"q").await;
        let _ = stdin.shutdown().await;
    }

    match timeout(SHUTDOWN_GRACE, child.wait()).await {
        Ok(Ok(status)) => log_info!("ffmpeg exited: {status}"),
        Ok(Err(err)) => log_warn!("ffmpeg wait failed during shutdown: {err}"),
        Err(_) => {
            log_warn!("ffmpeg ignored quit request; killing");
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

/// Logs ffmpeg's stderr, throttling progress lines, and flags permission
/// failures for the acquire path.
fn spawn_stderr_monitor(
    stderr: tokio::process::ChildStderr,
    permission_denied: Arc<AtomicBool>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut last_progress_log: Option<Instant> = None;

        while let Ok(Some(line)) = lines.next_line().await {
            if looks_like_permission_error(&line) {
                permission_denied.store(true, Ordering::SeqCst);
                log_error!("ffmpeg: {}", line.trim());
                continue;
            }

            let is_progress = line.contains("time=") && line.contains("bitrate=");
            if is_progress {
                let due = last_progress_log
                    .map(|at| at.elapsed() >= PROGRESS_LOG_EVERY)
                    .unwrap_or(true);
                if due {
                    log_info!(
                        "capture progress | time: {} | bitrate: {} | speed: {}",
                        extract_value(&line, "time=").unwrap_or_else(|| "??".into()),
                        extract_value(&line, "bitrate=").unwrap_or_else(|| "N/A".into()),
                        extract_value(&line, "speed=").unwrap_or_else(|| "??".into()),
                    );
                    last_progress_log = Some(Instant::now());
                }
            } else if !line.trim().is_empty() {
                log::debug!("ffmpeg: {}", line.trim());
            }
        }
    });
}

/// First profile from the preference list whose encoder the local ffmpeg
/// build advertises.
pub fn select_profile(encoders_output: &str) -> Option<CaptureProfile> {
    PROFILE_PREFERENCES
        .iter()
        .copied()
        .find(|profile| encoders_output.contains(profile.codec))
}

pub fn build_grab_args(
    input: &CaptureInput,
    request: &CaptureRequest,
    profile: &CaptureProfile,
) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-f".to_string(),
        input.format.clone(),
        "-framerate".to_string(),
        request.framerate.to_string(),
        "-i".to_string(),
        input.source.clone(),
        "-c:v".to_string(),
        profile.codec.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-b:v".to_string(),
        "1M".to_string(),
    ];

    match profile.codec {
        "libvpx" | "libvpx-vp9" => args.extend(
            ["-deadline", "realtime", "-cpu-used", "8"]
                .iter()
                .map(|s| s.to_string()),
        ),
        "libx264" => args.extend(
            ["-preset", "ultrafast", "-tune", "zerolatency"]
                .iter()
                .map(|s| s.to_string()),
        ),
        _ => {}
    }

    args.extend([
        "-f".to_string(),
        profile.container.to_string(),
        "pipe:1".to_string(),
    ]);

    args
}

fn looks_like_permission_error(line: &str) -> bool {
    const MARKERS: &[&str] = &[
        "Operation not permitted",
        "Permission denied",
        "not authorized to capture",
        "Cannot open display",
        "cannot open display",
    ];
    MARKERS.iter().any(|marker| line.contains(marker))
}

fn extract_value(line: &str, key: &str) -> Option<String> {
    let start = line.find(key)? + key.len();
    let after_key = &line[start..];
    let value_start = after_key.find(|c: char| !c.is_whitespace()).unwrap_or(0);
    let value_part = &after_key[value_start..];
    let end = value_part
        .find(|c: char| c.is_whitespace())
        .unwrap_or(value_part.len());
    Some(value_part[..end].to_string())
}
