use std::sync::Arc;

use anyhow::{bail, Result};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tauri::{AppHandle, Emitter, Runtime};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::{ProctorApi, SegmentUpload};
use crate::attempt::AssessmentTarget;
use crate::config::ProctorConfig;
use crate::error::CaptureError;
use crate::recorder::backend::{
    CaptureBackend, CaptureRequest, CaptureStream, CaptureSupport, StreamController, StreamEvent,
};
use crate::recorder::session::{CaptureSession, RecorderSnapshot, Segment};

/// Outcome of a `start` call. Re-entrant starts and missing capability are
/// results, not errors; the embedding screen decides what each one means.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StartOutcome {
    Started,
    AlreadyRecording,
    PermissionDenied,
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSettings {
    pub exam_id: Option<String>,
    pub quiz_id: Option<String>,
    pub flush_interval_ms: Option<u64>,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct TickEvent {
    elapsed_secs: u64,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct RecordingErrorEvent {
    message: String,
}

/// Everything one recording attempt owns: its state plus the handles that
/// must be released on every exit path.
struct ActiveCapture {
    session: CaptureSession,
    stream: StreamController,
    cancel: CancellationToken,
}

pub struct RecorderController<R: Runtime> {
    app_handle: AppHandle<R>,
    api: Arc<dyn ProctorApi>,
    backend: Arc<dyn CaptureBackend>,
    config: ProctorConfig,
    active: Arc<Mutex<Option<ActiveCapture>>>,
}

// derived Clone would demand R: Clone
impl<R: Runtime> Clone for RecorderController<R> {
    fn clone(&self) -> Self {
        Self {
            app_handle: self.app_handle.clone(),
            api: Arc::clone(&self.api),
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
            active: Arc::clone(&self.active),
        }
    }
}

impl<R: Runtime> RecorderController<R> {
    pub fn new(
        app_handle: AppHandle<R>,
        config: ProctorConfig,
        api: Arc<dyn ProctorApi>,
        backend: Arc<dyn CaptureBackend>,
    ) -> Self {
        Self {
            app_handle,
            api,
            backend,
            config,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn support(&self) -> CaptureSupport {
        self.backend.support().await
    }

    pub async fn snapshot(&self) -> RecorderSnapshot {
        let guard = self.active.lock().await;
        match guard.as_ref() {
            Some(active) => active.session.snapshot(),
            None => RecorderSnapshot::idle(),
        }
    }

    /// Starts capturing and uploading. A second call while recording is a
    /// no-op so rapid repeated invocation cannot open a second stream.
    pub async fn start(&self, settings: RecordingSettings) -> Result<StartOutcome> {
        let Some(target) =
            AssessmentTarget::from_ids(settings.exam_id.clone(), settings.quiz_id.clone())
        else {
            bail!("an exam or quiz id is required to attribute the recording");
        };

        if self.active.lock().await.is_some() {
            info!("start ignored; a recording is already active");
            return Ok(StartOutcome::AlreadyRecording);
        }

        let request = CaptureRequest {
            framerate: self.config.framerate,
        };

        let stream = match self.backend.acquire(&request).await {
            Ok(stream) => stream,
            Err(CaptureError::PermissionDenied) => {
                warn!("screen capture permission denied");
                let _ = self.app_handle.emit("capture-permission-required", ());
                return Ok(StartOutcome::PermissionDenied);
            }
            Err(CaptureError::Unsupported(detail)) => {
                warn!("screen capture unsupported: {detail}");
                return Ok(StartOutcome::Unsupported);
            }
            Err(CaptureError::Other(err)) => return Err(err),
        };

        let CaptureStream {
            profile,
            events,
            controller: stream_ctl,
        } = stream;

        let mut guard = self.active.lock().await;
        if guard.is_some() {
            // a competing start won while this one was acquiring
            stream_ctl.stop();
            return Ok(StartOutcome::AlreadyRecording);
        }

        let session = CaptureSession::new(target, profile, Instant::now());
        let attempt = session.attempt;
        let cancel = CancellationToken::new();
        let flush_interval = Duration::from_millis(
            settings
                .flush_interval_ms
                .unwrap_or(self.config.flush_interval_ms)
                .max(1),
        );

        tokio::spawn(self.clone().fragment_pump(attempt, events, cancel.clone()));
        tokio::spawn(self.clone().flush_loop(attempt, flush_interval, cancel.clone()));
        tokio::spawn(self.clone().duration_ticker(attempt, cancel.clone()));

        *guard = Some(ActiveCapture {
            session,
            stream: stream_ctl,
            cancel,
        });
        drop(guard);

        info!(
            "recording started ({}, flush every {}ms)",
            profile.mime_type,
            flush_interval.as_millis()
        );
        self.emit_state().await;
        Ok(StartOutcome::Started)
    }

    /// Idempotent; safe before `start`. Flushes the buffered tail as a final
    /// segment whose upload completes in the background.
    pub async fn stop(&self) {
        let attempt = {
            let guard = self.active.lock().await;
            match guard.as_ref() {
                Some(active) => active.session.attempt,
                None => {
                    debug!("stop called while idle");
                    return;
                }
            }
        };

        if self.teardown(attempt).await {
            info!("recording stopped");
            self.emit_state().await;
        }
    }

    /// The single teardown routine behind every exit path: explicit stop,
    /// stream ended by the platform, recorder fault. Returns false when the
    /// given attempt is no longer the active one.
    async fn teardown(&self, attempt: Uuid) -> bool {
        let mut active = {
            let mut guard = self.active.lock().await;
            match guard.take() {
                Some(active) if active.session.attempt == attempt => active,
                other => {
                    *guard = other;
                    return false;
                }
            }
        };

        active.cancel.cancel();
        active.stream.stop();

        if let Some(segment) = active.session.drain(Instant::now()) {
            self.dispatch_upload(
                active.session.target.clone(),
                active.session.profile.mime_type.to_string(),
                segment,
            );
        }
        true
    }

    async fn fragment_pump(
        self,
        attempt: Uuid,
        mut events: mpsc::Receiver<StreamEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(StreamEvent::Fragment(bytes)) => {
                        let mut guard = self.active.lock().await;
                        match guard.as_mut() {
                            Some(active) if active.session.attempt == attempt => {
                                active.session.append_fragment(bytes);
                            }
                            _ => break,
                        }
                    }
                    Some(StreamEvent::Ended) => {
                        warn!("capture stream ended outside stop(); tearing down");
                        if self.teardown(attempt).await {
                            self.emit_state().await;
                        }
                        break;
                    }
                    Some(StreamEvent::Fault(message)) => {
                        error!("recorder fault: {message}");
                        if self.teardown(attempt).await {
                            let _ = self
                                .app_handle
                                .emit("recording-error", RecordingErrorEvent { message });
                            self.emit_state().await;
                        }
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    async fn flush_loop(self, attempt: Uuid, every: Duration, cancel: CancellationToken) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // an interval's first tick completes immediately; the first real
        // flush is one full period out
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.flush_once(attempt).await,
            }
        }
    }

    /// Drains the buffer synchronously under the lock, then uploads the
    /// detached segment without holding anything, so fragments arriving
    /// during the upload land in the next segment.
    async fn flush_once(&self, attempt: Uuid) {
        let drained = {
            let mut guard = self.active.lock().await;
            match guard.as_mut() {
                Some(active) if active.session.attempt == attempt => {
                    let target = active.session.target.clone();
                    let mime_type = active.session.profile.mime_type.to_string();
                    active
                        .session
                        .drain(Instant::now())
                        .map(|segment| (target, mime_type, segment))
                }
                _ => return,
            }
        };

        if let Some((target, mime_type, segment)) = drained {
            self.dispatch_upload(target, mime_type, segment);
        }
    }

    fn dispatch_upload(&self, target: AssessmentTarget, mime_type: String, segment: Segment) {
        info!(
            "uploading segment {} ({} bytes, {}s)",
            segment.index,
            segment.data.len(),
            segment.duration_seconds
        );

        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            let index = segment.index;
            let upload = SegmentUpload {
                target,
                index,
                duration_seconds: segment.duration_seconds,
                mime_type,
                data: segment.data,
            };
            if let Err(err) = api.upload_segment(upload).await {
                // no retry: the next flush proceeds independently
                error!("segment {index} upload failed: {err:#}");
            }
        });
    }

    async fn duration_ticker(self, attempt: Uuid, cancel: CancellationToken) {
        let mut ticker = interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let elapsed = {
                        let mut guard = self.active.lock().await;
                        match guard.as_mut() {
                            Some(active) if active.session.attempt == attempt => {
                                active.session.tick_second()
                            }
                            _ => break,
                        }
                    };
                    let _ = self
                        .app_handle
                        .emit("recording-tick", TickEvent { elapsed_secs: elapsed });
                }
            }
        }
    }

    async fn emit_state(&self) {
        let snapshot = self.snapshot().await;
        let _ = self.app_handle.emit("recording-state-changed", snapshot);
    }
}
