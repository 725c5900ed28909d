use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::CaptureError;

/// A negotiated container/codec pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureProfile {
    pub container: &'static str,
    pub codec: &'static str,
    pub mime_type: &'static str,
}

/// Ordered most-capable-first; a backend walks this list and keeps the first
/// combination its encoder set supports.
pub const PROFILE_PREFERENCES: &[CaptureProfile] = &[
    CaptureProfile {
        container: "webm",
        codec: "libvpx-vp9",
        mime_type: "video/webm;codecs=vp9",
    },
    CaptureProfile {
        container: "webm",
        codec: "libvpx",
        mime_type: "video/webm;codecs=vp8",
    },
    CaptureProfile {
        container: "matroska",
        codec: "libx264",
        mime_type: "video/x-matroska;codecs=avc1",
    },
];

/// What the recorder asks a backend to capture. Always the full display
/// surface; only the cadence and framerate vary.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub framerate: u32,
}

#[derive(Debug)]
pub enum StreamEvent {
    /// Raw container bytes. Order matters; fragments are concatenated as-is.
    Fragment(Vec<u8>),
    /// The source ended outside of `stop()` (sharing revoked, encoder quit).
    Ended,
    /// The recording primitive failed mid-session.
    Fault(String),
}

/// Stop handle for a live stream. Cloneable so the controller can keep one
/// while the backend pump holds the token.
#[derive(Clone)]
pub struct StreamController {
    token: CancellationToken,
}

impl StreamController {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Signals the source to shut down. Synchronous; the pump drains and
    /// releases the underlying resources on its own schedule.
    pub fn stop(&self) {
        self.token.cancel();
    }
}

/// A live, acquired capture stream.
pub struct CaptureStream {
    pub profile: CaptureProfile,
    pub events: mpsc::Receiver<StreamEvent>,
    pub controller: StreamController,
}

/// Result of a capability preflight, shaped for the frontend.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSupport {
    pub supported: bool,
    pub detail: Option<String>,
}

/// Where capture streams come from. Production uses the ffmpeg backend; tests
/// script one.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Cheap preflight: could `acquire` plausibly succeed right now?
    async fn support(&self) -> CaptureSupport;

    async fn acquire(&self, request: &CaptureRequest) -> Result<CaptureStream, CaptureError>;
}
