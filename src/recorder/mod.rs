pub mod backend;
pub mod controller;
pub mod ffmpeg;
pub mod session;

pub use backend::{CaptureBackend, CaptureSupport};
pub use controller::{RecorderController, RecordingSettings, StartOutcome};
pub use session::{RecorderSnapshot, RecorderStatus};
