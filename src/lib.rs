//! Exam/quiz integrity ("proctoring") plugin for timed assessments.
//!
//! Three pieces, composed by the assessment screen that owns the attempt:
//! a screen recorder that uploads time-boxed segments, a violation detector
//! that debounces loss-of-foreground signals and escalates to a forced
//! submission, and a one-shot cheating reporter gated by content ownership.

mod api;
mod attempt;
mod commands;
mod config;
mod detector;
mod error;
mod recorder;
mod report;
mod utils;

use std::sync::Arc;

use serde::Serialize;
use tauri::plugin::{Builder as PluginBuilder, TauriPlugin};
use tauri::{Manager, RunEvent, Runtime, WindowEvent};

pub use api::{HttpProctorApi, ProctorApi};
pub use attempt::{AssessmentKind, AssessmentTarget, AttemptContext};
pub use config::ProctorConfig;
pub use detector::{
    AutoSubmitHook, DetectorSettings, DetectorSnapshot, ViolationDetector, ViolationReason,
};
pub use error::CaptureError;
pub use recorder::{
    CaptureBackend, CaptureSupport, RecorderController, RecorderSnapshot, RecordingSettings,
    StartOutcome,
};
pub use report::{CheatingReporter, SELF_PRACTICE_MARKER};

use recorder::ffmpeg::FfmpegCaptureBackend;

/// The managed controllers. The embedding app reaches them through commands
/// or, on the Rust side, via `app.state::<ProctorState<R>>()` (e.g. to set
/// the auto-submit hook).
pub struct ProctorState<R: Runtime> {
    pub recorder: RecorderController<R>,
    pub detector: ViolationDetector<R>,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProctorSnapshot {
    pub recorder: RecorderSnapshot,
    pub detector: DetectorSnapshot,
}

/// Registers the proctoring subsystem with an embedding Tauri application.
///
/// Native window focus transitions feed the violation detector directly;
/// webview visibility changes arrive through the `foreground_lost` /
/// `foreground_regained` commands.
pub fn init<R: Runtime>(config: ProctorConfig) -> TauriPlugin<R> {
    PluginBuilder::new("proctor")
        .invoke_handler(tauri::generate_handler![
            commands::start_recording,
            commands::stop_recording,
            commands::check_capture_support,
            commands::proctor_snapshot,
            commands::configure_detector,
            commands::foreground_lost,
            commands::foreground_regained,
            commands::dismiss_warning,
            commands::reset_detector,
            commands::report_cheating,
        ])
        .setup(move |app, _plugin| {
            // tolerate an embedder that already initialized logging
            let _ = env_logger::Builder::from_default_env()
                .filter_level(log::LevelFilter::Info)
                .try_init();

            log::info!("proctoring plugin starting up...");

            let api: Arc<dyn ProctorApi> =
                Arc::new(HttpProctorApi::new(config.api_base_url.clone()));
            let backend = Arc::new(FfmpegCaptureBackend::new(
                config.ffmpeg_path.clone(),
                config.fragment_interval_ms,
            ));

            let recorder = RecorderController::new(
                app.clone(),
                config.clone(),
                Arc::clone(&api),
                backend,
            );
            let detector = ViolationDetector::new(app.clone(), api, config.max_warnings);

            app.manage(ProctorState { recorder, detector });
            Ok(())
        })
        .on_event(|app, event| {
            if let RunEvent::WindowEvent {
                event: WindowEvent::Focused(focused),
                ..
            } = event
            {
                let state = app.state::<ProctorState<R>>();
                if *focused {
                    state.detector.foreground_regained();
                } else {
                    state.detector.foreground_lost(ViolationReason::WindowBlur);
                }
            }
        })
        .build()
}
