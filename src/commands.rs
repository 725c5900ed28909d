use tauri::{AppHandle, Runtime, State};

use crate::detector::{DetectorSettings, ViolationReason};
use crate::recorder::backend::CaptureSupport;
use crate::recorder::{RecordingSettings, StartOutcome};
use crate::{ProctorSnapshot, ProctorState};

#[tauri::command]
pub async fn start_recording<R: Runtime>(
    _app: AppHandle<R>,
    state: State<'_, ProctorState<R>>,
    settings: RecordingSettings,
) -> Result<StartOutcome, String> {
    state
        .recorder
        .start(settings)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn stop_recording<R: Runtime>(_app: AppHandle<R>, state: State<'_, ProctorState<R>>) -> Result<(), String> {
    state.recorder.stop().await;
    Ok(())
}

#[tauri::command]
pub async fn check_capture_support<R: Runtime>(
    _app: AppHandle<R>,
    state: State<'_, ProctorState<R>>,
) -> Result<CaptureSupport, String> {
    Ok(state.recorder.support().await)
}

#[tauri::command]
pub async fn proctor_snapshot<R: Runtime>(
    _app: AppHandle<R>,
    state: State<'_, ProctorState<R>>,
) -> Result<ProctorSnapshot, String> {
    Ok(ProctorSnapshot {
        recorder: state.recorder.snapshot().await,
        detector: state.detector.snapshot(),
    })
}

#[tauri::command]
pub fn configure_detector<R: Runtime>(
    _app: AppHandle<R>,
    state: State<'_, ProctorState<R>>,
    settings: DetectorSettings,
) -> Result<(), String> {
    state.detector.configure(settings);
    Ok(())
}

/// Webview-side visibility loss; native window blur arrives through the
/// plugin's run-event hook instead.
#[tauri::command]
pub fn foreground_lost<R: Runtime>(
    _app: AppHandle<R>,
    state: State<'_, ProctorState<R>>,
    reason: Option<ViolationReason>,
) -> Result<(), String> {
    state
        .detector
        .foreground_lost(reason.unwrap_or(ViolationReason::VisibilityHidden));
    Ok(())
}

#[tauri::command]
pub fn foreground_regained<R: Runtime>(_app: AppHandle<R>, state: State<'_, ProctorState<R>>) -> Result<(), String> {
    state.detector.foreground_regained();
    Ok(())
}

#[tauri::command]
pub fn dismiss_warning<R: Runtime>(_app: AppHandle<R>, state: State<'_, ProctorState<R>>) -> Result<(), String> {
    state.detector.dismiss_warning();
    Ok(())
}

#[tauri::command]
pub fn reset_detector<R: Runtime>(_app: AppHandle<R>, state: State<'_, ProctorState<R>>) -> Result<(), String> {
    state.detector.reset();
    Ok(())
}

#[tauri::command]
pub async fn report_cheating<R: Runtime>(
    _app: AppHandle<R>,
    state: State<'_, ProctorState<R>>,
) -> Result<bool, String> {
    state
        .detector
        .report_attempt()
        .await
        .map_err(|e| e.to_string())
}
