use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tauri::{AppHandle, Emitter, Runtime};
use tokio::time::Instant;

use crate::api::ProctorApi;
use crate::attempt::{AssessmentTarget, AttemptContext};
use crate::detector::state::{
    DetectorSnapshot, DetectorState, Escalation, SignalOutcome, ViolationReason,
};
use crate::report::CheatingReporter;

/// Caller-supplied hook invoked exactly once per attempt when the threshold
/// is exceeded. An `assessment-auto-submit` event is emitted as well, so
/// webview-only embedders can skip the hook entirely.
pub type AutoSubmitHook = Arc<dyn Fn() + Send + Sync + 'static>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorSettings {
    pub enabled: Option<bool>,
    pub max_warnings: Option<u32>,
    pub exam_id: Option<String>,
    pub quiz_id: Option<String>,
    pub created_by: Option<String>,
    pub teacher_owner_id: Option<String>,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct ViolationWarningEvent {
    count: u32,
    max_warnings: u32,
    reason: ViolationReason,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct ViolationExceededEvent {
    count: u32,
    max_warnings: u32,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct AutoSubmitEvent {
    violation_count: u32,
}

/// Converts raw loss-of-foreground signals into a debounced ledger and the
/// side effects the attempt owes: warning modals, one auto-submit, one
/// cheating report. All signal handling is synchronous; only the report
/// leaves the tick.
pub struct ViolationDetector<R: Runtime> {
    app_handle: AppHandle<R>,
    reporter: CheatingReporter,
    state: Arc<Mutex<DetectorState>>,
    context: Arc<Mutex<Option<AttemptContext>>>,
    auto_submit: Arc<Mutex<Option<AutoSubmitHook>>>,
}

// derived Clone would demand R: Clone
impl<R: Runtime> Clone for ViolationDetector<R> {
    fn clone(&self) -> Self {
        Self {
            app_handle: self.app_handle.clone(),
            reporter: self.reporter.clone(),
            state: Arc::clone(&self.state),
            context: Arc::clone(&self.context),
            auto_submit: Arc::clone(&self.auto_submit),
        }
    }
}

impl<R: Runtime> ViolationDetector<R> {
    pub fn new(app_handle: AppHandle<R>, api: Arc<dyn ProctorApi>, max_warnings: u32) -> Self {
        Self {
            app_handle,
            reporter: CheatingReporter::new(api),
            state: Arc::new(Mutex::new(DetectorState::new(max_warnings))),
            context: Arc::new(Mutex::new(None)),
            auto_submit: Arc::new(Mutex::new(None)),
        }
    }

    pub fn configure(&self, settings: DetectorSettings) {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(enabled) = settings.enabled {
                state.set_enabled(enabled);
            }
            if let Some(max_warnings) = settings.max_warnings {
                state.set_max_warnings(max_warnings);
            }
        }

        if let Some(target) = AssessmentTarget::from_ids(settings.exam_id, settings.quiz_id) {
            info!(
                "detector configured for {} {}",
                target.kind().as_str(),
                target.id()
            );
            *self.context.lock().unwrap() = Some(AttemptContext {
                target,
                created_by: settings.created_by,
                teacher_owner_id: settings.teacher_owner_id,
            });
        }
    }

    pub fn set_auto_submit_hook(&self, hook: AutoSubmitHook) {
        *self.auto_submit.lock().unwrap() = Some(hook);
    }

    pub fn foreground_lost(&self, reason: ViolationReason) {
        let outcome =
            self.state
                .lock()
                .unwrap()
                .on_foreground_lost(reason, Utc::now(), Instant::now());

        match outcome {
            SignalOutcome::Recorded { count, escalation } => {
                info!("violation {count} recorded ({reason:?})");
                let max_warnings = self.state.lock().unwrap().snapshot().max_warnings;
                match escalation {
                    Escalation::Warned => {
                        let _ = self.app_handle.emit(
                            "violation-warning",
                            ViolationWarningEvent {
                                count,
                                max_warnings,
                                reason,
                            },
                        );
                    }
                    Escalation::Exceeded => self.escalate(count, max_warnings),
                    Escalation::None => {}
                }
            }
            SignalOutcome::SuppressedCoolingDown | SignalOutcome::SuppressedSpacing => {
                debug!("duplicate foreground-loss signal suppressed")
            }
            SignalOutcome::Disabled => debug!("foreground-loss signal ignored while disabled"),
            SignalOutcome::AlreadyExceeded => {
                debug!("foreground-loss signal ignored after threshold")
            }
        }
    }

    pub fn foreground_regained(&self) {
        self.state.lock().unwrap().on_foreground_regained();
        debug!("foreground regained; detector re-armed");
    }

    pub fn dismiss_warning(&self) {
        self.state.lock().unwrap().dismiss_warning();
    }

    /// New attempt only: clears the ledger and both latches.
    pub fn reset(&self) {
        self.state.lock().unwrap().reset();
        info!("detector reset for a new attempt");
    }

    pub fn snapshot(&self) -> DetectorSnapshot {
        self.state.lock().unwrap().snapshot()
    }

    /// One report attempt per attempt, shared by the escalation path and the
    /// independent command. `Ok(false)` when the gate was already claimed or
    /// the content is self-practice.
    pub async fn report_attempt(&self) -> Result<bool> {
        let Some(context) = self.context.lock().unwrap().clone() else {
            bail!("no attempt context configured");
        };
        if !self.state.lock().unwrap().claim_report() {
            debug!("cheating report already attempted for this attempt");
            return Ok(false);
        }
        self.reporter.report(&context).await
    }

    fn escalate(&self, count: u32, max_warnings: u32) {
        warn!("violation threshold exceeded ({count}/{max_warnings}); forcing submission");

        let _ = self.app_handle.emit(
            "violation-exceeded",
            ViolationExceededEvent { count, max_warnings },
        );

        if self.state.lock().unwrap().claim_auto_submit() {
            let _ = self.app_handle.emit(
                "assessment-auto-submit",
                AutoSubmitEvent {
                    violation_count: count,
                },
            );
            let hook = self.auto_submit.lock().unwrap().clone();
            if let Some(hook) = hook {
                hook();
            }
        }

        // fire-and-forget: submission never waits on the report
        let detector = self.clone();
        tauri::async_runtime::spawn(async move {
            match detector.report_attempt().await {
                Ok(true) => info!("cheating report accepted"),
                Ok(false) => info!("cheating report withheld or already attempted"),
                Err(err) => warn!("cheating report failed: {err:#}"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeApi;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;
    use tauri::test::MockRuntime;
    use tokio::time::{advance, Duration};

    fn detector(
        api: Arc<FakeApi>,
        max_warnings: u32,
    ) -> (tauri::App<MockRuntime>, ViolationDetector<MockRuntime>) {
        let app = tauri::test::mock_app();
        let detector = ViolationDetector::new(app.handle().clone(), api, max_warnings);
        (app, detector)
    }

    fn settings(created_by: Option<&str>, teacher_owner_id: Option<&str>) -> DetectorSettings {
        DetectorSettings {
            enabled: None,
            max_warnings: None,
            exam_id: None,
            quiz_id: Some("quiz-1".into()),
            created_by: created_by.map(String::from),
            teacher_owner_id: teacher_owner_id.map(String::from),
        }
    }

    fn hook_counter(detector: &ViolationDetector<MockRuntime>) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        detector.set_auto_submit_hook(Arc::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        calls
    }

    /// The report runs on tauri's own runtime; give it real time to land.
    fn wait_for_reports(api: &FakeApi, expected: usize) {
        for _ in 0..200 {
            if api.report_calls() == expected {
                return;
            }
            std::thread::sleep(StdDuration::from_millis(5));
        }
        assert_eq!(api.report_calls(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_submit_fires_exactly_once() {
        let api = Arc::new(FakeApi::new());
        let (_app, detector) = detector(api.clone(), 3);
        detector.configure(settings(Some("teacher-1"), None));
        let submits = hook_counter(&detector);

        for _ in 0..3 {
            detector.foreground_lost(ViolationReason::WindowBlur);
            detector.foreground_regained();
            advance(Duration::from_secs(2)).await;
        }

        let snapshot = detector.snapshot();
        assert_eq!(snapshot.violation_count, 3);
        assert_eq!(snapshot.escalation, Escalation::Exceeded);
        assert_eq!(submits.load(Ordering::SeqCst), 1);

        // further signals re-evaluate Exceeded without re-submitting
        detector.foreground_lost(ViolationReason::VisibilityHidden);
        detector.foreground_lost(ViolationReason::WindowBlur);
        assert_eq!(submits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exceeding_the_threshold_reports_once() {
        let api = Arc::new(FakeApi::new());
        let (_app, detector) = detector(api.clone(), 1);
        detector.configure(settings(Some("teacher-1"), None));
        let _submits = hook_counter(&detector);

        detector.foreground_lost(ViolationReason::WindowBlur);
        wait_for_reports(&api, 1);

        // the gate holds for the independent path too
        let again = detector.report_attempt().await.expect("report");
        assert!(!again);
        assert_eq!(api.report_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn self_practice_exceeds_without_reporting() {
        let api = Arc::new(FakeApi::new());
        let (_app, detector) = detector(api.clone(), 1);
        detector.configure(settings(Some("USER"), None));
        let submits = hook_counter(&detector);

        detector.foreground_lost(ViolationReason::WindowBlur);

        assert_eq!(detector.snapshot().escalation, Escalation::Exceeded);
        assert_eq!(submits.load(Ordering::SeqCst), 1);

        std::thread::sleep(StdDuration::from_millis(100));
        assert_eq!(api.report_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn report_requires_a_configured_context() {
        let api = Arc::new(FakeApi::new());
        let (_app, detector) = detector(api, 3);

        assert!(detector.report_attempt().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_starts_a_fresh_attempt() {
        let api = Arc::new(FakeApi::new());
        let (_app, detector) = detector(api.clone(), 1);
        detector.configure(settings(Some("teacher-1"), None));
        let submits = hook_counter(&detector);

        detector.foreground_lost(ViolationReason::WindowBlur);
        wait_for_reports(&api, 1);

        detector.reset();
        detector.foreground_regained();
        advance(Duration::from_secs(2)).await;

        detector.foreground_lost(ViolationReason::WindowBlur);
        wait_for_reports(&api, 2);
        assert_eq!(submits.load(Ordering::SeqCst), 2);
    }
}
