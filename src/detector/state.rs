use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

/// Hard floor between recorded violations, applied regardless of arming
/// phase. Two platform signals for the same physical exit can land in the
/// same tick; at most one of them may count.
pub const MIN_VIOLATION_SPACING: Duration = Duration::from_secs(1);

/// What pulled the user away from the assessment view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ViolationReason {
    WindowBlur,
    VisibilityHidden,
    AppBackground,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationRecord {
    pub at: DateTime<Utc>,
    pub reason: ViolationReason,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
enum ArmingPhase {
    /// A new violation may be recorded.
    Armed,
    /// Duplicates are ignored until the window regains foreground.
    CoolingDown,
}

/// Derived from ledger length against the threshold on every append.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Escalation {
    None,
    Warned,
    Exceeded,
}

/// What happened to one loss-of-foreground signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Recorded { count: u32, escalation: Escalation },
    SuppressedCoolingDown,
    SuppressedSpacing,
    Disabled,
    AlreadyExceeded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorSnapshot {
    pub enabled: bool,
    pub max_warnings: u32,
    pub violation_count: u32,
    pub escalation: Escalation,
    pub warning_visible: bool,
    pub suppressed: u64,
}

/// The violation ledger and everything derived from it. Pure state: callers
/// inject both clocks, so every transition is deterministic under test.
#[derive(Debug)]
pub struct DetectorState {
    enabled: bool,
    max_warnings: u32,
    phase: ArmingPhase,
    ledger: Vec<ViolationRecord>,
    last_recorded: Option<Instant>,
    warning_visible: bool,
    suppressed: u64,
    auto_submit_fired: bool,
    report_claimed: bool,
}

impl DetectorState {
    pub fn new(max_warnings: u32) -> Self {
        Self {
            enabled: true,
            max_warnings: max_warnings.max(1),
            phase: ArmingPhase::Armed,
            ledger: Vec::new(),
            last_recorded: None,
            warning_visible: false,
            suppressed: 0,
            auto_submit_fired: false,
            report_claimed: false,
        }
    }

    pub fn violation_count(&self) -> u32 {
        self.ledger.len() as u32
    }

    pub fn ledger(&self) -> &[ViolationRecord] {
        &self.ledger
    }

    pub fn escalation(&self) -> Escalation {
        let count = self.violation_count();
        if count == 0 {
            Escalation::None
        } else if count < self.max_warnings {
            Escalation::Warned
        } else {
            Escalation::Exceeded
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        // toggling never clears the ledger
        self.enabled = enabled;
    }

    pub fn set_max_warnings(&mut self, max_warnings: u32) {
        self.max_warnings = max_warnings.max(1);
    }

    pub fn on_foreground_lost(
        &mut self,
        reason: ViolationReason,
        at: DateTime<Utc>,
        now: Instant,
    ) -> SignalOutcome {
        if !self.enabled {
            return SignalOutcome::Disabled;
        }
        if self.escalation() == Escalation::Exceeded {
            self.suppressed += 1;
            return SignalOutcome::AlreadyExceeded;
        }
        if self.phase == ArmingPhase::CoolingDown {
            self.suppressed += 1;
            return SignalOutcome::SuppressedCoolingDown;
        }
        if let Some(last) = self.last_recorded {
            if now.duration_since(last) < MIN_VIOLATION_SPACING {
                self.suppressed += 1;
                return SignalOutcome::SuppressedSpacing;
            }
        }

        self.phase = ArmingPhase::CoolingDown;
        self.last_recorded = Some(now);
        self.ledger.push(ViolationRecord { at, reason });

        let escalation = self.escalation();
        if escalation == Escalation::Warned {
            self.warning_visible = true;
        }

        SignalOutcome::Recorded {
            count: self.violation_count(),
            escalation,
        }
    }

    pub fn on_foreground_regained(&mut self) {
        self.phase = ArmingPhase::Armed;
    }

    /// One-shot latch for the auto-submit side effect, independent of the
    /// ledger so a re-evaluated Exceeded state cannot double-submit.
    pub fn claim_auto_submit(&mut self) -> bool {
        if self.auto_submit_fired {
            return false;
        }
        self.auto_submit_fired = true;
        true
    }

    /// One-shot latch for the cheating report.
    pub fn claim_report(&mut self) -> bool {
        if self.report_claimed {
            return false;
        }
        self.report_claimed = true;
        true
    }

    pub fn dismiss_warning(&mut self) {
        self.warning_visible = false;
    }

    /// New attempt only, never mid-attempt. Configuration survives.
    pub fn reset(&mut self) {
        let enabled = self.enabled;
        let max_warnings = self.max_warnings;
        *self = Self::new(max_warnings);
        self.enabled = enabled;
    }

    pub fn snapshot(&self) -> DetectorSnapshot {
        DetectorSnapshot {
            enabled: self.enabled,
            max_warnings: self.max_warnings,
            violation_count: self.violation_count(),
            escalation: self.escalation(),
            warning_visible: self.warning_visible,
            suppressed: self.suppressed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lost(state: &mut DetectorState, now: Instant) -> SignalOutcome {
        state.on_foreground_lost(ViolationReason::WindowBlur, Utc::now(), now)
    }

    #[test]
    fn repeated_signals_while_cooling_down_count_once() {
        let t0 = Instant::now();
        let mut state = DetectorState::new(3);

        assert!(matches!(
            lost(&mut state, t0),
            SignalOutcome::Recorded { count: 1, .. }
        ));
        for i in 1..=5u64 {
            assert_eq!(
                lost(&mut state, t0 + Duration::from_secs(i * 2)),
                SignalOutcome::SuppressedCoolingDown
            );
        }

        assert_eq!(state.violation_count(), 1);
        assert_eq!(state.snapshot().suppressed, 5);
    }

    #[test]
    fn near_simultaneous_signals_are_suppressed_by_spacing() {
        let t0 = Instant::now();
        let mut state = DetectorState::new(3);

        lost(&mut state, t0);
        state.on_foreground_regained();

        // a second platform signal lands right after the regain
        assert_eq!(
            lost(&mut state, t0 + Duration::from_millis(300)),
            SignalOutcome::SuppressedSpacing
        );
        assert_eq!(state.violation_count(), 1);
    }

    #[test]
    fn exceeded_lands_exactly_on_the_threshold() {
        let t0 = Instant::now();
        let mut state = DetectorState::new(3);

        for i in 0..3u64 {
            let outcome = lost(&mut state, t0 + Duration::from_secs(i * 2));
            let expected = if i < 2 {
                Escalation::Warned
            } else {
                Escalation::Exceeded
            };
            assert_eq!(
                outcome,
                SignalOutcome::Recorded {
                    count: i as u32 + 1,
                    escalation: expected
                }
            );
            state.on_foreground_regained();
        }

        assert_eq!(state.violation_count(), 3);

        // terminal: nothing can push the ledger past the threshold
        assert_eq!(
            lost(&mut state, t0 + Duration::from_secs(60)),
            SignalOutcome::AlreadyExceeded
        );
        assert_eq!(state.violation_count(), 3);
    }

    #[test]
    fn blur_regain_blur_scenario_reaches_exceeded() {
        let t0 = Instant::now();
        let mut state = DetectorState::new(3);

        lost(&mut state, t0);
        state.on_foreground_regained();
        lost(&mut state, t0 + Duration::from_secs(2));
        state.on_foreground_regained();
        let last = lost(&mut state, t0 + Duration::from_secs(4));

        assert_eq!(state.violation_count(), 3);
        assert!(matches!(
            last,
            SignalOutcome::Recorded {
                escalation: Escalation::Exceeded,
                ..
            }
        ));
    }

    #[test]
    fn auto_submit_and_report_latches_fire_once() {
        let mut state = DetectorState::new(1);

        assert!(state.claim_auto_submit());
        assert!(!state.claim_auto_submit());
        assert!(state.claim_report());
        assert!(!state.claim_report());

        state.reset();
        assert!(state.claim_auto_submit());
        assert!(state.claim_report());
    }

    #[test]
    fn disabling_suppresses_signals_but_keeps_the_ledger() {
        let t0 = Instant::now();
        let mut state = DetectorState::new(3);

        lost(&mut state, t0);
        state.set_enabled(false);
        state.on_foreground_regained();
        assert_eq!(
            lost(&mut state, t0 + Duration::from_secs(5)),
            SignalOutcome::Disabled
        );

        state.set_enabled(true);
        assert_eq!(state.violation_count(), 1);
    }

    #[test]
    fn dismissing_the_warning_keeps_the_count() {
        let t0 = Instant::now();
        let mut state = DetectorState::new(3);

        lost(&mut state, t0);
        assert!(state.snapshot().warning_visible);

        state.dismiss_warning();
        assert!(!state.snapshot().warning_visible);
        assert_eq!(state.violation_count(), 1);
    }

    #[test]
    fn reset_clears_the_attempt_but_not_the_configuration() {
        let t0 = Instant::now();
        let mut state = DetectorState::new(5);
        state.set_enabled(false);

        lost(&mut state, t0);
        state.reset();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.violation_count, 0);
        assert_eq!(snapshot.escalation, Escalation::None);
        assert_eq!(snapshot.max_warnings, 5);
        assert!(!snapshot.enabled);
    }
}
