use std::sync::Arc;

use anyhow::Result;
use log::info;

use crate::api::{CheatingReport, ProctorApi};
use crate::attempt::AttemptContext;

/// `created_by` sentinel marking content a student generated for their own
/// practice.
pub const SELF_PRACTICE_MARKER: &str = "USER";

/// Whether an attempt is eligible for a cheating report.
///
/// A user practicing on content they made for themselves cannot be cheating
/// against anyone: a report is withheld only when `created_by` carries the
/// self-practice marker and no teacher owns the content. Every other
/// combination reports.
pub fn should_report(context: &AttemptContext) -> bool {
    if context.teacher_owner_id.is_some() {
        return true;
    }
    context.created_by.as_deref() != Some(SELF_PRACTICE_MARKER)
}

/// Delivers the best-effort "this attempt was flagged" signal. Idempotence is
/// the caller's job (the detector's report gate); this type only applies the
/// ownership rule and talks to the backend.
#[derive(Clone)]
pub struct CheatingReporter {
    api: Arc<dyn ProctorApi>,
}

impl CheatingReporter {
    pub fn new(api: Arc<dyn ProctorApi>) -> Self {
        Self { api }
    }

    /// Returns whether the backend accepted the report; `Ok(false)` without
    /// any network traffic for self-practice content.
    pub async fn report(&self, context: &AttemptContext) -> Result<bool> {
        if !should_report(context) {
            info!(
                "cheating report withheld for self-practice {} {}",
                context.target.kind().as_str(),
                context.target.id()
            );
            return Ok(false);
        }

        let report = CheatingReport {
            kind: context.target.kind(),
            target_id: context.target.id().to_string(),
        };

        self.api.report_cheating(report).await
    }
}
