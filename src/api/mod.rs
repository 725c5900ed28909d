use anyhow::Result;
use async_trait::async_trait;

use crate::attempt::{AssessmentKind, AssessmentTarget};

pub mod http;

#[cfg(test)]
pub(crate) mod fake;

pub use http::HttpProctorApi;

/// One drained segment, detached from the capture buffer and ready for the
/// wire. Consumed exactly once; there is no retry path.
#[derive(Debug, Clone)]
pub struct SegmentUpload {
    pub target: AssessmentTarget,
    pub index: u64,
    pub duration_seconds: u64,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// The one-shot "this attempt was flagged" signal.
#[derive(Debug, Clone)]
pub struct CheatingReport {
    pub kind: AssessmentKind,
    pub target_id: String,
}

/// The two backend endpoints this subsystem consumes. Everything else the
/// backend offers is out of scope.
#[async_trait]
pub trait ProctorApi: Send + Sync {
    async fn upload_segment(&self, upload: SegmentUpload) -> Result<()>;

    /// Returns whether the backend accepted the report.
    async fn report_cheating(&self, report: CheatingReport) -> Result<bool>;
}
