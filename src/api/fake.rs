//! Recording fake of [`ProctorApi`] shared by the controller and reporter
//! tests. Lock discipline mirrors production: nothing is held across awaits.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{CheatingReport, ProctorApi, SegmentUpload};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub index: u64,
    pub duration_seconds: u64,
    pub bytes: usize,
}

#[derive(Default)]
pub struct FakeApi {
    uploads: Mutex<Vec<RecordedUpload>>,
    fail_upload_indices: Mutex<HashSet<u64>>,
    report_calls: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_upload(&self, index: u64) {
        self.fail_upload_indices.lock().unwrap().insert(index);
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn upload_indices(&self) -> Vec<u64> {
        self.uploads().into_iter().map(|u| u.index).collect()
    }

    pub fn report_calls(&self) -> usize {
        self.report_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProctorApi for FakeApi {
    async fn upload_segment(&self, upload: SegmentUpload) -> Result<()> {
        self.uploads.lock().unwrap().push(RecordedUpload {
            index: upload.index,
            duration_seconds: upload.duration_seconds,
            bytes: upload.data.len(),
        });

        if self.fail_upload_indices.lock().unwrap().contains(&upload.index) {
            return Err(anyhow!("scripted upload failure for segment {}", upload.index));
        }

        Ok(())
    }

    async fn report_cheating(&self, _report: CheatingReport) -> Result<bool> {
        self.report_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}
