use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use super::{CheatingReport, ProctorApi, SegmentUpload};
use crate::attempt::{AssessmentKind, AssessmentTarget};

/// Production [`ProctorApi`] speaking to the assessment backend over HTTP.
pub struct HttpProctorApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProctorApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[derive(Deserialize)]
struct ReportResponse {
    success: bool,
}

#[async_trait]
impl ProctorApi for HttpProctorApi {
    async fn upload_segment(&self, upload: SegmentUpload) -> Result<()> {
        let extension = container_extension(&upload.mime_type);
        let file_name = format!("segment-{:05}.{}", upload.index, extension);

        let part = Part::bytes(upload.data)
            .file_name(file_name)
            .mime_str(&upload.mime_type)
            .context("invalid segment mime type")?;

        let mut form = Form::new()
            .part("video", part)
            .text("videoType", "SCREEN")
            .text("durationSeconds", upload.duration_seconds.to_string())
            .text("segmentIndex", upload.index.to_string());

        form = match &upload.target {
            AssessmentTarget::Exam(id) => form.text("examId", id.clone()),
            AssessmentTarget::Quiz(id) => form.text("quizId", id.clone()),
        };

        let response = self
            .client
            .post(self.endpoint("recordings"))
            .multipart(form)
            .send()
            .await
            .context("segment upload request failed")?;

        if !response.status().is_success() {
            bail!("segment upload rejected with status {}", response.status());
        }

        Ok(())
    }

    async fn report_cheating(&self, report: CheatingReport) -> Result<bool> {
        let body = match report.kind {
            AssessmentKind::Exam => serde_json::json!({
                "type": "exam",
                "examId": report.target_id,
                "is_studentCheated": true,
            }),
            AssessmentKind::Quiz => serde_json::json!({
                "type": "quiz",
                "quizId": report.target_id,
                "is_studentCheated": true,
            }),
        };

        let response = self
            .client
            .post(self.endpoint("cheating-reports"))
            .json(&body)
            .send()
            .await
            .context("cheating report request failed")?;

        if !response.status().is_success() {
            bail!("cheating report rejected with status {}", response.status());
        }

        let parsed: ReportResponse = response
            .json()
            .await
            .context("cheating report response was not valid JSON")?;

        Ok(parsed.success)
    }
}

fn container_extension(mime_type: &str) -> &'static str {
    if mime_type.starts_with("video/webm") {
        "webm"
    } else if mime_type.starts_with("video/x-matroska") {
        "mkv"
    } else {
        "bin"
    }
}
