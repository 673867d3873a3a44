//! Single-shot upload: one multipart POST that returns the analysis synchronously.

use super::presigned::file_part;
use crate::error::{HttpFailure, SubmissionError};
use crate::submission::types::{AnalysisResult, ResolvedEndpoint, SubmissionMetadata, VideoFile};
use reqwest::multipart::Form;
use tracing::info;

/// `POST {base}/upload` with the video and metadata in one form
#[derive(Debug, Clone)]
pub struct DirectUpload {
    client: reqwest::Client,
}

impl DirectUpload {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn upload(
        &self,
        endpoint: &ResolvedEndpoint,
        file: &VideoFile,
        metadata: &SubmissionMetadata,
    ) -> Result<AnalysisResult, SubmissionError> {
        let form = build_form(metadata).part("video", file_part(file).await?);

        let response = self
            .client
            .post(endpoint.join("upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| SubmissionError::Transfer {
                status: None,
                message: format!("HTTP request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let failure = HttpFailure::from_response(response).await;
            return Err(SubmissionError::Transfer {
                status: Some(failure.status),
                message: failure.message,
            });
        }

        let result: serde_json::Value =
            response.json().await.map_err(|e| SubmissionError::Transfer {
                status: None,
                message: format!("Failed to parse analysis response: {}", e),
            })?;

        info!(file = %file.file_name, bytes = file.size, "Video analyzed in single request");
        Ok(AnalysisResult(result))
    }
}

fn build_form(metadata: &SubmissionMetadata) -> Form {
    let form = Form::new()
        .text("email", metadata.email.clone())
        .text("stroke_type", metadata.stroke_type.clone())
        .text("handedness", metadata.handedness.clone());

    match metadata.experience {
        Some(ref experience) => form.text("experience", experience.clone()),
        None => form,
    }
}
