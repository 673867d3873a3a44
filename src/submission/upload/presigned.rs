//! Two-phase upload: authorize → transfer to storage → notify.
//!
//! Objects transferred but never notified stay in storage; nothing here deletes them.
//! Authorize and notify are bounded by the request timeout; the transfer is not,
//! since its duration scales with the file.

use crate::error::{HttpFailure, SubmissionError};
use crate::submission::types::{
    Job, ResolvedEndpoint, StoredObject, SubmissionMetadata, UploadTicket, VideoFile,
};
use reqwest::multipart::{Form, Part};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

#[derive(Serialize)]
struct AuthorizeRequest<'a> {
    email: &'a str,
    stroke_type: &'a str,
    handedness: &'a str,
}

#[derive(Deserialize)]
struct PresignedPost {
    url: String,
    #[serde(default)]
    fields: IndexMap<String, String>,
}

#[derive(Deserialize)]
struct AuthorizeResponse {
    presigned: PresignedPost,
    s3_key: String,
}

#[derive(Serialize)]
struct NotifyRequest<'a> {
    s3_key: &'a str,
    email: &'a str,
    stroke_type: &'a str,
    handedness: &'a str,
    original_filename: &'a str,
    file_size: u64,
}

#[derive(Deserialize)]
struct NotifyResponse {
    job_id: String,
}

/// Drives the upload protocol for one file against one resolved endpoint
#[derive(Debug, Clone)]
pub struct UploadSession {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl UploadSession {
    pub fn new(client: reqwest::Client, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }

    /// Request a single-use ticket. Any failure is fatal; there is no retry.
    pub async fn authorize(
        &self,
        endpoint: &ResolvedEndpoint,
        metadata: &SubmissionMetadata,
    ) -> Result<UploadTicket, SubmissionError> {
        let request = AuthorizeRequest {
            email: &metadata.email,
            stroke_type: &metadata.stroke_type,
            handedness: &metadata.handedness,
        };

        let response = self
            .client
            .post(endpoint.join("upload-url"))
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| SubmissionError::Authorization {
                status: None,
                message: format!("HTTP request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let failure = HttpFailure::from_response(response).await;
            return Err(SubmissionError::Authorization {
                status: Some(failure.status),
                message: failure.message,
            });
        }

        let body: AuthorizeResponse =
            response
                .json()
                .await
                .map_err(|e| SubmissionError::Authorization {
                    status: None,
                    message: format!("Failed to parse authorization response: {}", e),
                })?;

        info!(s3_key = %body.s3_key, "Upload authorized");

        Ok(UploadTicket {
            fields: body.presigned.fields,
            target_url: body.presigned.url,
            object_key: body.s3_key,
        })
    }

    /// Multipart write of the ticket fields followed by the file, straight to storage.
    ///
    /// Consumes the ticket: after a failure the caller must authorize again.
    pub async fn transfer(
        &self,
        ticket: UploadTicket,
        file: &VideoFile,
    ) -> Result<StoredObject, SubmissionError> {
        let mut form = Form::new();
        // Signed fields in server order, file part last
        for (key, value) in ticket.fields {
            form = form.text(key, value);
        }
        form = form.part("file", file_part(file).await?);

        let response = self
            .client
            .post(&ticket.target_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SubmissionError::Transfer {
                status: None,
                message: format!("HTTP request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let failure = HttpFailure::from_response(response).await;
            warn!(
                s3_key = %ticket.object_key,
                status = failure.status,
                "Storage rejected upload; ticket is spent"
            );
            return Err(SubmissionError::Transfer {
                status: Some(failure.status),
                message: failure.message,
            });
        }

        info!(s3_key = %ticket.object_key, bytes = file.size, "Video uploaded to storage");

        Ok(StoredObject {
            object_key: ticket.object_key,
        })
    }

    /// Register the analysis job for a stored object
    pub async fn notify(
        &self,
        endpoint: &ResolvedEndpoint,
        object: &StoredObject,
        metadata: &SubmissionMetadata,
        file: &VideoFile,
    ) -> Result<Job, SubmissionError> {
        let request = NotifyRequest {
            s3_key: &object.object_key,
            email: &metadata.email,
            stroke_type: &metadata.stroke_type,
            handedness: &metadata.handedness,
            original_filename: &file.file_name,
            file_size: file.size,
        };

        let result = self.send_notify(endpoint, &request).await;
        if let Err(ref e) = result {
            // Transferred but never registered: the object is orphaned
            warn!(s3_key = %object.object_key, error = %e, "Stored object left without a job");
        }
        result
    }

    async fn send_notify(
        &self,
        endpoint: &ResolvedEndpoint,
        request: &NotifyRequest<'_>,
    ) -> Result<Job, SubmissionError> {
        let response = self
            .client
            .post(endpoint.join("notify"))
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| SubmissionError::Notify {
                status: None,
                message: format!("HTTP request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let failure = HttpFailure::from_response(response).await;
            return Err(SubmissionError::Notify {
                status: Some(failure.status),
                message: failure.message,
            });
        }

        let body: NotifyResponse = response.json().await.map_err(|e| SubmissionError::Notify {
            status: None,
            message: format!("Failed to parse notify response: {}", e),
        })?;

        info!(job_id = %body.job_id, "Analysis job registered");
        Ok(Job::queued(body.job_id))
    }
}

/// Stream the file from disk as a multipart part
pub(crate) async fn file_part(file: &VideoFile) -> Result<Part, SubmissionError> {
    let handle = tokio::fs::File::open(&file.path)
        .await
        .map_err(|e| SubmissionError::Transfer {
            status: None,
            message: format!("Failed to read file '{}': {}", file.path.display(), e),
        })?;

    let body = reqwest::Body::wrap_stream(ReaderStream::new(handle));
    Part::stream_with_length(body, file.size)
        .file_name(file.file_name.clone())
        .mime_str(&file.media_type)
        .map_err(|e| SubmissionError::Transfer {
            status: None,
            message: format!("Invalid media type '{}': {}", file.media_type, e),
        })
}
