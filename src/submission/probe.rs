//! Liveness check for one candidate endpoint.

use super::types::{Candidate, ProbeResult};
use crate::config::ProbePolicy;
use std::time::Instant;
use tracing::debug;

/// Issues `GET {base}/health` with a bounded timeout
#[derive(Debug, Clone)]
pub struct EndpointProbe {
    client: reqwest::Client,
    policy: ProbePolicy,
}

impl EndpointProbe {
    pub fn new(client: reqwest::Client, policy: ProbePolicy) -> Self {
        Self { client, policy }
    }

    /// Never fails: network errors, timeouts, non-2xx statuses and non-JSON bodies
    /// all come back as `available: false`.
    pub async fn probe(&self, candidate: &Candidate) -> ProbeResult {
        let started = Instant::now();
        let url = format!("{}/health", candidate.url);

        let outcome = tokio::time::timeout(self.policy.timeout, self.check(&url)).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(())) => {
                debug!(url = %candidate.url, latency_ms, "Backend available");
                ProbeResult {
                    url: candidate.url.clone(),
                    available: true,
                    latency_ms: Some(latency_ms),
                }
            }
            Ok(Err(reason)) => {
                debug!(url = %candidate.url, latency_ms, reason = %reason, "Backend unavailable");
                ProbeResult {
                    url: candidate.url.clone(),
                    available: false,
                    latency_ms: None,
                }
            }
            Err(_) => {
                debug!(url = %candidate.url, latency_ms, "Backend health check timed out");
                ProbeResult {
                    url: candidate.url.clone(),
                    available: false,
                    latency_ms: None,
                }
            }
        }
    }

    async fn check(&self, url: &str) -> Result<(), String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("status {}", response.status()));
        }

        // Body content is ignored beyond parse success
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| format!("invalid health body: {}", e))?;

        Ok(())
    }
}
