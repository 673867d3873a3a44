//! Endpoint resolution: probe every candidate concurrently and pick the fastest.

use super::probe::EndpointProbe;
use super::types::{Candidate, ProbeResult, ResolvedEndpoint};
use crate::config::SubmitConfig;
use crate::error::SubmissionError;
use futures::{stream, StreamExt};
use indexmap::IndexSet;
use tracing::{info, warn};
use url::{Host, Url};

/// Ordered, de-duplicated candidate addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateList(Vec<Candidate>);

impl CandidateList {
    /// Build from explicit URLs, dropping blanks and later duplicates
    pub fn from_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = IndexSet::new();
        for url in urls {
            let candidate = Candidate::new(url);
            if !candidate.url.is_empty() {
                seen.insert(candidate.url);
            }
        }
        Self(seen.into_iter().map(|url| Candidate { url }).collect())
    }

    /// Priority order: explicit address, origin-derived and LAN guesses, loopback fallbacks.
    ///
    /// Guesses are only added when the caller runs under a non-localhost origin.
    pub fn from_config(config: &SubmitConfig) -> Self {
        let mut urls: Vec<String> = Vec::new();

        if let Some(ref explicit) = config.backend_url {
            urls.push(explicit.clone());
        }

        if let Some(origin) = config.page_origin.as_deref().and_then(|o| Url::parse(o).ok()) {
            let is_localhost = origin.host_str().map_or(true, |h| h == "localhost");
            if !is_localhost {
                match origin.host() {
                    Some(Host::Ipv4(ip)) => {
                        urls.push(format!("http://{}:{}", ip, config.backend_port))
                    }
                    Some(Host::Ipv6(ip)) => {
                        urls.push(format!("http://[{}]:{}", ip, config.backend_port))
                    }
                    _ => {}
                }
                urls.extend(config.lan_guesses.iter().cloned());
            }
        }

        urls.extend(config.loopback_fallbacks.iter().cloned());
        Self::from_urls(urls)
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Lowest latency among available results; ties go to the earlier candidate
pub fn select_best(results: &[ProbeResult]) -> Option<ResolvedEndpoint> {
    results
        .iter()
        .enumerate()
        .filter(|(_, r)| r.available)
        .min_by_key(|(index, r)| (r.latency_ms.unwrap_or(u64::MAX), *index))
        .map(|(_, r)| ResolvedEndpoint { url: r.url.clone() })
}

#[derive(Debug, Clone)]
pub struct EndpointResolver {
    probe: EndpointProbe,
}

impl EndpointResolver {
    pub fn new(probe: EndpointProbe) -> Self {
        Self { probe }
    }

    /// Probe every candidate concurrently, waiting for all of them.
    ///
    /// Results are in candidate order.
    pub async fn probe_all(&self, candidates: &[Candidate]) -> Vec<ProbeResult> {
        // Every probe in flight at once; `buffered` yields in input order
        stream::iter(candidates)
            .map(|c| self.probe.probe(c))
            .buffered(candidates.len().max(1))
            .collect()
            .await
    }

    pub async fn resolve(&self, candidates: &[Candidate]) -> Result<ResolvedEndpoint, SubmissionError> {
        info!(candidates = candidates.len(), "Detecting backend servers");

        let results = self.probe_all(candidates).await;

        match select_best(&results) {
            Some(endpoint) => {
                let latency_ms = results
                    .iter()
                    .find(|r| r.url == endpoint.url)
                    .and_then(|r| r.latency_ms);
                info!(url = %endpoint.url, latency_ms, "Backend detected");
                Ok(endpoint)
            }
            None => {
                warn!(tried = candidates.len(), "No backend servers found");
                Err(SubmissionError::Connectivity {
                    tried: candidates.len(),
                })
            }
        }
    }
}
