//! Remote signature sources: time-bounded blocking fetches

use super::{SignatureSet, TrackerSignature};
use crate::{GateError, GateResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Exodus tracker API response
#[derive(Debug, Deserialize)]
struct TrackerIndex {
    trackers: BTreeMap<String, TrackerSignature>,
}

/// Download a signature set in the cache schema
pub fn fetch_signature_set(name: &str, url: &str, timeout: Duration) -> GateResult<SignatureSet> {
    let body = fetch_text(url, timeout)?;
    SignatureSet::parse(name, &body)
        .map_err(|e| GateError::Fetch(format!("{} served unusable signatures: {}", url, e)))
}

/// Download the Exodus tracker database
pub fn fetch_trackers(url: &str, timeout: Duration) -> GateResult<Vec<TrackerSignature>> {
    let body = fetch_text(url, timeout)?;
    let trackers = parse_trackers(&body)?;
    tracing::debug!("{} trackers signatures loaded", trackers.len());
    Ok(trackers)
}

/// Translate the tracker API schema into tracker signatures
pub fn parse_trackers(body: &str) -> GateResult<Vec<TrackerSignature>> {
    let index: TrackerIndex = serde_json::from_str(body)?;
    Ok(index.trackers.into_values().collect())
}

fn fetch_text(url: &str, timeout: Duration) -> GateResult<String> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("gatescan/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|e| GateError::Fetch(format!("Failed to build HTTP client: {}", e)))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| GateError::Fetch(format!("Failed to download {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(GateError::Fetch(format!(
            "{} returned {}",
            url,
            response.status()
        )));
    }

    response
        .text()
        .map_err(|e| GateError::Fetch(format!("Failed to read response: {}", e)))
}
