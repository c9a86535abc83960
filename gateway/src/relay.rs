//! HTTP client for the proof relay. Pass-through only: proofs travel in
//! both directions without interpretation.

use ethers::types::Address;
use serde::Deserialize;

use crate::error::GatewayError;
use crate::proof::{address_key, ProofSubmission};

pub struct RelayClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    status: String,
    proof: Option<serde_json::Value>,
    #[serde(rename = "publicSignals")]
    public_signals: Option<Vec<String>>,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        RelayClient {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Forward a freshly generated proof to the relay, unmodified.
    pub async fn store_proof(&self, submission: &ProofSubmission) -> Result<(), GatewayError> {
        let response = self
            .http
            .post(format!("{}/proof", self.base_url))
            .json(submission)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(GatewayError::Transport(format!(
                "relay rejected proof: {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Retrieve the proof stored for `address`. A missing or expired record
    /// is `RelayMiss`, a normal outcome the caller retries after generating
    /// a fresh proof.
    pub async fn fetch_proof(&self, address: Address) -> Result<ProofSubmission, GatewayError> {
        let key = address_key(address);
        let response = self
            .http
            .get(format!("{}/proof", self.base_url))
            .query(&[("address", key.as_str())])
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(GatewayError::Transport(format!(
                "relay fetch failed: {}",
                response.status()
            )));
        }
        let body: FetchResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        match (body.status.as_str(), body.proof, body.public_signals) {
            ("success", Some(proof), Some(public_signals)) => Ok(ProofSubmission {
                proof,
                public_signals,
            }),
            _ => Err(GatewayError::RelayMiss(key)),
        }
    }
}
