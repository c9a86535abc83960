//! The zero-knowledge eligibility proof as an external data contract.
//!
//! The proof is a fixed-shape numeric tuple validated only by the chain;
//! everything here assembles or forwards it without interpreting the
//! contents. The one exception is the user-identifier public signal, which
//! the relay uses as its storage key.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Number of public signals the verifier circuit exposes.
pub const PUBLIC_SIGNAL_COUNT: usize = 21;

/// Index of the signal carrying the prover's user identifier (an address in
/// the low 20 bytes).
pub const USER_IDENTIFIER_SIGNAL: usize = 20;

/// Wire form of a proof as the prover hands it over: the proof points stay
/// an opaque JSON blob, the public signals are decimal (or 0x-hex) strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofSubmission {
    pub proof: serde_json::Value,
    #[serde(rename = "publicSignals")]
    pub public_signals: Vec<String>,
}

/// Typed form carried into the vote transaction: two 2-element arrays, one
/// 2x2 array and the 21 public signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofPayload {
    pub a: [U256; 2],
    pub b: [[U256; 2]; 2],
    pub c: [U256; 2],
    pub pub_signals: [U256; PUBLIC_SIGNAL_COUNT],
}

#[derive(Deserialize)]
struct ProofPointsWire {
    a: [String; 2],
    b: [[String; 2]; 2],
    c: [String; 2],
}

impl TryFrom<&ProofSubmission> for ProofPayload {
    type Error = GatewayError;

    fn try_from(submission: &ProofSubmission) -> Result<Self, GatewayError> {
        let points: ProofPointsWire = serde_json::from_value(submission.proof.clone())
            .map_err(|e| GatewayError::MalformedProof(e.to_string()))?;

        if submission.public_signals.len() != PUBLIC_SIGNAL_COUNT {
            return Err(GatewayError::MalformedProof(format!(
                "expected {} public signals, got {}",
                PUBLIC_SIGNAL_COUNT,
                submission.public_signals.len()
            )));
        }

        let mut pub_signals = [U256::zero(); PUBLIC_SIGNAL_COUNT];
        for (slot, raw) in pub_signals.iter_mut().zip(&submission.public_signals) {
            *slot = parse_uint(raw)
                .ok_or_else(|| GatewayError::MalformedProof(format!("bad signal `{raw}`")))?;
        }

        Ok(ProofPayload {
            a: parse_pair(&points.a)?,
            b: [parse_pair(&points.b[0])?, parse_pair(&points.b[1])?],
            c: parse_pair(&points.c)?,
            pub_signals,
        })
    }
}

fn parse_pair(raw: &[String; 2]) -> Result<[U256; 2], GatewayError> {
    let first = parse_uint(&raw[0]);
    let second = parse_uint(&raw[1]);
    match (first, second) {
        (Some(a), Some(b)) => Ok([a, b]),
        _ => Err(GatewayError::MalformedProof(format!(
            "bad proof point pair [{}, {}]",
            raw[0], raw[1]
        ))),
    }
}

/// Parse a field element from its decimal or 0x-hex string form.
pub fn parse_uint(raw: &str) -> Option<U256> {
    let trimmed = raw.trim();
    if let Some(hex_part) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        U256::from_str_radix(hex_part, 16).ok()
    } else {
        U256::from_dec_str(trimmed).ok()
    }
}

/// Normalize a raw identifier into the relay's storage-key form: case-folded,
/// 0x prefix and separator characters stripped.
///
/// Both the store path (derived from public signals) and the fetch path
/// (query parameter) go through this one function, so the two can never
/// drift apart.
pub fn normalize_key(raw: &str) -> String {
    let folded = raw.trim().to_ascii_lowercase();
    let stripped = folded.strip_prefix("0x").unwrap_or(&folded);
    stripped
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Storage key for a wallet address.
pub fn address_key(address: Address) -> String {
    normalize_key(&format!("{address:#x}"))
}

/// Derive the storage key from a submission's public signals, or `None` when
/// the signal set has the wrong arity or the identifier slot is unreadable.
pub fn user_identifier_key(signals: &[String]) -> Option<String> {
    if signals.len() != PUBLIC_SIGNAL_COUNT {
        return None;
    }
    let value = parse_uint(signals.get(USER_IDENTIFIER_SIGNAL)?)?;
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    Some(address_key(Address::from_slice(&buf[12..])))
}
