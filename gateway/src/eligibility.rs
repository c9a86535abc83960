//! Assembly of the verification-hub parameter bundle.
//!
//! The bundle is forwarded opaquely into the deployed vote contract's
//! constructor; nothing here interprets it beyond packing the fields the
//! hub expects.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// How many 3-letter country codes fit into one packed word.
const CODES_PER_WORD: usize = 10;

/// Number of packed words the hub config carries.
pub const FORBIDDEN_COUNTRY_WORDS: usize = 4;

/// What the poll-creation form collects. Validation (age bounds, code
/// shapes) is the chain's job, not ours.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityRequirements {
    pub require_name: bool,
    pub require_nationality: bool,
    pub minimum_age: Option<u8>,
    #[serde(default)]
    pub forbidden_countries: Vec<String>,
    #[serde(default)]
    pub ofac: bool,
}

/// Hub parameters fixed per deployment rather than per poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubParams {
    pub hub: Address,
    pub attestation_id: U256,
}

/// The structured bundle handed to `createVote`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityConfig {
    pub hub: Address,
    pub attestation_id: U256,
    pub disclose_name: bool,
    pub disclose_nationality: bool,
    pub older_than_enabled: bool,
    pub older_than: U256,
    pub forbidden_countries_enabled: bool,
    pub forbidden_countries_list_packed: [U256; FORBIDDEN_COUNTRY_WORDS],
    pub ofac_enabled: [bool; 3],
}

impl EligibilityConfig {
    /// Build the bundle for a poll. Absent requirements produce a config
    /// with every gate disabled, which the hub treats as "anyone verified".
    pub fn assemble(hub: &HubParams, requirements: Option<&EligibilityRequirements>) -> Self {
        let reqs = requirements.cloned().unwrap_or_default();
        let minimum_age = reqs.minimum_age;
        let forbidden_enabled = !reqs.forbidden_countries.is_empty();
        EligibilityConfig {
            hub: hub.hub,
            attestation_id: hub.attestation_id,
            disclose_name: reqs.require_name,
            disclose_nationality: reqs.require_nationality,
            older_than_enabled: minimum_age.is_some(),
            older_than: U256::from(minimum_age.unwrap_or(0)),
            forbidden_countries_enabled: forbidden_enabled,
            forbidden_countries_list_packed: pack_forbidden_countries(&reqs.forbidden_countries),
            ofac_enabled: [reqs.ofac; 3],
        }
    }
}

/// Pack 3-letter country codes into the hub's fixed word layout: ten codes
/// per word, three bytes per code, big-endian, surplus codes dropped.
pub fn pack_forbidden_countries(codes: &[String]) -> [U256; FORBIDDEN_COUNTRY_WORDS] {
    let mut words = [U256::zero(); FORBIDDEN_COUNTRY_WORDS];
    for (chunk, word) in codes.chunks(CODES_PER_WORD).zip(words.iter_mut()) {
        let mut bytes = [0u8; 32];
        let mut cursor = 32 - chunk.len() * 3;
        for code in chunk {
            let ascii = code.trim().to_ascii_uppercase();
            let code_bytes = ascii.as_bytes();
            for i in 0..3 {
                bytes[cursor] = code_bytes.get(i).copied().unwrap_or(0);
                cursor += 1;
            }
        }
        *word = U256::from_big_endian(&bytes);
    }
    words
}
