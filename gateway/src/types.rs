//! Poll projections as this layer sees them; the chain stays the sole
//! source of truth and everything here is a transient copy.

use std::time::{SystemTime, UNIX_EPOCH};

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::eligibility::EligibilityRequirements;

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Full state of one poll, assembled from the vote contract's accessors.
///
/// `total_votes` is derived from `votes` at assembly time, so the
/// sum-consistency invariant holds by construction even when the contract's
/// own counter moves between calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub address: Address,
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
    pub votes: Vec<u64>,
    pub total_votes: u64,
    pub end_time: u64,
    pub creator: Address,
    pub scope: U256,
}

impl Poll {
    pub fn status(&self) -> PollStatus {
        self.status_at(unix_now())
    }

    /// Purely a function of wall-clock time against the immutable end time;
    /// no explicit state-change call exists in this layer.
    pub fn status_at(&self, now: u64) -> PollStatus {
        if now < self.end_time {
            PollStatus::Pending
        } else {
            PollStatus::Closed
        }
    }
}

/// A poll that still accepts votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Pending,
    Closed,
}

/// Reduced projection used for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePollSummary {
    pub address: Address,
    pub title: String,
    pub description: String,
    pub total_votes: u64,
    pub end_time: u64,
}

/// One entry of the factory's deployment registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployedVote {
    pub address: Address,
    pub scope: U256,
}

/// Listing-sized slice of a vote contract's state.
#[derive(Debug, Clone, PartialEq)]
pub struct PollHeader {
    pub title: String,
    pub description: String,
    pub total_votes: u64,
    pub end_time: u64,
}

/// Everything `getPoll` needs except the per-option tallies, which take a
/// second call once the option list is known.
#[derive(Debug, Clone, PartialEq)]
pub struct PollFields {
    pub title: String,
    pub description: String,
    pub scope: U256,
    pub options: Vec<String>,
    pub end_time: u64,
    pub creator: Address,
}

/// Inputs to poll creation, passed through unvalidated; the factory
/// contract owns every rule (option count, end time, duplicate titles).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePollParams {
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
    pub end_time: u64,
    pub scope: String,
    pub requirements: Option<EligibilityRequirements>,
}
