//! Client-side layer for a decentralized voting deployment: the poll
//! read/write gateway, the wallet session, eligibility-config assembly and
//! the proof-relay client.
//!
//! The chain stays the sole source of truth throughout; this crate only
//! ever holds transient, non-authoritative copies of poll state.

pub mod chain;
pub mod eligibility;
pub mod error;
pub mod gateway;
pub mod proof;
pub mod relay;
pub mod types;
pub mod wallet;

pub use chain::{EthersChain, VoteChain};
pub use eligibility::{EligibilityConfig, EligibilityRequirements, HubParams};
pub use error::GatewayError;
pub use gateway::ContractGateway;
pub use proof::{ProofPayload, ProofSubmission};
pub use relay::RelayClient;
pub use types::{ActivePollSummary, CreatePollParams, Poll, PollStatus};
pub use wallet::{LocalKeyProvider, ProviderEvent, SessionState, WalletProvider, WalletSession};
