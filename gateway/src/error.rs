//! Failure taxonomy shared by the wallet, chain and relay paths

use ethers::types::Address;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// No wallet is configured; writes cannot be signed. Surfaced to the
    /// user as a notice, never as a crash.
    #[error("no wallet is available to sign with")]
    WalletUnavailable,

    /// The wallet refused an authorization request.
    #[error("the wallet denied the authorization request")]
    AuthorizationDenied,

    /// The chain rejected a write (already voted, voting closed, proof
    /// invalid or already used, malformed scope).
    #[error("transaction reverted: {0}")]
    TransactionReverted(String),

    /// The target address does not expose the expected voting surface.
    /// Read paths treat this as "poll not found", not a hard failure.
    #[error("no readable vote contract at {0:#x}")]
    ContractUnreadable(Address),

    /// A client-side option index did not resolve against the poll's
    /// current option list.
    #[error("option {index} is out of range for poll {vote:#x}")]
    OptionNotFound { vote: Address, index: usize },

    /// Nothing is stored on the relay under the requested key, or the
    /// record expired. Recoverable by generating a fresh proof.
    #[error("no proof stored for {0}")]
    RelayMiss(String),

    /// A proof blob did not match the fixed tuple shape the contracts take.
    #[error("proof payload does not match the expected shape: {0}")]
    MalformedProof(String),

    /// Transport-level fault talking to the rpc node or the relay.
    #[error("transport: {0}")]
    Transport(String),
}
