//! ABI bindings for the factory/vote contract pair and the chain backend
//! the gateway talks through.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::contract::{abigen, ContractError, EthLogDecode};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, TxHash, U256};
use log::debug;

use crate::eligibility::EligibilityConfig;
use crate::error::GatewayError;
use crate::proof::ProofPayload;
use crate::types::{CreatePollParams, DeployedVote, PollFields, PollHeader};

abigen!(
    VoteFactory,
    r#"[
        struct VerificationConfig { address hub; uint256 attestationId; bool discloseName; bool discloseNationality; bool olderThanEnabled; uint256 olderThan; bool forbiddenCountriesEnabled; uint256[4] forbiddenCountriesListPacked; bool[3] ofacEnabled }
        struct VoteEntry { address vote; uint256 scope }
        function getAllVotes() external view returns (VoteEntry[])
        function createVote(string title, string description, uint256 endTime, string[] options, string scope, VerificationConfig config) external returns (address)
        event VoteCreated(address indexed vote, address indexed creator)
    ]"#
);

abigen!(
    BallotVote,
    r#"[
        function title() external view returns (string)
        function description() external view returns (string)
        function scope() external view returns (uint256)
        function creator() external view returns (address)
        function endTime() external view returns (uint256)
        function totalVotes() external view returns (uint256)
        function getOptions() external view returns (string[])
        function getVotesOf(string[] options) external view returns (uint256[])
        function hasVoted(address voter) external view returns (bool)
        function vote(string option, uint256[2] a, uint256[2][2] b, uint256[2] c, uint256[21] pubSignals) external
    ]"#
);

impl From<&EligibilityConfig> for VerificationConfig {
    fn from(config: &EligibilityConfig) -> Self {
        VerificationConfig {
            hub: config.hub,
            attestation_id: config.attestation_id,
            disclose_name: config.disclose_name,
            disclose_nationality: config.disclose_nationality,
            older_than_enabled: config.older_than_enabled,
            older_than: config.older_than,
            forbidden_countries_enabled: config.forbidden_countries_enabled,
            forbidden_countries_list_packed: config.forbidden_countries_list_packed,
            ofac_enabled: config.ofac_enabled,
        }
    }
}

/// Raw contract surface the gateway composes over. Production code uses
/// [`EthersChain`]; tests substitute their own implementations.
#[async_trait]
pub trait VoteChain: Send + Sync {
    /// Every vote contract the factory knows about, in deployment order.
    async fn deployed_votes(&self) -> Result<Vec<DeployedVote>, GatewayError>;

    /// Listing-sized slice of one vote contract's state.
    async fn header(&self, vote: Address) -> Result<PollHeader, GatewayError>;

    /// Full field set except per-option tallies.
    async fn fields(&self, vote: Address) -> Result<PollFields, GatewayError>;

    /// Tallies for the given option labels, same order.
    async fn option_votes(
        &self,
        vote: Address,
        options: &[String],
    ) -> Result<Vec<u64>, GatewayError>;

    async fn has_voted(&self, vote: Address, voter: Address) -> Result<bool, GatewayError>;

    /// Submit the creation transaction, wait for it to mine and return the
    /// deployed vote contract's address from the creation event.
    async fn submit_create(
        &self,
        params: &CreatePollParams,
        config: &EligibilityConfig,
    ) -> Result<Address, GatewayError>;

    /// Submit a vote transaction and return the mined transaction hash.
    async fn submit_vote(
        &self,
        vote: Address,
        option: &str,
        proof: &ProofPayload,
    ) -> Result<TxHash, GatewayError>;
}

/// `VoteChain` over a JSON-RPC node. Reads go through a bare provider;
/// writes need the signing client and fail with `WalletUnavailable` when no
/// key was configured.
pub struct EthersChain {
    provider: Arc<Provider<Http>>,
    signer: Option<Arc<SignerMiddleware<Provider<Http>, LocalWallet>>>,
    factory: Address,
}

impl EthersChain {
    pub async fn connect(
        rpc_url: &str,
        factory: Address,
        signer_key: Option<&str>,
    ) -> Result<Self, GatewayError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| GatewayError::Transport(format!("rpc provider: {e}")))?;

        let signer = match signer_key {
            Some(key) => {
                let chain_id = provider
                    .get_chainid()
                    .await
                    .map_err(|e| GatewayError::Transport(e.to_string()))?;
                let wallet = key
                    .parse::<LocalWallet>()
                    .map_err(|e| GatewayError::Transport(format!("invalid wallet key: {e}")))?
                    .with_chain_id(chain_id.as_u64());
                Some(Arc::new(SignerMiddleware::new(provider.clone(), wallet)))
            }
            None => None,
        };

        Ok(EthersChain {
            provider: Arc::new(provider),
            signer,
            factory,
        })
    }

    pub async fn chain_id(&self) -> Result<u64, GatewayError> {
        let id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(id.as_u64())
    }

    fn signing_client(
        &self,
    ) -> Result<Arc<SignerMiddleware<Provider<Http>, LocalWallet>>, GatewayError> {
        self.signer.clone().ok_or(GatewayError::WalletUnavailable)
    }
}

/// Any failed read against a vote address means the caller sees no usable
/// voting surface there.
fn read_err<M: Middleware>(vote: Address, err: ContractError<M>) -> GatewayError {
    debug!("read against {vote:#x} failed: {err}");
    GatewayError::ContractUnreadable(vote)
}

fn factory_err<M: Middleware>(err: ContractError<M>) -> GatewayError {
    GatewayError::Transport(err.to_string())
}

fn write_err<M: Middleware>(err: ContractError<M>) -> GatewayError {
    if let Some(reason) = err.decode_revert::<String>() {
        GatewayError::TransactionReverted(reason)
    } else if let Some(raw) = err.as_revert() {
        GatewayError::TransactionReverted(format!("0x{}", hex::encode(raw)))
    } else {
        GatewayError::Transport(err.to_string())
    }
}

fn clamp_u64(value: U256) -> u64 {
    if value > U256::from(u64::MAX) {
        u64::MAX
    } else {
        value.as_u64()
    }
}

#[async_trait]
impl VoteChain for EthersChain {
    async fn deployed_votes(&self) -> Result<Vec<DeployedVote>, GatewayError> {
        let factory = VoteFactory::new(self.factory, self.provider.clone());
        let call = factory.get_all_votes();
        let entries = call.call().await.map_err(factory_err)?;
        Ok(entries
            .into_iter()
            .map(|entry| DeployedVote {
                address: entry.0,
                scope: entry.1,
            })
            .collect())
    }

    async fn header(&self, vote: Address) -> Result<PollHeader, GatewayError> {
        let contract = BallotVote::new(vote, self.provider.clone());
        let title = contract.title();
        let description = contract.description();
        let total_votes = contract.total_votes();
        let end_time = contract.end_time();
        let (title, description, total_votes, end_time) = tokio::try_join!(
            title.call(),
            description.call(),
            total_votes.call(),
            end_time.call(),
        )
        .map_err(|e| read_err(vote, e))?;
        Ok(PollHeader {
            title,
            description,
            total_votes: clamp_u64(total_votes),
            end_time: clamp_u64(end_time),
        })
    }

    async fn fields(&self, vote: Address) -> Result<PollFields, GatewayError> {
        let contract = BallotVote::new(vote, self.provider.clone());
        let title = contract.title();
        let description = contract.description();
        let scope = contract.scope();
        let options = contract.get_options();
        let end_time = contract.end_time();
        let creator = contract.creator();
        let (title, description, scope, options, end_time, creator) = tokio::try_join!(
            title.call(),
            description.call(),
            scope.call(),
            options.call(),
            end_time.call(),
            creator.call(),
        )
        .map_err(|e| read_err(vote, e))?;
        Ok(PollFields {
            title,
            description,
            scope,
            options,
            end_time: clamp_u64(end_time),
            creator,
        })
    }

    async fn option_votes(
        &self,
        vote: Address,
        options: &[String],
    ) -> Result<Vec<u64>, GatewayError> {
        let contract = BallotVote::new(vote, self.provider.clone());
        let call = contract.get_votes_of(options.to_vec());
        let counts = call.call().await.map_err(|e| read_err(vote, e))?;
        Ok(counts.into_iter().map(clamp_u64).collect())
    }

    async fn has_voted(&self, vote: Address, voter: Address) -> Result<bool, GatewayError> {
        let contract = BallotVote::new(vote, self.provider.clone());
        let call = contract.has_voted(voter);
        call.call().await.map_err(|e| read_err(vote, e))
    }

    async fn submit_create(
        &self,
        params: &CreatePollParams,
        config: &EligibilityConfig,
    ) -> Result<Address, GatewayError> {
        let factory = VoteFactory::new(self.factory, self.signing_client()?);
        let call = factory.create_vote(
            params.title.clone(),
            params.description.clone(),
            U256::from(params.end_time),
            params.options.clone(),
            params.scope.clone(),
            config.into(),
        );
        let pending = call.send().await.map_err(write_err)?;
        let receipt = pending
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?
            .ok_or_else(|| GatewayError::Transport("creation transaction dropped".into()))?;
        if receipt.status == Some(0u64.into()) {
            return Err(GatewayError::TransactionReverted(
                "creation transaction reverted".into(),
            ));
        }
        receipt
            .logs
            .iter()
            .find_map(|log| VoteCreatedFilter::decode_log(&log.clone().into()).ok())
            .map(|event| event.vote)
            .ok_or_else(|| GatewayError::Transport("creation event missing from receipt".into()))
    }

    async fn submit_vote(
        &self,
        vote: Address,
        option: &str,
        proof: &ProofPayload,
    ) -> Result<TxHash, GatewayError> {
        let contract = BallotVote::new(vote, self.signing_client()?);
        let call = contract.vote(
            option.to_string(),
            proof.a,
            proof.b,
            proof.c,
            proof.pub_signals,
        );
        let pending = call.send().await.map_err(write_err)?;
        let receipt = pending
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?
            .ok_or_else(|| GatewayError::Transport("vote transaction dropped".into()))?;
        if receipt.status == Some(0u64.into()) {
            return Err(GatewayError::TransactionReverted(
                "vote transaction reverted".into(),
            ));
        }
        Ok(receipt.transaction_hash)
    }
}
