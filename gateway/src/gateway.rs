//! The poll-lifecycle read/write layer between views and the chain.

use std::sync::Arc;

use ethers::types::{Address, TxHash};
use futures::future;
use log::warn;

use crate::chain::VoteChain;
use crate::eligibility::{EligibilityConfig, HubParams};
use crate::error::GatewayError;
use crate::proof::ProofPayload;
use crate::types::{unix_now, ActivePollSummary, CreatePollParams, Poll};

pub struct ContractGateway {
    chain: Arc<dyn VoteChain>,
    hub: HubParams,
}

impl ContractGateway {
    pub fn new(chain: Arc<dyn VoteChain>, hub: HubParams) -> Self {
        ContractGateway { chain, hub }
    }

    /// Every poll whose end time is still strictly in the future.
    ///
    /// Per-poll queries run concurrently and are failure-isolated: one
    /// broken contract is logged and dropped, never allowed to blank the
    /// listing. Result order follows the factory's deployment order.
    pub async fn list_active_polls(&self) -> Result<Vec<ActivePollSummary>, GatewayError> {
        let deployed = self.chain.deployed_votes().await?;
        let now = unix_now();

        let headers = future::join_all(deployed.iter().map(|entry| async move {
            match self.chain.header(entry.address).await {
                Ok(header) => Some((entry.address, header)),
                Err(err) => {
                    warn!("dropping poll {:#x} from listing: {err}", entry.address);
                    None
                }
            }
        }))
        .await;

        Ok(headers
            .into_iter()
            .flatten()
            .filter(|(_, header)| header.end_time > now)
            .map(|(address, header)| ActivePollSummary {
                address,
                title: header.title,
                description: header.description,
                total_votes: header.total_votes,
                end_time: header.end_time,
            })
            .collect())
    }

    /// Full poll state, or `None` when the address exposes no readable
    /// voting surface, so callers can redirect instead of crashing.
    ///
    /// `total_votes` is the sum of the tallies fetched here, keeping the
    /// sum-consistency invariant independent of the contract's counter.
    pub async fn get_poll(&self, vote: Address) -> Result<Option<Poll>, GatewayError> {
        let fields = match self.chain.fields(vote).await {
            Ok(fields) => fields,
            Err(GatewayError::ContractUnreadable(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        let votes = match self.chain.option_votes(vote, &fields.options).await {
            Ok(votes) => votes,
            Err(GatewayError::ContractUnreadable(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        let total_votes = votes.iter().sum();
        Ok(Some(Poll {
            address: vote,
            title: fields.title,
            description: fields.description,
            options: fields.options,
            votes,
            total_votes,
            end_time: fields.end_time,
            creator: fields.creator,
            scope: fields.scope,
        }))
    }

    /// Deploy a new poll. No client-side validation: the factory owns every
    /// rule. Resolves once the transaction mined, with the new contract's
    /// address from the creation event.
    pub async fn create_poll(&self, params: &CreatePollParams) -> Result<Address, GatewayError> {
        let config = EligibilityConfig::assemble(&self.hub, params.requirements.as_ref());
        self.chain.submit_create(params, &config).await
    }

    /// Cast by option index. The index is a client-side artifact; it is
    /// resolved against the poll's current option list before anything
    /// touches the wallet, and a stale or out-of-range index fails closed.
    pub async fn cast_vote(
        &self,
        vote: Address,
        option_index: usize,
        proof: &ProofPayload,
    ) -> Result<TxHash, GatewayError> {
        let fields = self.chain.fields(vote).await?;
        let label = fields
            .options
            .get(option_index)
            .cloned()
            .ok_or(GatewayError::OptionNotFound {
                vote,
                index: option_index,
            })?;
        self.cast_vote_label(vote, &label, proof).await
    }

    /// Cast by option label, the chain's own identifier for an option. The
    /// label the voter saw travels unmodified. No local state is updated on
    /// success; callers re-fetch.
    pub async fn cast_vote_label(
        &self,
        vote: Address,
        label: &str,
        proof: &ProofPayload,
    ) -> Result<TxHash, GatewayError> {
        self.chain.submit_vote(vote, label, proof).await
    }

    pub async fn has_voted(&self, vote: Address, voter: Address) -> Result<bool, GatewayError> {
        self.chain.has_voted(vote, voter).await
    }

    /// Polls created by `creator`, with the listing's failure-isolation
    /// policy.
    pub async fn polls_created_by(&self, creator: Address) -> Result<Vec<Poll>, GatewayError> {
        let deployed = self.chain.deployed_votes().await?;
        let polls =
            future::join_all(deployed.iter().map(|entry| self.get_poll(entry.address))).await;
        Ok(polls
            .into_iter()
            .filter_map(|result| match result {
                Ok(poll) => poll,
                Err(err) => {
                    warn!("dropping poll from creator listing: {err}");
                    None
                }
            })
            .filter(|poll| poll.creator == creator)
            .collect())
    }

    /// Polls `voter` has already voted on.
    pub async fn polls_voted_by(&self, voter: Address) -> Result<Vec<Poll>, GatewayError> {
        let deployed = self.chain.deployed_votes().await?;
        let voted = future::join_all(deployed.iter().map(|entry| async move {
            match self.chain.has_voted(entry.address, voter).await {
                Ok(true) => Some(entry.address),
                Ok(false) => None,
                Err(err) => {
                    warn!("dropping poll {:#x} from vote listing: {err}", entry.address);
                    None
                }
            }
        }))
        .await;

        let polls =
            future::join_all(voted.into_iter().flatten().map(|vote| self.get_poll(vote))).await;
        Ok(polls
            .into_iter()
            .filter_map(|result| match result {
                Ok(poll) => poll,
                Err(err) => {
                    warn!("dropping poll from vote listing: {err}");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::EligibilityRequirements;
    use crate::proof::PUBLIC_SIGNAL_COUNT;
    use crate::types::{DeployedVote, PollFields, PollHeader};
    use async_trait::async_trait;
    use ethers::types::U256;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MockPoll {
        fields: PollFields,
        votes: Vec<u64>,
        broken: bool,
        voters: Vec<Address>,
    }

    #[derive(Default)]
    struct MockChain {
        order: Vec<Address>,
        polls: HashMap<Address, MockPoll>,
        submitted: Mutex<Vec<(Address, String)>>,
        created_config: Mutex<Option<EligibilityConfig>>,
    }

    impl MockChain {
        fn add_poll(
            &mut self,
            address: Address,
            end_time: u64,
            options: &[&str],
            votes: &[u64],
            creator: Address,
        ) {
            self.order.push(address);
            self.polls.insert(
                address,
                MockPoll {
                    fields: PollFields {
                        title: format!("poll {:#x}", address),
                        description: String::new(),
                        scope: U256::zero(),
                        options: options.iter().map(|s| s.to_string()).collect(),
                        end_time,
                        creator,
                    },
                    votes: votes.to_vec(),
                    broken: false,
                    voters: vec![],
                },
            );
        }

        fn break_poll(&mut self, address: Address) {
            if let Some(poll) = self.polls.get_mut(&address) {
                poll.broken = true;
            }
        }

        fn poll(&self, vote: Address) -> Result<&MockPoll, GatewayError> {
            match self.polls.get(&vote) {
                Some(poll) if !poll.broken => Ok(poll),
                _ => Err(GatewayError::ContractUnreadable(vote)),
            }
        }
    }

    #[async_trait]
    impl VoteChain for MockChain {
        async fn deployed_votes(&self) -> Result<Vec<DeployedVote>, GatewayError> {
            Ok(self
                .order
                .iter()
                .map(|&address| DeployedVote {
                    address,
                    scope: U256::zero(),
                })
                .collect())
        }

        async fn header(&self, vote: Address) -> Result<PollHeader, GatewayError> {
            let poll = self.poll(vote)?;
            Ok(PollHeader {
                title: poll.fields.title.clone(),
                description: poll.fields.description.clone(),
                total_votes: poll.votes.iter().sum(),
                end_time: poll.fields.end_time,
            })
        }

        async fn fields(&self, vote: Address) -> Result<PollFields, GatewayError> {
            Ok(self.poll(vote)?.fields.clone())
        }

        async fn option_votes(
            &self,
            vote: Address,
            options: &[String],
        ) -> Result<Vec<u64>, GatewayError> {
            let poll = self.poll(vote)?;
            assert_eq!(options, &poll.fields.options[..]);
            Ok(poll.votes.clone())
        }

        async fn has_voted(&self, vote: Address, voter: Address) -> Result<bool, GatewayError> {
            Ok(self.poll(vote)?.voters.contains(&voter))
        }

        async fn submit_create(
            &self,
            _params: &CreatePollParams,
            config: &EligibilityConfig,
        ) -> Result<Address, GatewayError> {
            *self.created_config.lock().unwrap() = Some(config.clone());
            Ok(Address::repeat_byte(0xcc))
        }

        async fn submit_vote(
            &self,
            vote: Address,
            option: &str,
            _proof: &ProofPayload,
        ) -> Result<TxHash, GatewayError> {
            self.submitted
                .lock()
                .unwrap()
                .push((vote, option.to_string()));
            Ok(TxHash::repeat_byte(0xdd))
        }
    }

    fn address(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn proof() -> ProofPayload {
        ProofPayload {
            a: [U256::one(); 2],
            b: [[U256::one(); 2]; 2],
            c: [U256::one(); 2],
            pub_signals: [U256::one(); PUBLIC_SIGNAL_COUNT],
        }
    }

    fn far_future() -> u64 {
        unix_now() + 86_400
    }

    fn gateway(chain: MockChain) -> ContractGateway {
        ContractGateway::new(
            Arc::new(chain),
            HubParams {
                hub: address(0xaa),
                attestation_id: U256::one(),
            },
        )
    }

    #[tokio::test]
    async fn listing_drops_broken_polls_and_keeps_order() {
        let mut chain = MockChain::default();
        chain.add_poll(address(1), far_future(), &["Yes", "No"], &[1, 2], address(9));
        chain.add_poll(address(2), far_future(), &["Yes", "No"], &[0, 0], address(9));
        chain.add_poll(address(3), far_future(), &["Yes", "No"], &[5, 5], address(9));
        chain.break_poll(address(2));

        let listed = gateway(chain).list_active_polls().await.unwrap();
        let addresses: Vec<Address> = listed.iter().map(|p| p.address).collect();
        assert_eq!(addresses, vec![address(1), address(3)]);
    }

    #[tokio::test]
    async fn listing_filters_polls_past_their_end_time() {
        let mut chain = MockChain::default();
        chain.add_poll(address(1), far_future(), &["A", "B"], &[0, 0], address(9));
        chain.add_poll(address(2), unix_now() - 10, &["A", "B"], &[3, 4], address(9));

        let listed = gateway(chain).list_active_polls().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].address, address(1));
        assert!(listed[0].end_time > unix_now());
    }

    #[tokio::test]
    async fn get_poll_totals_are_sum_consistent() {
        let mut chain = MockChain::default();
        chain.add_poll(
            address(1),
            far_future(),
            &["A", "B", "C"],
            &[7, 2, 1],
            address(9),
        );

        let poll = gateway(chain).get_poll(address(1)).await.unwrap().unwrap();
        assert_eq!(poll.total_votes, 10);
        assert_eq!(poll.votes.iter().sum::<u64>(), poll.total_votes);
        assert_eq!(poll.options.len(), poll.votes.len());
    }

    #[tokio::test]
    async fn get_poll_on_an_unreadable_address_is_absent_not_an_error() {
        let chain = MockChain::default();
        let poll = gateway(chain).get_poll(address(7)).await.unwrap();
        assert!(poll.is_none());
    }

    #[tokio::test]
    async fn out_of_range_index_fails_before_any_wallet_interaction() {
        let mut chain = MockChain::default();
        chain.add_poll(address(1), far_future(), &["A", "B"], &[0, 0], address(9));
        let gateway = gateway(chain);

        let err = gateway
            .cast_vote(address(1), 2, &proof())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::OptionNotFound {
                vote: address(1),
                index: 2
            }
        );
    }

    #[tokio::test]
    async fn cast_vote_resolves_the_index_to_its_label() {
        let mut chain = MockChain::default();
        chain.add_poll(address(1), far_future(), &["A", "B"], &[0, 0], address(9));
        let chain = Arc::new(chain);
        let gateway = ContractGateway::new(
            chain.clone(),
            HubParams {
                hub: address(0xaa),
                attestation_id: U256::one(),
            },
        );

        gateway.cast_vote(address(1), 1, &proof()).await.unwrap();
        assert_eq!(
            chain.submitted.lock().unwrap().as_slice(),
            &[(address(1), "B".to_string())]
        );
    }

    #[tokio::test]
    async fn cast_vote_label_passes_the_label_unmodified() {
        let mut chain = MockChain::default();
        chain.add_poll(address(1), far_future(), &["A", "B"], &[0, 0], address(9));
        let chain = Arc::new(chain);
        let gateway = ContractGateway::new(
            chain.clone(),
            HubParams {
                hub: address(0xaa),
                attestation_id: U256::one(),
            },
        );

        gateway
            .cast_vote_label(address(1), "Maybe Later", &proof())
            .await
            .unwrap();
        assert_eq!(
            chain.submitted.lock().unwrap().as_slice(),
            &[(address(1), "Maybe Later".to_string())]
        );
    }

    #[tokio::test]
    async fn create_poll_assembles_the_hub_config() {
        let chain = Arc::new(MockChain::default());
        let gateway = ContractGateway::new(
            chain.clone(),
            HubParams {
                hub: address(0xaa),
                attestation_id: U256::from(5),
            },
        );

        let params = CreatePollParams {
            title: "t".into(),
            description: String::new(),
            options: vec!["A".into(), "B".into()],
            end_time: far_future(),
            scope: "poll-scope".into(),
            requirements: Some(EligibilityRequirements {
                minimum_age: Some(21),
                ..Default::default()
            }),
        };
        let deployed = gateway.create_poll(&params).await.unwrap();
        assert_eq!(deployed, address(0xcc));

        let config = chain.created_config.lock().unwrap().clone().unwrap();
        assert_eq!(config.hub, address(0xaa));
        assert_eq!(config.attestation_id, U256::from(5));
        assert!(config.older_than_enabled);
        assert_eq!(config.older_than, U256::from(21));
    }

    #[tokio::test]
    async fn creator_and_voter_listings_filter_correctly() {
        let mut chain = MockChain::default();
        chain.add_poll(address(1), far_future(), &["A", "B"], &[0, 0], address(9));
        chain.add_poll(address(2), far_future(), &["A", "B"], &[0, 0], address(8));
        if let Some(poll) = chain.polls.get_mut(&address(2)) {
            poll.voters.push(address(9));
        }
        let gateway = gateway(chain);

        let created = gateway.polls_created_by(address(9)).await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].address, address(1));

        let voted = gateway.polls_voted_by(address(9)).await.unwrap();
        assert_eq!(voted.len(), 1);
        assert_eq!(voted[0].address, address(2));
    }
}
