mod action;
mod views;

use std::sync::Arc;

use action::ActionState;
use anyhow::Result;
use clap::Parser;
use ethers::types::{Address, U256};
use log::info;
use poll_gateway::types::unix_now;
use poll_gateway::{
    ContractGateway, CreatePollParams, EligibilityRequirements, EthersChain, GatewayError,
    HubParams, LocalKeyProvider, PollStatus, ProofPayload, RelayClient, WalletProvider,
    WalletSession,
};

#[derive(Clone, Parser)]
#[command(author, version, about = "Terminal front end for the on-chain voting factory")]
struct Cli {
    #[arg(long, env = "RPC_URL", default_value = "http://localhost:8545")]
    pub rpc_url: String,

    #[arg(long, env = "FACTORY_ADDRESS", value_parser = parse_address)]
    pub factory: Address,

    #[arg(long, env = "RELAY_URL", default_value = "http://localhost:3000")]
    pub relay_url: String,

    #[arg(long, env = "WALLET_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    #[arg(
        long,
        env = "IDENTITY_HUB_ADDRESS",
        value_parser = parse_address,
        default_value = "0x0000000000000000000000000000000000000000"
    )]
    pub hub: Address,

    #[arg(long, env = "ATTESTATION_ID", default_value = "1")]
    pub attestation_id: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Clone)]
pub enum Commands {
    /// List polls that are still accepting votes
    List,
    /// Show one poll with its tallies
    Show {
        #[arg(long, value_parser = parse_address)]
        vote: Address,
    },
    /// Create a new poll through the factory
    Create {
        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long, value_delimiter = ',', help = "Comma-separated option labels")]
        options: Vec<String>,

        #[arg(long, help = "Voting window in minutes from now")]
        duration_minutes: Option<u64>,

        #[arg(long, help = "Unix end time in seconds; overrides --duration-minutes")]
        end_time: Option<u64>,

        #[arg(long, default_value = "", help = "Eligibility scope binding proofs to this poll")]
        scope: String,

        #[arg(long)]
        require_name: bool,

        #[arg(long)]
        require_nationality: bool,

        #[arg(long)]
        min_age: Option<u8>,

        #[arg(long, value_delimiter = ',', help = "Comma-separated 3-letter country codes to exclude")]
        forbid_countries: Option<Vec<String>>,

        #[arg(long)]
        ofac: bool,
    },
    /// Cast a vote, attaching the eligibility proof stored on the relay
    Vote {
        #[arg(long, value_parser = parse_address)]
        vote: Address,

        #[arg(long, conflicts_with = "option", help = "Option label as displayed")]
        label: Option<String>,

        #[arg(long, help = "Option index as displayed")]
        option: Option<usize>,
    },
    /// Polls created by the connected wallet
    MyPolls,
    /// Polls the connected wallet has voted on
    MyVotes,
    /// Wallet session status
    Status,
    /// Ask the wallet to switch chains
    SwitchChain {
        #[arg(long)]
        chain_id: u64,
    },
}

fn parse_address(s: &str) -> Result<Address, String> {
    s.trim()
        .parse::<Address>()
        .map_err(|e| format!("invalid address: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .is_test(false)
        .try_init();

    let cli = Cli::parse();

    let chain = EthersChain::connect(&cli.rpc_url, cli.factory, cli.private_key.as_deref()).await?;
    let chain_id = chain.chain_id().await?;

    // One session for the lifetime of the process; views read it, the
    // listener keeps it in step with the wallet side.
    let provider: Option<Arc<dyn WalletProvider>> = match cli.private_key.as_deref() {
        Some(key) => Some(Arc::new(LocalKeyProvider::from_key(key, chain_id)?)),
        None => None,
    };
    let session = Arc::new(WalletSession::new(provider));
    session.resume().await;
    let _listener = session.clone().spawn_listener();

    let gateway = ContractGateway::new(
        Arc::new(chain),
        HubParams {
            hub: cli.hub,
            attestation_id: U256::from(cli.attestation_id),
        },
    );
    let relay = RelayClient::new(cli.relay_url.clone());

    match cli.command.clone() {
        Commands::List => {
            let polls = gateway.list_active_polls().await?;
            views::render_summaries(&polls);
        }
        Commands::Show { vote } => match gateway.get_poll(vote).await? {
            Some(poll) => views::render_poll(&poll),
            None => println!("No poll found at {vote:#x}."),
        },
        Commands::Create {
            title,
            description,
            options,
            duration_minutes,
            end_time,
            scope,
            require_name,
            require_nationality,
            min_age,
            forbid_countries,
            ofac,
        } => {
            let end_time =
                end_time.unwrap_or_else(|| unix_now() + duration_minutes.unwrap_or(60) * 60);
            let requirements = EligibilityRequirements {
                require_name,
                require_nationality,
                minimum_age: min_age,
                forbidden_countries: forbid_countries.unwrap_or_default(),
                ofac,
            };
            let params = CreatePollParams {
                title,
                description,
                options,
                end_time,
                scope,
                requirements: Some(requirements),
            };
            create(&gateway, &session, params).await?;
        }
        Commands::Vote {
            vote,
            label,
            option,
        } => {
            cast(&gateway, &relay, &session, vote, label, option).await?;
        }
        Commands::MyPolls => match session.ensure_connected().await {
            Ok(address) => {
                let polls = gateway.polls_created_by(address).await?;
                if polls.is_empty() {
                    println!("You have not created any polls.");
                }
                for poll in &polls {
                    views::render_poll(poll);
                    println!();
                }
            }
            Err(err) => println!("{}", views::notice(&err)),
        },
        Commands::MyVotes => match session.ensure_connected().await {
            Ok(address) => {
                let polls = gateway.polls_voted_by(address).await?;
                if polls.is_empty() {
                    println!("You have not voted on any polls.");
                }
                for poll in &polls {
                    views::render_poll(poll);
                    println!();
                }
            }
            Err(err) => println!("{}", views::notice(&err)),
        },
        Commands::Status => {
            let state = session.state();
            match state.display_address() {
                Some(address) => {
                    let chain = state
                        .chain_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "unknown".into());
                    println!("Connected as {address} (chain {chain})");
                }
                None => println!("Not connected."),
            }
        }
        Commands::SwitchChain { chain_id } => match session.switch_chain(chain_id).await {
            Ok(()) => println!("Switched to chain {chain_id}."),
            Err(err) => println!("{}", views::notice(&err)),
        },
    }

    Ok(())
}

async fn create(
    gateway: &ContractGateway,
    session: &WalletSession,
    params: CreatePollParams,
) -> Result<()> {
    if let Err(err) = session.ensure_connected().await {
        println!("{}", views::notice(&err));
        return Ok(());
    }

    let mut submit = ActionState::new();
    if !submit.begin() {
        return Ok(());
    }
    info!("submitting poll creation \"{}\"", params.title);
    println!("Submitting poll creation...");

    match gateway.create_poll(&params).await {
        Ok(address) => {
            submit.succeed(address);
            println!("Poll deployed at {address:#x}");
        }
        Err(err) => {
            println!("{}", views::notice(&err));
            submit.fail(err.to_string());
        }
    }
    Ok(())
}

async fn cast(
    gateway: &ContractGateway,
    relay: &RelayClient,
    session: &WalletSession,
    vote: Address,
    label_arg: Option<String>,
    option_arg: Option<usize>,
) -> Result<()> {
    let voter = match session.ensure_connected().await {
        Ok(address) => address,
        Err(err) => {
            println!("{}", views::notice(&err));
            return Ok(());
        }
    };

    let Some(poll) = gateway.get_poll(vote).await? else {
        println!("No poll found at {vote:#x}.");
        return Ok(());
    };
    views::render_poll(&poll);
    if poll.status() == PollStatus::Closed {
        println!("This poll has ended.");
        return Ok(());
    }

    // Resolve the label against the options just rendered, so what the
    // voter picked is exactly what travels in the transaction.
    let label = match (label_arg, option_arg) {
        (Some(label), _) => label,
        (None, Some(index)) => match poll.options.get(index) {
            Some(label) => label.clone(),
            None => {
                println!(
                    "{}",
                    views::notice(&GatewayError::OptionNotFound { vote, index })
                );
                return Ok(());
            }
        },
        (None, None) => {
            println!("Pick an option with --label or --option.");
            return Ok(());
        }
    };

    let submission = match relay.fetch_proof(voter).await {
        Ok(submission) => submission,
        Err(err @ (GatewayError::RelayMiss(_) | GatewayError::Transport(_))) => {
            println!("{}", views::notice(&err));
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    let payload = match ProofPayload::try_from(&submission) {
        Ok(payload) => payload,
        Err(err) => {
            println!("{}", views::notice(&err));
            return Ok(());
        }
    };

    let mut submit = ActionState::new();
    if !submit.begin() {
        return Ok(());
    }
    info!("casting vote for \"{label}\" on {vote:#x}");
    println!("Submitting vote for \"{label}\"...");

    match gateway.cast_vote_label(vote, &label, &payload).await {
        Ok(tx) => {
            submit.succeed(tx);
            println!("Vote cast: {tx:#x}");
            // the chain moved; show fresh numbers
            if let Some(updated) = gateway.get_poll(vote).await? {
                views::render_poll(&updated);
            }
        }
        Err(err) => {
            submit.fail(err.to_string());
            println!("{}", views::notice(&err));
        }
    }
    Ok(())
}
