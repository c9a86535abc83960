//! Wallet session: connected account and chain tracking.
//!
//! The session is an explicit object constructed once at application start
//! and handed to consumers by reference; there is no ambient global. State
//! changes flow out through a watch channel, provider notifications flow in
//! through a broadcast subscription, so teardown on either side is just
//! dropping the receiver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use log::warn;
use tokio::sync::{broadcast, watch};

use crate::error::GatewayError;

/// Out-of-band notifications from the wallet side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// The authorized account set changed; an empty list means the wallet
    /// revoked access entirely.
    AccountsChanged(Vec<Address>),
    /// The wallet moved to another chain.
    ChainChanged(u64),
}

/// The injected-wallet surface this layer consumes.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask for account access; may prompt the user and may be denied.
    async fn request_accounts(&self) -> Result<Vec<Address>, GatewayError>;

    /// Query already-authorized accounts without prompting.
    async fn accounts(&self) -> Result<Vec<Address>, GatewayError>;

    async fn chain_id(&self) -> Result<u64, GatewayError>;

    async fn switch_chain(&self, chain_id: u64) -> Result<(), GatewayError>;

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}

/// Snapshot of the session. `connected()` is true exactly when an address
/// is present; there is no separate flag to drift out of sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub address: Option<Address>,
    pub chain_id: Option<u64>,
    /// Bumped on every chain change. Contract bindings are chain-specific;
    /// consumers holding any must rebuild them when this moves.
    pub generation: u64,
}

impl SessionState {
    pub fn connected(&self) -> bool {
        self.address.is_some()
    }

    /// Lowercase hex rendering of the connected address.
    pub fn display_address(&self) -> Option<String> {
        self.address.map(|a| format!("{a:#x}"))
    }
}

pub struct WalletSession {
    provider: Option<Arc<dyn WalletProvider>>,
    state: watch::Sender<SessionState>,
}

impl WalletSession {
    pub fn new(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        WalletSession { provider, state }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Observe session changes; dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// One-time silent resolution of a pre-existing authorization at
    /// startup. Never prompts; failures are logged, not surfaced.
    pub async fn resume(&self) {
        let Some(provider) = self.provider.as_ref() else {
            return;
        };
        match provider.accounts().await {
            Ok(accounts) => {
                if let Some(address) = accounts.first().copied() {
                    let chain_id = provider.chain_id().await.ok();
                    self.state.send_modify(|s| {
                        s.address = Some(address);
                        if chain_id.is_some() {
                            s.chain_id = chain_id;
                        }
                    });
                }
            }
            Err(err) => warn!("could not query pre-authorized accounts: {err}"),
        }
    }

    /// Request account access and adopt the first account returned.
    pub async fn connect(&self) -> Result<Address, GatewayError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(GatewayError::WalletUnavailable)?;
        let accounts = provider.request_accounts().await?;
        let address = accounts
            .first()
            .copied()
            .ok_or(GatewayError::AuthorizationDenied)?;
        let chain_id = provider.chain_id().await.ok();
        self.state.send_modify(|s| {
            s.address = Some(address);
            if chain_id.is_some() {
                s.chain_id = chain_id;
            }
        });
        Ok(address)
    }

    /// Clears local state only; wallet-side authorization cannot be revoked
    /// from here.
    pub fn disconnect(&self) {
        self.state.send_modify(|s| s.address = None);
    }

    /// The address if already connected, otherwise a fresh `connect`.
    pub async fn ensure_connected(&self) -> Result<Address, GatewayError> {
        if let Some(address) = self.state.borrow().address {
            return Ok(address);
        }
        self.connect().await
    }

    pub async fn switch_chain(&self, chain_id: u64) -> Result<(), GatewayError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(GatewayError::WalletUnavailable)?;
        provider.switch_chain(chain_id).await
    }

    /// Apply one provider notification to the session.
    pub fn apply(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => {
                self.state.send_modify(|s| s.address = accounts.first().copied());
            }
            ProviderEvent::ChainChanged(chain_id) => {
                self.state.send_modify(|s| {
                    s.chain_id = Some(chain_id);
                    s.generation += 1;
                });
            }
        }
    }

    /// Forward provider notifications into the session for the lifetime of
    /// the application. Returns `None` when no provider is configured.
    pub fn spawn_listener(self: Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        let provider = self.provider.as_ref()?;
        let mut events = provider.subscribe();
        Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.apply(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("wallet event stream lagged, dropped {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }
}

/// Headless provider over a locally held key. Always authorized, never
/// prompts, so it also never denies; denial is a property of interactive
/// providers behind the same trait.
pub struct LocalKeyProvider {
    address: Address,
    chain_id: AtomicU64,
    events: broadcast::Sender<ProviderEvent>,
}

impl LocalKeyProvider {
    pub fn new(address: Address, chain_id: u64) -> Self {
        let (events, _) = broadcast::channel(16);
        LocalKeyProvider {
            address,
            chain_id: AtomicU64::new(chain_id),
            events,
        }
    }

    pub fn from_key(key: &str, chain_id: u64) -> Result<Self, GatewayError> {
        let wallet = key
            .parse::<LocalWallet>()
            .map_err(|e| GatewayError::Transport(format!("invalid wallet key: {e}")))?;
        Ok(Self::new(wallet.address(), chain_id))
    }
}

#[async_trait]
impl WalletProvider for LocalKeyProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, GatewayError> {
        Ok(vec![self.address])
    }

    async fn accounts(&self) -> Result<Vec<Address>, GatewayError> {
        Ok(vec![self.address])
    }

    async fn chain_id(&self) -> Result<u64, GatewayError> {
        Ok(self.chain_id.load(Ordering::Relaxed))
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), GatewayError> {
        self.chain_id.store(chain_id, Ordering::Relaxed);
        let _ = self.events.send(ProviderEvent::ChainChanged(chain_id));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct StaticProvider {
        accounts: Vec<Address>,
        deny: bool,
        events: broadcast::Sender<ProviderEvent>,
    }

    impl StaticProvider {
        fn with_account(address: Address) -> Self {
            let (events, _) = broadcast::channel(16);
            StaticProvider {
                accounts: vec![address],
                deny: false,
                events,
            }
        }

        fn denying() -> Self {
            let (events, _) = broadcast::channel(16);
            StaticProvider {
                accounts: vec![],
                deny: true,
                events,
            }
        }
    }

    #[async_trait]
    impl WalletProvider for StaticProvider {
        async fn request_accounts(&self) -> Result<Vec<Address>, GatewayError> {
            if self.deny {
                return Err(GatewayError::AuthorizationDenied);
            }
            Ok(self.accounts.clone())
        }

        async fn accounts(&self) -> Result<Vec<Address>, GatewayError> {
            Ok(self.accounts.clone())
        }

        async fn chain_id(&self) -> Result<u64, GatewayError> {
            Ok(31337)
        }

        async fn switch_chain(&self, chain_id: u64) -> Result<(), GatewayError> {
            let _ = self.events.send(ProviderEvent::ChainChanged(chain_id));
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
            self.events.subscribe()
        }
    }

    fn some_address() -> Address {
        "0xABcD000000000000000000000000000000001234".parse().unwrap()
    }

    #[tokio::test]
    async fn connect_round_trip() {
        let session = WalletSession::new(Some(Arc::new(StaticProvider::with_account(
            some_address(),
        ))));
        let connected = session.connect().await.unwrap();
        assert_eq!(connected, some_address());

        let state = session.state();
        assert!(state.connected());
        assert_eq!(state.chain_id, Some(31337));
        assert_eq!(
            state.display_address().unwrap(),
            "0xabcd000000000000000000000000000000001234"
        );

        session.apply(ProviderEvent::AccountsChanged(vec![]));
        let state = session.state();
        assert!(!state.connected());
        assert_eq!(state.address, None);
    }

    #[tokio::test]
    async fn missing_provider_is_unavailable() {
        let session = WalletSession::new(None);
        assert_eq!(
            session.connect().await.unwrap_err(),
            GatewayError::WalletUnavailable
        );
    }

    #[tokio::test]
    async fn denial_leaves_the_session_untouched() {
        let session = WalletSession::new(Some(Arc::new(StaticProvider::denying())));
        assert_eq!(
            session.connect().await.unwrap_err(),
            GatewayError::AuthorizationDenied
        );
        assert!(!session.state().connected());
    }

    #[tokio::test]
    async fn resume_adopts_preexisting_authorization_silently() {
        let session = WalletSession::new(Some(Arc::new(StaticProvider::with_account(
            some_address(),
        ))));
        session.resume().await;
        assert!(session.state().connected());
    }

    #[tokio::test]
    async fn chain_change_bumps_generation_and_keeps_the_account() {
        let session = WalletSession::new(Some(Arc::new(StaticProvider::with_account(
            some_address(),
        ))));
        session.connect().await.unwrap();

        session.apply(ProviderEvent::ChainChanged(1));
        let state = session.state();
        assert_eq!(state.chain_id, Some(1));
        assert_eq!(state.generation, 1);
        assert_eq!(state.address, Some(some_address()));
    }

    #[tokio::test]
    async fn listener_forwards_provider_events() {
        let provider = Arc::new(StaticProvider::with_account(some_address()));
        let events = provider.events.clone();
        let session = Arc::new(WalletSession::new(Some(provider)));
        session.connect().await.unwrap();

        let handle = session.clone().spawn_listener().unwrap();
        events
            .send(ProviderEvent::AccountsChanged(vec![]))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!session.state().connected());
        handle.abort();
    }

    #[tokio::test]
    async fn local_key_provider_reports_its_account() {
        let provider = LocalKeyProvider::new(some_address(), 8453);
        assert_eq!(provider.accounts().await.unwrap(), vec![some_address()]);
        assert_eq!(provider.chain_id().await.unwrap(), 8453);

        let mut rx = provider.subscribe();
        provider.switch_chain(10).await.unwrap();
        assert_eq!(provider.chain_id().await.unwrap(), 10);
        assert_eq!(rx.try_recv().unwrap(), ProviderEvent::ChainChanged(10));
    }
}
