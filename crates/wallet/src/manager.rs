//! The wallet session controller.
//!
//! [`WalletManager`] owns the single active session and publishes every change through a
//! [`watch`] channel. All mutations go through one update funnel so observers always see a
//! consistent [`WalletState`].

use alloy_primitives::{Address, ChainId};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::{
    Arc, Weak,
    atomic::{AtomicU64, Ordering},
};
use tokio::{
    sync::{broadcast::error::RecvError, watch},
    task::JoinHandle,
};

use crate::{
    approval::{self, ApprovalRequest, ApprovalSignature, PermissionGrant},
    balance::BalanceOracle,
    brand::WalletBrand,
    config::WalletConfig,
    error::{
        AuthorizeError, BalanceError, ConfigError, ConnectError, LoginError, SignerError,
        SwitchError,
    },
    network::{chain_id_hex, parse_chain_id},
    provider::{self, Eip1193Provider, ProviderEvent, SharedProvider, same_provider},
    registry::{ProviderRegistry, WalletDescriptor},
    session::{ActiveSession, ConnectionStatus, WalletState},
    siwe::{SiweApi, SiweAuthenticator},
    store::{self, MemoryStore, SessionStore},
};

/// Result of a successful Sign-In with Ethereum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SiweLogin {
    /// The address that signed the message.
    pub address: Address,
}

/// Result of [`WalletManager::connect_and_authorize`].
#[derive(Clone, Debug)]
pub struct Authorization {
    pub session: ActiveSession,
    /// `None` if the wallet refused both permission requests.
    pub permissions: Option<PermissionGrant>,
    pub login: SiweLogin,
    pub approval: ApprovalSignature,
}

/// Builder for [`WalletManager`].
#[derive(Debug)]
pub struct WalletManagerBuilder {
    registry: ProviderRegistry,
    store: Option<Arc<dyn SessionStore>>,
    config: WalletConfig,
}

impl WalletManagerBuilder {
    /// Session storage for the explicit logout flag, in-memory by default.
    pub fn store(mut self, store: impl SessionStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn config(mut self, config: WalletConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<WalletManager, ConfigError> {
        let Self { registry, store, config } = self;
        let api = SiweApi::new(config.api_url.clone(), config.timings.http_timeout())?;
        let (state, _) = watch::channel(WalletState::default());
        let inner = Inner {
            registry: registry.with_settle_delay(config.timings.announce_settle()),
            store: store.unwrap_or_else(|| Arc::new(MemoryStore::default())),
            balances: BalanceOracle::new(config.rpc.clone())
                .with_timeout(config.timings.http_timeout()),
            siwe: SiweAuthenticator::new(api, config.siwe.clone()),
            config,
            state,
            listener: Mutex::new(None),
            generation: AtomicU64::new(0),
        };
        Ok(WalletManager { inner: Arc::new(inner) })
    }
}

/// Owns the active wallet session.
///
/// Cheap to clone, clones share the same session.
#[derive(Clone, Debug)]
pub struct WalletManager {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    registry: ProviderRegistry,
    store: Arc<dyn SessionStore>,
    config: WalletConfig,
    balances: BalanceOracle,
    siwe: SiweAuthenticator,
    state: watch::Sender<WalletState>,
    /// Task forwarding events of the session's provider.
    listener: Mutex<Option<JoinHandle<()>>>,
    /// Bumped whenever the listener is replaced, events of older listeners are dropped.
    generation: AtomicU64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}

impl WalletManager {
    pub fn builder(registry: ProviderRegistry) -> WalletManagerBuilder {
        WalletManagerBuilder { registry, store: None, config: WalletConfig::default() }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &WalletConfig {
        &self.inner.config
    }

    /// The current state.
    pub fn snapshot(&self) -> WalletState {
        self.inner.state.borrow().clone()
    }

    /// Observes state changes.
    pub fn subscribe(&self) -> watch::Receiver<WalletState> {
        self.inner.state.subscribe()
    }

    fn update(&self, f: impl FnOnce(&mut WalletState)) {
        self.inner.state.send_modify(f);
    }

    fn session(&self) -> Option<ActiveSession> {
        self.inner.state.borrow().session.clone()
    }

    /// Lists the available wallets, one per brand.
    pub fn detect_wallets(&self) -> Vec<WalletDescriptor> {
        self.inner.registry.scan()
    }

    /// Brand of `provider`, or of the default provider.
    pub fn identify_wallet_type(&self, provider: Option<&SharedProvider>) -> Option<WalletBrand> {
        self.inner.registry.identify(provider)
    }

    /// Connects a wallet, prompting the user for account access.
    ///
    /// With `brand` the provider of that vendor is used, otherwise the default injected one.
    pub async fn connect(&self, brand: Option<WalletBrand>) -> Result<ActiveSession, ConnectError> {
        self.update(|state| {
            state.is_connecting = true;
            state.connect_error = None;
            if state.session.is_none() {
                state.status = ConnectionStatus::Connecting;
            }
        });

        let result = self.try_connect(brand).await;
        match &result {
            Ok(session) => {
                info!(address = %session.address, brand = %session.brand, chain_id = ?session.chain_id, "wallet connected");
            }
            Err(err) => {
                warn!(%err, ?brand, "wallet connection failed");
                self.update(|state| {
                    state.is_connecting = false;
                    state.connect_error = Some(err.to_string());
                    state.status = if state.session.is_some() {
                        ConnectionStatus::Connected
                    } else {
                        ConnectionStatus::Disconnected
                    };
                });
            }
        }
        result
    }

    async fn try_connect(&self, brand: Option<WalletBrand>) -> Result<ActiveSession, ConnectError> {
        let provider = self.resolve_provider(brand).await?;
        let accounts =
            provider::request_accounts(provider.as_ref()).await.map_err(ConnectError::from_provider)?;
        let address = accounts.first().copied().ok_or(ConnectError::NoAccounts)?;
        Ok(self.establish(provider, address, brand).await)
    }

    async fn resolve_provider(&self, brand: Option<WalletBrand>) -> Result<SharedProvider, ConnectError> {
        let registry = &self.inner.registry;
        let brand = match brand.filter(WalletBrand::is_known) {
            Some(brand) => brand,
            None => return registry.default_provider().ok_or(ConnectError::NoProvider { brand: None }),
        };
        if let Some(provider) = registry.resolve(brand) {
            return Ok(provider);
        }
        // OKX injects itself after the page has loaded.
        if brand == WalletBrand::Okx {
            tokio::time::sleep(self.inner.config.timings.okx_retry()).await;
            if let Some(provider) = registry.resolve(brand) {
                return Ok(provider);
            }
        }
        Err(ConnectError::NoProvider { brand: Some(brand) })
    }

    /// Stores the new session, starts listening to the provider and refreshes the balance.
    async fn establish(
        &self,
        provider: SharedProvider,
        address: Address,
        requested: Option<WalletBrand>,
    ) -> ActiveSession {
        let chain_id = match provider::chain_id(provider.as_ref()).await {
            Ok(chain_id) => chain_id,
            Err(err) => {
                warn!(%err, "could not read the wallet's chain id");
                None
            }
        };
        let brand = match requested.filter(WalletBrand::is_known) {
            Some(brand) => brand,
            None => self.inner.registry.classify(&provider),
        };
        let session = ActiveSession { address, chain_id, brand, provider: provider.clone() };

        self.update(|state| {
            let same_account = state.account() == Some(address);
            state.session = Some(session.clone());
            state.status = ConnectionStatus::Connected;
            state.is_connecting = false;
            state.connect_error = None;
            if !same_account {
                state.balance_eth = None;
                state.authenticated = None;
            }
        });
        store::set_explicit_logout(self.inner.store.as_ref(), false);
        self.listen(&provider);
        self.spawn_balance_refresh();
        session
    }

    /// Reconnects silently if the wallet still exposes an account and the user did not log
    /// out explicitly. Never prompts.
    pub async fn restore(&self) -> Result<Option<ActiveSession>, ConnectError> {
        if store::explicit_logout(self.inner.store.as_ref()) {
            debug!("explicit logout recorded, not restoring the session");
            return Ok(None);
        }
        let Some(provider) = self.inner.registry.default_provider() else {
            return Ok(None);
        };
        let accounts = match provider::accounts(provider.as_ref()).await {
            Ok(accounts) => accounts,
            Err(err) => {
                debug!(%err, "eth_accounts failed, not restoring the session");
                return Ok(None);
            }
        };
        let Some(address) = accounts.first().copied() else {
            return Ok(None);
        };
        let session = self.establish(provider, address, None).await;
        info!(address = %session.address, brand = %session.brand, "wallet session restored");
        Ok(Some(session))
    }

    /// Disconnects the wallet and suppresses [`restore`](Self::restore) until the next
    /// [`connect`](Self::connect).
    ///
    /// Revocation is best-effort, wallets without a permissions API keep the site authorized.
    pub async fn disconnect(&self) {
        self.stop_listening();

        if let Some(session) = self.session() {
            revoke_permissions(session.provider.as_ref()).await;
            if session.provider.supports_disconnect()
                && let Err(err) = session.provider.disconnect().await
            {
                debug!(%err, "provider disconnect failed");
            }
            for other in self.inner.registry.host().injected().ethereum_providers {
                if !same_provider(&other, &session.provider) {
                    revoke_permissions(other.as_ref()).await;
                }
            }
        }

        self.update(|state| {
            state.clear_session();
            state.connect_error = None;
            state.is_connecting = false;
        });
        store::set_explicit_logout(self.inner.store.as_ref(), true);
        info!("wallet disconnected");
    }

    /// Switches the wallet to `chain_id`, adding the chain first if the wallet does not know
    /// it and it is configured.
    pub async fn switch_network(&self, chain_id: ChainId) -> Result<(), SwitchError> {
        let session = self.session().ok_or(SwitchError::NotConnected)?;
        if session.chain_id == Some(chain_id) {
            return Ok(());
        }

        self.update(|state| state.is_switching = true);
        let result = self.try_switch(session.provider.as_ref(), chain_id).await;
        self.update(|state| {
            state.is_switching = false;
            if result.is_ok()
                && let Some(current) = state.session.as_mut()
                && same_provider(&current.provider, &session.provider)
            {
                current.chain_id = Some(chain_id);
            }
        });

        match &result {
            Ok(()) => {
                info!(chain_id, "switched network");
                self.spawn_balance_refresh();
            }
            Err(err) => warn!(chain_id, %err, "network switch failed"),
        }
        result
    }

    async fn try_switch(&self, wallet: &dyn Eip1193Provider, chain_id: ChainId) -> Result<(), SwitchError> {
        let params = json!([{ "chainId": chain_id_hex(chain_id) }]);
        let err = match wallet.request("wallet_switchEthereumChain", params.clone()).await {
            Ok(_) => return Ok(()),
            Err(err) => err,
        };
        if !err.is_unrecognized_chain() {
            return Err(err.into());
        }

        let chain = self.inner.config.chains.get(chain_id).ok_or_else(|| SwitchError::Unsupported {
            reason: format!("chain {} is unknown to the wallet and not configured", chain_id_hex(chain_id)),
        })?;
        debug!(chain_id, name = %chain.chain_name, "adding chain to the wallet");
        wallet.request("wallet_addEthereumChain", json!([chain])).await?;
        wallet.request("wallet_switchEthereumChain", params).await?;
        Ok(())
    }

    /// Refreshes the native balance of the session account.
    ///
    /// Returns `Ok(None)` without a session. The state is only written if the session did not
    /// change while the query was in flight.
    pub async fn refresh_balance(&self) -> Result<Option<String>, BalanceError> {
        let Some(session) = self.session() else {
            return Ok(None);
        };

        self.update(|state| state.balance_loading = true);
        let result = self
            .inner
            .balances
            .get_balance(session.provider.as_ref(), session.address, session.chain_id)
            .await;
        self.update(|state| {
            state.balance_loading = false;
            let unchanged = state.session.as_ref().is_some_and(|current| {
                current.address == session.address && same_provider(&current.provider, &session.provider)
            });
            if unchanged {
                state.balance_eth = result.as_ref().ok().cloned();
            }
        });

        if let Err(err) = &result {
            warn!(address = %session.address, %err, "balance unavailable");
        }
        result.map(Some)
    }

    fn spawn_balance_refresh(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            let _ = this.refresh_balance().await;
        });
    }

    /// Applies a provider event to the session.
    pub async fn handle_provider_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first().copied() {
                Some(address) => {
                    let mut changed = false;
                    self.update(|state| {
                        if let Some(session) = state.session.as_mut()
                            && session.address != address
                        {
                            session.address = address;
                            state.balance_eth = None;
                            state.authenticated = None;
                            changed = true;
                        }
                    });
                    if changed {
                        info!(%address, "wallet account changed");
                        self.spawn_balance_refresh();
                    }
                }
                None => {
                    info!("wallet revoked account access");
                    self.stop_listening();
                    self.update(WalletState::clear_session);
                }
            },
            ProviderEvent::ChainChanged(chain_id) => {
                let parsed = parse_chain_id(&chain_id).ok();
                self.update(|state| {
                    if let Some(session) = state.session.as_mut() {
                        session.chain_id = parsed;
                    }
                });
                info!(%chain_id, "wallet chain changed, reloading");
                self.inner.registry.host().reload();
            }
            ProviderEvent::Connect { chain_id } => {
                debug!(%chain_id, "provider connected");
            }
            ProviderEvent::Disconnect(err) => {
                warn!(%err, "provider lost its connection");
            }
        }
    }

    /// Forwards the events of `provider` to [`handle_provider_event`](Self::handle_provider_event),
    /// replacing any previous listener.
    fn listen(&self, provider: &SharedProvider) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = match provider.subscribe() {
            Some(mut events) => {
                let weak = Arc::downgrade(&self.inner);
                let task = tokio::spawn(async move {
                    loop {
                        let event = match events.recv().await {
                            Ok(event) => event,
                            Err(RecvError::Lagged(skipped)) => {
                                warn!(skipped, "missed provider events");
                                continue;
                            }
                            Err(RecvError::Closed) => break,
                        };
                        let Some(manager) = upgrade(&weak) else { break };
                        if manager.inner.generation.load(Ordering::SeqCst) != generation {
                            break;
                        }
                        trace!(?event, "provider event");
                        manager.handle_provider_event(event).await;
                        if manager.inner.generation.load(Ordering::SeqCst) != generation {
                            break;
                        }
                    }
                });
                self.inner.listener.lock().replace(task)
            }
            None => {
                debug!("provider does not emit events");
                self.inner.listener.lock().take()
            }
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn stop_listening(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let Some(listener) = self.inner.listener.lock().take() else { return };
        // The listener stops itself after the event it is handling, aborting it would cancel
        // the caller.
        if tokio::task::try_id() != Some(listener.id()) {
            listener.abort();
        }
    }

    /// Signs in to the backend with the connected wallet.
    ///
    /// A failure leaves the wallet connected but not authenticated.
    pub async fn siwe_login(&self) -> Result<SiweLogin, LoginError> {
        let session = self.session().ok_or(LoginError::NotConnected)?;

        self.update(|state| state.is_signing = true);
        let location = self.inner.registry.host().location();
        let result = self
            .inner
            .siwe
            .login(session.provider.as_ref(), session.address, session.chain_id, location.as_ref())
            .await;
        self.update(|state| {
            state.is_signing = false;
            if let Ok(address) = &result
                && state.session.as_ref().is_some_and(|s| same_provider(&s.provider, &session.provider))
            {
                state.authenticated = Some(*address);
            }
        });

        match result {
            Ok(address) => {
                info!(%address, "signed in with ethereum");
                Ok(SiweLogin { address })
            }
            Err(err) => {
                warn!(%err, "sign-in with ethereum failed");
                Err(err)
            }
        }
    }

    /// Ends the backend session. The wallet stays connected.
    pub async fn siwe_logout(&self) -> Result<(), reqwest::Error> {
        self.update(|state| state.authenticated = None);
        self.inner.siwe.api().logout().await
    }

    /// Asks the connected wallet for the `eth_accounts` permission.
    pub async fn request_permissions(&self) -> Result<PermissionGrant, SignerError> {
        let session = self.session().ok_or(SignerError::NotConnected)?;
        approval::request_permissions(session.provider.as_ref()).await
    }

    /// Signs an `Approve` typed data message with the connected wallet.
    pub async fn sign_typed_approval(
        &self,
        request: ApprovalRequest,
    ) -> Result<ApprovalSignature, SignerError> {
        let session = self.session().ok_or(SignerError::NotConnected)?;

        self.update(|state| state.is_signing = true);
        let result = approval::sign_typed_approval(
            session.provider.as_ref(),
            session.address,
            session.chain_id.unwrap_or(1),
            &self.inner.config.approval,
            &request,
        )
        .await;
        self.update(|state| state.is_signing = false);

        if let Err(err) = &result {
            warn!(%err, "typed approval failed");
        }
        result
    }

    /// Connects, requests permissions, signs in and signs an approval, strictly in that order.
    ///
    /// A refused permission request does not stop the flow.
    pub async fn connect_and_authorize(
        &self,
        brand: Option<WalletBrand>,
        request: ApprovalRequest,
    ) -> Result<Authorization, AuthorizeError> {
        let session = self.connect(brand).await?;
        let permissions = match self.request_permissions().await {
            Ok(grant) => Some(grant),
            Err(err) => {
                debug!(%err, "permission request failed, continuing");
                None
            }
        };
        let login = self.siwe_login().await?;
        let approval = self.sign_typed_approval(request).await?;
        Ok(Authorization { session, permissions, login, approval })
    }
}

fn upgrade(weak: &Weak<Inner>) -> Option<WalletManager> {
    weak.upgrade().map(|inner| WalletManager { inner })
}

async fn revoke_permissions(wallet: &dyn Eip1193Provider) {
    if let Err(err) =
        wallet.request("wallet_revokePermissions", json!([{ "eth_accounts": {} }])).await
    {
        debug!(%err, "wallet_revokePermissions failed");
    }
}
