//! The environment wallets are injected into.

use parking_lot::RwLock;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use url::Url;

use crate::provider::SharedProvider;

/// Providers injected as page globals by legacy (pre EIP-6963) wallet extensions.
#[derive(Clone, Debug, Default)]
pub struct InjectedGlobals {
    /// `window.ethereum`
    pub ethereum: Option<SharedProvider>,
    /// `window.ethereum.providers`, set when several extensions share `window.ethereum`.
    pub ethereum_providers: Vec<SharedProvider>,
    /// `window.BinanceChain`
    pub binance_chain: Option<SharedProvider>,
    /// `window.coinbaseWalletExtension`
    pub coinbase_wallet_extension: Option<SharedProvider>,
    /// `window.okxwallet`, `window.okex`, `window.OKXWallet` and `window.okxWallet`, in that
    /// order.
    pub okx: Vec<SharedProvider>,
}

impl InjectedGlobals {
    /// Every standalone vendor global, in lookup order.
    pub fn standalone(&self) -> impl Iterator<Item = &SharedProvider> {
        self.binance_chain.iter().chain(self.coinbase_wallet_extension.iter()).chain(self.okx.iter())
    }
}

/// What the wallet layer needs from the page it runs in.
pub trait WalletHost: Send + Sync + fmt::Debug {
    /// Snapshot of the providers currently injected as globals.
    fn injected(&self) -> InjectedGlobals;

    /// Dispatches the EIP-6963 request event so late wallets announce themselves.
    ///
    /// Fire-and-forget: announcements arrive later through
    /// [`ProviderRegistry::announce`](crate::registry::ProviderRegistry::announce).
    fn request_announcements(&self) {}

    /// URL of the page, the SIWE domain and uri are derived from it.
    fn location(&self) -> Option<Url> {
        None
    }

    /// Reloads the page, invoked when the wallet switches chain underneath the session.
    fn reload(&self) {}
}

/// A [`WalletHost`] whose globals are set programmatically.
#[derive(Clone, Debug, Default)]
pub struct StaticHost {
    inner: Arc<StaticHostInner>,
}

#[derive(Debug, Default)]
struct StaticHostInner {
    globals: RwLock<InjectedGlobals>,
    location: RwLock<Option<Url>>,
    reloads: AtomicUsize,
    announcement_requests: AtomicUsize,
}

impl StaticHost {
    pub fn new(globals: InjectedGlobals) -> Self {
        let host = Self::default();
        host.set_globals(globals);
        host
    }

    pub fn with_location(self, location: Url) -> Self {
        *self.inner.location.write() = Some(location);
        self
    }

    pub fn set_globals(&self, globals: InjectedGlobals) {
        *self.inner.globals.write() = globals;
    }

    /// Changes the injected globals in place, e.g. to simulate a late injection.
    pub fn update_globals(&self, f: impl FnOnce(&mut InjectedGlobals)) {
        f(&mut self.inner.globals.write());
    }

    /// Number of times [`WalletHost::reload`] was called.
    pub fn reloads(&self) -> usize {
        self.inner.reloads.load(Ordering::SeqCst)
    }

    /// Number of times [`WalletHost::request_announcements`] was called.
    pub fn announcement_requests(&self) -> usize {
        self.inner.announcement_requests.load(Ordering::SeqCst)
    }
}

impl WalletHost for StaticHost {
    fn injected(&self) -> InjectedGlobals {
        self.inner.globals.read().clone()
    }

    fn request_announcements(&self) {
        self.inner.announcement_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn location(&self) -> Option<Url> {
        self.inner.location.read().clone()
    }

    fn reload(&self) {
        self.inner.reloads.fetch_add(1, Ordering::SeqCst);
    }
}
