//! Wallet provider discovery.
//!
//! Providers are found through two mechanisms which are merged here:
//! - legacy globals injected into the page (`window.ethereum`, `window.BinanceChain`, ...)
//! - [EIP-6963](https://eips.ethereum.org/EIPS/eip-6963) announcements

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use crate::{
    brand::WalletBrand,
    host::WalletHost,
    provider::{SharedProvider, has_truthy_property, same_provider},
};

pub mod classify;
use classify::ClassifyInput;

/// Metadata carried by an `eip6963:announceProvider` event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    pub rdns: String,
}

/// An announced provider, the `detail` of `eip6963:announceProvider`.
#[derive(Clone, Debug)]
pub struct AnnouncedProvider {
    pub info: ProviderInfo,
    pub provider: SharedProvider,
}

/// A discovered provider, classified by brand.
#[derive(Clone, Debug)]
pub struct WalletDescriptor {
    pub brand: WalletBrand,
    pub provider: SharedProvider,
    /// Whether a real provider of this brand was detected.
    pub available: bool,
    /// EIP-6963 metadata, if the provider announced itself.
    pub info: Option<ProviderInfo>,
}

type AnnouncementCallback = Arc<dyn Fn(&AnnouncedProvider) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    callbacks: Vec<(u64, AnnouncementCallback)>,
}

/// Keeps an `on_provider_announced` callback registered until dropped.
#[must_use = "the callback is unregistered when the subscription is dropped"]
pub struct AnnouncementSubscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl fmt::Debug for AnnouncementSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnouncementSubscription").field("id", &self.id).finish()
    }
}

impl Drop for AnnouncementSubscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().callbacks.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Collects every wallet provider available to the page.
#[derive(Clone)]
pub struct ProviderRegistry {
    host: Arc<dyn WalletHost>,
    /// Append-only accumulator of EIP-6963 announcements.
    announced: Arc<RwLock<Vec<AnnouncedProvider>>>,
    listeners: Arc<Mutex<Listeners>>,
    settle_delay: Duration,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("host", &self.host)
            .field("announced", &self.announced.read().len())
            .field("settle_delay", &self.settle_delay)
            .finish()
    }
}

impl ProviderRegistry {
    /// Default time late wallets get to answer an announcement request.
    pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(200);

    pub fn new(host: Arc<dyn WalletHost>) -> Self {
        Self {
            host,
            announced: Default::default(),
            listeners: Default::default(),
            settle_delay: Self::DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn host(&self) -> &Arc<dyn WalletHost> {
        &self.host
    }

    /// Records an `eip6963:announceProvider` event.
    ///
    /// Re-announcements of the same provider (same uuid or same handle) are ignored.
    pub fn announce(&self, announcement: AnnouncedProvider) {
        {
            let mut announced = self.announced.write();
            let duplicate = announced.iter().any(|existing| {
                (!announcement.info.uuid.is_empty() && existing.info.uuid == announcement.info.uuid)
                    || same_provider(&existing.provider, &announcement.provider)
            });
            if duplicate {
                trace!(name = %announcement.info.name, "ignoring repeated announcement");
                return;
            }
            debug!(name = %announcement.info.name, rdns = %announcement.info.rdns, "wallet announced");
            announced.push(announcement.clone());
        }

        let callbacks: Vec<_> =
            self.listeners.lock().callbacks.iter().map(|(_, cb)| cb.clone()).collect();
        for callback in callbacks {
            callback(&announcement);
        }
    }

    /// Registers a callback invoked for every new announcement.
    pub fn on_provider_announced(
        &self,
        callback: impl Fn(&AnnouncedProvider) + Send + Sync + 'static,
    ) -> AnnouncementSubscription {
        let mut listeners = self.listeners.lock();
        listeners.next_id += 1;
        let id = listeners.next_id;
        listeners.callbacks.push((id, Arc::new(callback)));
        AnnouncementSubscription { id, listeners: Arc::downgrade(&self.listeners) }
    }

    /// All announcements received so far.
    pub fn announced(&self) -> Vec<AnnouncedProvider> {
        self.announced.read().clone()
    }

    /// Lists the available providers, at most one per brand.
    ///
    /// Lookup order: `window.ethereum.providers`, else the bare `window.ethereum`, then the
    /// standalone vendor globals, then EIP-6963 announcements. The first provider of each brand
    /// wins. Also asks late wallets to announce themselves; call again (or use
    /// [`discover`](Self::discover)) to pick them up.
    pub fn scan(&self) -> Vec<WalletDescriptor> {
        self.host.request_announcements();

        let globals = self.host.injected();
        let announced = self.announced();

        let mut candidates: Vec<SharedProvider> = if globals.ethereum_providers.is_empty() {
            globals.ethereum.iter().cloned().collect()
        } else {
            globals.ethereum_providers.clone()
        };
        candidates.extend(globals.standalone().cloned());
        candidates.extend(announced.iter().map(|a| a.provider.clone()));

        let mut seen = HashSet::new();
        let mut descriptors = Vec::new();
        for provider in candidates {
            let info = info_for(&announced, &provider);
            let brand = classify::classify(&ClassifyInput {
                provider: &provider,
                info: info.as_ref(),
                globals: &globals,
            });
            if seen.insert(brand) {
                descriptors.push(WalletDescriptor { brand, provider, available: true, info });
            }
        }
        trace!(count = descriptors.len(), "scanned wallet providers");
        descriptors
    }

    /// Requests announcements, waits for late wallets, then [`scan`](Self::scan)s.
    pub async fn discover(&self) -> Vec<WalletDescriptor> {
        self.host.request_announcements();
        tokio::time::sleep(self.settle_delay).await;
        self.scan()
    }

    /// Best-effort brand of the given provider.
    pub fn classify(&self, provider: &SharedProvider) -> WalletBrand {
        let globals = self.host.injected();
        let announced = self.announced.read();
        let info = info_for(&announced, provider);
        classify::classify(&ClassifyInput { provider, info: info.as_ref(), globals: &globals })
    }

    /// Brand of the given provider, or of the default one. `None` when it cannot be told.
    pub fn identify(&self, provider: Option<&SharedProvider>) -> Option<WalletBrand> {
        let provider = match provider {
            Some(provider) => provider.clone(),
            None => self.default_provider()?,
        };
        Some(self.classify(&provider)).filter(WalletBrand::is_known)
    }

    /// The provider used when no brand is requested: `window.ethereum`, or the first one found.
    pub fn default_provider(&self) -> Option<SharedProvider> {
        if let Some(ethereum) = self.host.injected().ethereum {
            return Some(ethereum);
        }
        self.scan().into_iter().next().map(|descriptor| descriptor.provider)
    }

    /// Finds the provider of a specific brand.
    ///
    /// Prefers EIP-6963 announcements, then the legacy scan, then the brand's own global.
    pub fn resolve(&self, brand: WalletBrand) -> Option<SharedProvider> {
        let globals = self.host.injected();
        let announced = self.announced();

        let by_announcement = announced.iter().find(|a| {
            classify::classify(&ClassifyInput {
                provider: &a.provider,
                info: Some(&a.info),
                globals: &globals,
            }) == brand
        });
        if let Some(announced) = by_announcement {
            debug!(%brand, name = %announced.info.name, "resolved provider from announcement");
            return Some(announced.provider.clone());
        }

        if let Some(descriptor) = self.scan().into_iter().find(|d| d.brand == brand) {
            debug!(%brand, "resolved provider from injected globals");
            return Some(descriptor.provider);
        }

        let standalone = match brand {
            WalletBrand::Binance => globals.binance_chain.clone(),
            WalletBrand::Coinbase => globals.coinbase_wallet_extension.clone(),
            WalletBrand::Okx => globals.okx.first().cloned(),
            WalletBrand::MetaMask => globals
                .ethereum
                .clone()
                .filter(|ethereum| has_truthy_property(ethereum.as_ref(), "isMetaMask")),
            WalletBrand::Unknown => None,
        };
        if standalone.is_some() {
            debug!(%brand, "resolved provider from standalone global");
        }
        standalone
    }
}

fn info_for(announced: &[AnnouncedProvider], provider: &SharedProvider) -> Option<ProviderInfo> {
    announced.iter().find(|a| same_provider(&a.provider, provider)).map(|a| a.info.clone())
}
