//! Wallet brand classification.
//!
//! Extensions mark their providers with inconsistent, mostly undocumented properties, so no
//! single check is authoritative. Each classifier below is a pure function over the provider
//! handle and is tried in order until one recognises the brand.

use crate::{
    brand::WalletBrand,
    host::InjectedGlobals,
    provider::{SharedProvider, has_truthy_property, same_provider, string_property},
    registry::ProviderInfo,
};

/// Everything a classifier may look at.
#[derive(Clone, Copy, Debug)]
pub struct ClassifyInput<'a> {
    pub provider: &'a SharedProvider,
    /// EIP-6963 metadata announced for this provider, if any.
    pub info: Option<&'a ProviderInfo>,
    pub globals: &'a InjectedGlobals,
}

/// A single classification heuristic.
pub type Classifier = fn(&ClassifyInput<'_>) -> Option<WalletBrand>;

/// Classifiers in priority order.
pub const CLASSIFIERS: &[Classifier] =
    &[by_announced_info, by_marker_properties, by_constructor_name, by_name_fields, by_global_identity];

/// Runs the classifier chain, defaulting to [`WalletBrand::Unknown`].
pub fn classify(input: &ClassifyInput<'_>) -> WalletBrand {
    CLASSIFIERS.iter().find_map(|classify| classify(input)).unwrap_or_default()
}

/// EIP-6963 metadata, matched on `name` and `rdns`.
pub fn by_announced_info(input: &ClassifyInput<'_>) -> Option<WalletBrand> {
    let info = input.info?;
    let haystack = format!("{} {}", info.name, info.rdns).to_lowercase();
    match_hints(&haystack)
}

/// Vendor marker properties set on the provider object.
///
/// OKX and Binance also set `isMetaMask` for compatibility, so the MetaMask check only relies
/// on the private `_metamask` namespace and comes last.
pub fn by_marker_properties(input: &ClassifyInput<'_>) -> Option<WalletBrand> {
    let provider = input.provider.as_ref();
    let has = |name: &str| has_truthy_property(provider, name);

    if has("isOkxWallet") || has("isOKX") || has("isOKExWallet") {
        return Some(WalletBrand::Okx);
    }
    if has("bbcSignTx") || has("isBinance") || has("isBinanceChain") {
        return Some(WalletBrand::Binance);
    }
    if has("isCoinbaseWallet") || has("isCoinbaseBrowser") {
        return Some(WalletBrand::Coinbase);
    }
    if has("_metamask") {
        return Some(WalletBrand::MetaMask);
    }
    None
}

/// Name of the constructor the provider was built from.
pub fn by_constructor_name(input: &ClassifyInput<'_>) -> Option<WalletBrand> {
    let name = input.provider.constructor_name()?.to_lowercase();
    match_hints(&name)
}

/// Free-form `host` and `name` fields some providers carry.
pub fn by_name_fields(input: &ClassifyInput<'_>) -> Option<WalletBrand> {
    let provider = input.provider.as_ref();
    ["host", "name"]
        .into_iter()
        .filter_map(|field| string_property(provider, field))
        .find_map(|value| match_hints(&value.to_lowercase()))
}

/// Identity comparison against the standalone vendor globals.
pub fn by_global_identity(input: &ClassifyInput<'_>) -> Option<WalletBrand> {
    let globals = input.globals;
    let is = |candidate: &Option<SharedProvider>| {
        candidate.as_ref().is_some_and(|candidate| same_provider(candidate, input.provider))
    };
    if is(&globals.binance_chain) {
        return Some(WalletBrand::Binance);
    }
    if is(&globals.coinbase_wallet_extension) {
        return Some(WalletBrand::Coinbase);
    }
    if globals.okx.iter().any(|candidate| same_provider(candidate, input.provider)) {
        return Some(WalletBrand::Okx);
    }
    None
}

fn match_hints(haystack: &str) -> Option<WalletBrand> {
    // OKX and Binance first, their names may mention MetaMask compatibility.
    [WalletBrand::Okx, WalletBrand::Binance, WalletBrand::Coinbase, WalletBrand::MetaMask]
        .into_iter()
        .find(|brand| brand.name_hints().iter().any(|hint| haystack.contains(hint)))
}
