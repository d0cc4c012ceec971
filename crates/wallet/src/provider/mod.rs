//! [EIP-1193](https://eips.ethereum.org/EIPS/eip-1193) provider abstraction.
//!
//! Wallet extensions inject objects exposing `request({ method, params })` plus an event
//! emitter. [`Eip1193Provider`] models that surface so the rest of the crate never depends on
//! where the provider lives (a browser bridge, an HTTP node, a test double).

use alloy_primitives::{Address, Bytes, ChainId, hex};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::{fmt, sync::Arc};
use tokio::sync::broadcast;

use crate::{error::ProviderRpcError, network::parse_chain_id};

pub mod http;
pub use http::JsonRpcProvider;

/// Shared handle to an injected provider.
pub type SharedProvider = Arc<dyn Eip1193Provider>;

/// Events emitted by a provider, see
/// <https://eips.ethereum.org/EIPS/eip-1193#events-1>
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderEvent {
    /// The accounts exposed to the page changed. Empty means access was revoked.
    AccountsChanged(Vec<Address>),
    /// The connected chain changed, carries the new `0x` prefixed chain id.
    ChainChanged(String),
    Connect { chain_id: String },
    Disconnect(ProviderRpcError),
}

/// The request surface of an EIP-1193 provider.
///
/// Only [`request`](Self::request) is mandatory. The remaining methods describe optional
/// capabilities which injected providers may or may not have.
#[async_trait]
pub trait Eip1193Provider: Send + Sync + fmt::Debug {
    /// Submits an RPC request to the wallet.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError>;

    /// Registers a listener for provider events. Dropping the receiver removes the listener.
    ///
    /// Returns `None` if the provider does not emit events.
    fn subscribe(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        None
    }

    /// Reads a property of the provider object, used to sniff vendor markers such as
    /// `isMetaMask` or `_metamask`.
    fn property(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Name of the constructor the provider object was created from, if exposed.
    fn constructor_name(&self) -> Option<String> {
        None
    }

    /// Whether the provider has a native `disconnect()` method.
    fn supports_disconnect(&self) -> bool {
        false
    }

    /// Calls the provider's native `disconnect()` method.
    async fn disconnect(&self) -> Result<(), ProviderRpcError> {
        Err(ProviderRpcError::unsupported_method("disconnect"))
    }
}

/// Returns `true` if the property is present and truthy, JavaScript style.
pub(crate) fn has_truthy_property(provider: &dyn Eip1193Provider, name: &str) -> bool {
    provider.property(name).is_some_and(|value| is_truthy(&value))
}

/// Reads a string property of the provider.
pub(crate) fn string_property(provider: &dyn Eip1193Provider, name: &str) -> Option<String> {
    provider.property(name).and_then(|value| value.as_str().map(str::to_owned))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Compares two provider handles by identity.
pub fn same_provider(a: &SharedProvider, b: &SharedProvider) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Submits a request and deserializes the result.
pub(crate) async fn request_as<T: DeserializeOwned>(
    provider: &dyn Eip1193Provider,
    method: &str,
    params: Value,
) -> Result<T, ProviderRpcError> {
    let value = provider.request(method, params).await?;
    trace!(method, %value, "provider response");
    serde_json::from_value(value)
        .map_err(|err| ProviderRpcError::internal(format!("malformed {method} response: {err}")))
}

/// Prompts the user to expose their accounts, `eth_requestAccounts`.
pub async fn request_accounts(
    provider: &dyn Eip1193Provider,
) -> Result<Vec<Address>, ProviderRpcError> {
    request_as(provider, "eth_requestAccounts", json!([])).await
}

/// Returns the accounts already exposed to the page, without prompting.
pub async fn accounts(provider: &dyn Eip1193Provider) -> Result<Vec<Address>, ProviderRpcError> {
    request_as(provider, "eth_accounts", json!([])).await
}

/// Returns the provider's current chain id.
///
/// `Ok(None)` means the wallet answered with something that is not a chain id.
pub async fn chain_id(provider: &dyn Eip1193Provider) -> Result<Option<ChainId>, ProviderRpcError> {
    let value = provider.request("eth_chainId", json!([])).await?;
    let parsed = match &value {
        Value::String(s) => parse_chain_id(s).ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    };
    Ok(parsed)
}

/// Signs `message` with `personal_sign`.
///
/// Wallets disagree on the parameter layout, so three forms are tried in turn:
/// hex encoded message then address, raw message then address, address then raw message.
/// An explicit user rejection is not retried.
pub async fn personal_sign(
    provider: &dyn Eip1193Provider,
    address: Address,
    message: &str,
) -> Result<Bytes, ProviderRpcError> {
    let attempts = [
        json!([hex::encode_prefixed(message.as_bytes()), address]),
        json!([message, address]),
        json!([address, message]),
    ];

    let mut last_err = None;
    for (i, params) in attempts.into_iter().enumerate() {
        match request_as::<Bytes>(provider, "personal_sign", params).await {
            Ok(signature) => return Ok(signature),
            Err(err) if err.is_user_rejection() => return Err(err),
            Err(err) => {
                debug!(attempt = i + 1, %err, "personal_sign failed");
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| ProviderRpcError::unsupported_method("personal_sign")))
}
