//! An [`Eip1193Provider`] backed by a plain JSON-RPC node.
//!
//! Nodes with unlocked accounts (anvil, hardhat) answer the same signing methods an injected
//! wallet does, which makes them a stand-in for a browser extension outside the browser.

use alloy_json_rpc::RpcError;
use alloy_rpc_client::{ClientBuilder, RpcClient};
use alloy_transport::TransportErrorKind;
use async_trait::async_trait;
use serde_json::{Value, json};
use url::Url;

use super::Eip1193Provider;
use crate::error::ProviderRpcError;

/// EIP-1193 adapter over an HTTP JSON-RPC endpoint.
#[derive(Clone, Debug)]
pub struct JsonRpcProvider {
    client: RpcClient,
    url: Url,
}

impl JsonRpcProvider {
    pub fn new(url: Url) -> Self {
        let client = ClientBuilder::default().http(url.clone());
        Self { client, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Eip1193Provider for JsonRpcProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        // A node has no consent prompt, its unlocked accounts are always exposed.
        let method = match method {
            "eth_requestAccounts" => "eth_accounts",
            other => other,
        };
        trace!(method, %params, url = %self.url, "json-rpc request");
        self.client
            .request::<Value, Value>(method.to_string(), params)
            .await
            .map_err(into_provider_error)
    }

    fn property(&self, name: &str) -> Option<Value> {
        match name {
            "host" => Some(json!(self.url.as_str())),
            _ => None,
        }
    }

    fn constructor_name(&self) -> Option<String> {
        Some("JsonRpcProvider".to_string())
    }
}

fn into_provider_error(err: RpcError<TransportErrorKind>) -> ProviderRpcError {
    match err {
        RpcError::ErrorResp(payload) => {
            let data = payload.data.as_ref().and_then(|raw| serde_json::from_str(raw.get()).ok());
            ProviderRpcError { code: payload.code, message: payload.message.to_string(), data }
        }
        other => ProviderRpcError::internal(other.to_string()),
    }
}
