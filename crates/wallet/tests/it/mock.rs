//! Scriptable EIP-1193 provider.

use alloy_primitives::Address;
use async_trait::async_trait;
use foresight_wallet::{
    Eip1193Provider, InjectedGlobals, ProviderEvent, ProviderRegistry, ProviderRpcError,
    SharedProvider, StaticHost, WalletConfig, WalletManager,
};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio::sync::broadcast;

type Response = Result<Value, ProviderRpcError>;

/// A provider answering from per-method response queues.
///
/// The last queued response of a method is repeated once the queue is drained. Methods without
/// a response fail with code 4200.
#[derive(Debug)]
pub struct MockProvider {
    properties: Map<String, Value>,
    constructor: Option<String>,
    native_disconnect: bool,
    responses: Mutex<HashMap<String, VecDeque<Response>>>,
    calls: Mutex<Vec<(String, Value)>>,
    events: broadcast::Sender<ProviderEvent>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            properties: Map::new(),
            constructor: None,
            native_disconnect: false,
            responses: Default::default(),
            calls: Default::default(),
            events: broadcast::channel(16).0,
        }
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A wallet exposing `address` on `chain_id` with a zero balance.
    pub fn wallet(address: Address, chain_id: &str) -> Self {
        Self::new()
            .respond("eth_requestAccounts", Ok(json!([address])))
            .respond("eth_accounts", Ok(json!([address])))
            .respond("eth_chainId", Ok(json!(chain_id)))
            .respond("eth_getBalance", Ok(json!("0x0")))
    }

    pub fn metamask(address: Address, chain_id: &str) -> Self {
        Self::wallet(address, chain_id)
            .property("isMetaMask", json!(true))
            .property("_metamask", json!({}))
    }

    pub fn okx(address: Address, chain_id: &str) -> Self {
        Self::wallet(address, chain_id)
            .property("isMetaMask", json!(true))
            .property("isOkxWallet", json!(true))
    }

    pub fn property(mut self, name: &str, value: Value) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    pub fn constructor(mut self, name: &str) -> Self {
        self.constructor = Some(name.to_string());
        self
    }

    pub fn native_disconnect(mut self) -> Self {
        self.native_disconnect = true;
        self
    }

    pub fn respond(self, method: &str, response: Response) -> Self {
        self.push(method, response);
        self
    }

    /// Replaces the queued responses of `method`.
    pub fn set(&self, method: &str, response: Response) {
        self.responses.lock().insert(method.to_string(), VecDeque::from([response]));
    }

    /// Queues another response for `method`.
    pub fn push(&self, method: &str, response: Response) {
        self.responses.lock().entry(method.to_string()).or_default().push_back(response);
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }

    /// Number of live event subscriptions.
    pub fn listeners(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    /// Params of every call to `method`, in order.
    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls.lock().iter().filter(|(m, _)| m == method).map(|(_, p)| p.clone()).collect()
    }
}

#[async_trait]
impl Eip1193Provider for MockProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        self.calls.lock().push((method.to_string(), params));
        let mut responses = self.responses.lock();
        let Some(queue) = responses.get_mut(method) else {
            return Err(ProviderRpcError::unsupported_method(method));
        };
        match queue.len() {
            0 => Err(ProviderRpcError::unsupported_method(method)),
            1 => queue[0].clone(),
            _ => queue.pop_front().unwrap(),
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        Some(self.events.subscribe())
    }

    fn property(&self, name: &str) -> Option<Value> {
        self.properties.get(name).cloned()
    }

    fn constructor_name(&self) -> Option<String> {
        self.constructor.clone()
    }

    fn supports_disconnect(&self) -> bool {
        self.native_disconnect
    }

    async fn disconnect(&self) -> Result<(), ProviderRpcError> {
        self.calls.lock().push(("disconnect".to_string(), Value::Null));
        Ok(())
    }
}

pub fn shared(provider: &Arc<MockProvider>) -> SharedProvider {
    provider.clone()
}

/// Globals with `window.ethereum` set to `provider`.
pub fn ethereum(provider: &Arc<MockProvider>) -> InjectedGlobals {
    InjectedGlobals { ethereum: Some(shared(provider)), ..Default::default() }
}

/// Config with short delays, pointing the backend at `api_url`.
pub fn test_config(api_url: &str) -> WalletConfig {
    let mut config = WalletConfig::default();
    config.api_url = api_url.parse().unwrap();
    config.timings.okx_retry_ms = 10;
    config.timings.announce_settle_ms = 50;
    config.timings.http_timeout_secs = 5;
    config
}

pub fn manager_with(host: &StaticHost, config: WalletConfig) -> WalletManager {
    WalletManager::builder(ProviderRegistry::new(Arc::new(host.clone())))
        .config(config)
        .build()
        .unwrap()
}

pub fn manager(globals: InjectedGlobals) -> (WalletManager, StaticHost) {
    let host = StaticHost::new(globals);
    let manager = manager_with(&host, test_config("http://127.0.0.1:9"));
    (manager, host)
}

/// Waits until the state satisfies `f`.
pub async fn wait_for_state(
    manager: &WalletManager,
    f: impl FnMut(&foresight_wallet::WalletState) -> bool,
) {
    let mut rx = manager.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(f))
        .await
        .expect("timed out waiting for wallet state")
        .expect("state channel closed");
}

/// Waits until `provider` has no event subscribers left.
pub async fn wait_for_no_listeners(provider: &MockProvider) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while provider.listeners() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("listener still subscribed");
}
