use crate::mock::{MockProvider, ethereum, manager_with, test_config, wait_for_state};
use alloy_primitives::{U256, address};
use axum::{Json, Router, extract::State, routing::post};
use foresight_wallet::{
    BalanceError, BalanceOracle, ProviderRpcError, RpcFallbacks, StaticHost, WalletManager,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};

#[derive(Clone)]
struct RpcStub {
    result: Value,
    methods: Arc<Mutex<Vec<String>>>,
}

async fn rpc(State(stub): State<RpcStub>, Json(request): Json<Value>) -> Json<Value> {
    let method = request["method"].as_str().unwrap_or_default().to_string();
    stub.methods.lock().push(method);
    Json(json!({ "jsonrpc": "2.0", "id": request["id"], "result": stub.result }))
}

/// Serves a JSON-RPC endpoint answering every request with `result`.
async fn spawn_rpc(result: Value) -> (String, Arc<Mutex<Vec<String>>>) {
    let methods = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/", post(rpc))
        .with_state(RpcStub { result, methods: methods.clone() });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (format!("http://{addr}"), methods)
}

/// Serves an endpoint that accepts requests and never answers.
async fn spawn_stalled_rpc() -> String {
    let app = Router::new().route(
        "/",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Json(json!({}))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

fn manager_with_fallback(wallet: &Arc<MockProvider>, chain_id: u64, url: &str) -> WalletManager {
    let host = StaticHost::new(ethereum(wallet));
    let mut config = test_config("http://127.0.0.1:9");
    config.rpc = RpcFallbacks::empty();
    config.rpc.set(chain_id, url);
    manager_with(&host, config)
}

#[tokio::test]
async fn falls_back_to_public_rpc() {
    let (url, methods) = spawn_rpc(json!("0x2d79883d2000")).await;
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let wallet = MockProvider::metamask(account, "0x1").shared();
    wallet.set("eth_getBalance", Err(ProviderRpcError::internal("rate limited")));
    let manager = manager_with_fallback(&wallet, 1, &url);
    manager.connect(None).await.unwrap();

    let balance = manager.refresh_balance().await.unwrap();
    assert_eq!(balance.as_deref(), Some("0.000050"));

    wait_for_state(&manager, |state| !state.balance_loading).await;
    assert_eq!(manager.snapshot().balance_eth.as_deref(), Some("0.000050"));
    assert!(methods.lock().iter().any(|method| method == "eth_getBalance"));
}

#[tokio::test]
async fn falls_back_to_last_known_chain() {
    let (url, _) = spawn_rpc(json!("0xde0b6b3a7640000")).await;
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let wallet = MockProvider::metamask(account, "0xaa36a7").shared();
    wallet.set("eth_getBalance", Err(ProviderRpcError::internal("unsupported network")));
    let manager = manager_with_fallback(&wallet, 11155111, &url);
    manager.connect(None).await.unwrap();

    wallet.set("eth_chainId", Err(ProviderRpcError::internal("disconnected")));
    let balance = manager.refresh_balance().await.unwrap();
    assert_eq!(balance.as_deref(), Some("1.0000"));
}

#[tokio::test]
async fn failure_without_fallback_leaves_balance_unknown() {
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let wallet = MockProvider::metamask(account, "0x1").shared();
    wallet.set("eth_getBalance", Err(ProviderRpcError::internal("rate limited")));
    let manager = manager_with_fallback(&wallet, 137, "http://127.0.0.1:9");
    manager.connect(None).await.unwrap();

    let err = manager.refresh_balance().await.unwrap_err();
    assert!(matches!(err, BalanceError::NoFallback { chain_id: Some(1) }), "{err:?}");

    wait_for_state(&manager, |state| !state.balance_loading).await;
    let state = manager.snapshot();
    assert_eq!(state.balance_eth, None);
    assert!(state.is_connected(), "balance failures never end the session");
}

#[tokio::test]
async fn concurrent_refreshes_settle() {
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let wallet = MockProvider::metamask(account, "0x1").shared();
    wallet.set("eth_getBalance", Ok(json!("0x16345785d8a0000")));
    let manager = manager_with_fallback(&wallet, 1, "http://127.0.0.1:9");
    manager.connect(None).await.unwrap();

    let (a, b, c) =
        tokio::join!(manager.refresh_balance(), manager.refresh_balance(), manager.refresh_balance());
    for result in [a, b, c] {
        assert_eq!(result.unwrap().as_deref(), Some("0.1000"));
    }
    wait_for_state(&manager, |state| !state.balance_loading).await;
    assert_eq!(manager.snapshot().balance_eth.as_deref(), Some("0.1000"));
}

#[tokio::test]
async fn refresh_without_session_is_noop() {
    let host = StaticHost::default();
    let manager = manager_with(&host, test_config("http://127.0.0.1:9"));
    assert_eq!(manager.refresh_balance().await.unwrap(), None);
    assert!(!manager.snapshot().balance_loading);
}

#[tokio::test]
async fn primary_path_skips_fallback() {
    let (url, methods) = spawn_rpc(json!("0x1")).await;
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let wallet = MockProvider::wallet(account, "0x1");
    wallet.set("eth_getBalance", Ok(json!("0x5")));

    let mut fallbacks = RpcFallbacks::empty();
    fallbacks.set(1, url);
    let oracle = BalanceOracle::new(fallbacks);
    assert_eq!(oracle.balance_of(&wallet, account, None).await.unwrap(), U256::from(5));
    assert_eq!(wallet.calls_to("eth_getBalance"), [json!([account, "latest"])]);
    assert!(methods.lock().is_empty());
}

#[tokio::test]
async fn stalled_fallback_times_out() {
    let url = spawn_stalled_rpc().await;
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let wallet = MockProvider::metamask(account, "0x1").shared();
    wallet.set("eth_getBalance", Err(ProviderRpcError::internal("rate limited")));
    let host = StaticHost::new(ethereum(&wallet));
    let mut config = test_config("http://127.0.0.1:9");
    config.rpc = RpcFallbacks::empty();
    config.rpc.set(1, url);
    config.timings.http_timeout_secs = 1;
    let manager = manager_with(&host, config);
    manager.connect(None).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(4), manager.refresh_balance())
        .await
        .expect("refresh must not hang on a stalled node");
    let err = result.unwrap_err();
    assert!(matches!(err, BalanceError::Timeout { .. }), "{err:?}");

    wait_for_state(&manager, |state| !state.balance_loading).await;
    let state = manager.snapshot();
    assert_eq!(state.balance_eth, None);
    assert!(state.is_connected());
}
