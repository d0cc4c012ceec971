use crate::mock::{MockProvider, ethereum, manager, wait_for_state};
use alloy_primitives::address;
use foresight_wallet::{InjectedGlobals, ProviderRpcError, SwitchError};
use serde_json::json;

fn unrecognized_chain() -> ProviderRpcError {
    ProviderRpcError::new(ProviderRpcError::UNRECOGNIZED_CHAIN, "Unrecognized chain ID")
}

#[tokio::test]
async fn switch_to_active_chain_is_noop() {
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let wallet = MockProvider::metamask(account, "0xaa36a7").shared();
    let (manager, _) = manager(ethereum(&wallet));
    manager.connect(None).await.unwrap();

    manager.switch_network(11155111).await.unwrap();
    assert!(wallet.calls_to("wallet_switchEthereumChain").is_empty());
    assert!(!manager.snapshot().is_switching);
}

#[tokio::test]
async fn switch_updates_session_chain() {
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let wallet = MockProvider::metamask(account, "0x1")
        .respond("wallet_switchEthereumChain", Ok(json!(null)))
        .shared();
    let (manager, _) = manager(ethereum(&wallet));
    manager.connect(None).await.unwrap();

    manager.switch_network(137).await.unwrap();
    assert_eq!(wallet.calls_to("wallet_switchEthereumChain"), [json!([{ "chainId": "0x89" }])]);
    assert_eq!(manager.snapshot().chain_id(), Some(137));
    assert!(!manager.snapshot().is_switching);
}

#[tokio::test]
async fn unknown_chain_is_added_then_switched() {
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let wallet = MockProvider::metamask(account, "0x1")
        .respond("wallet_switchEthereumChain", Err(unrecognized_chain()))
        .respond("wallet_switchEthereumChain", Ok(json!(null)))
        .respond("wallet_addEthereumChain", Ok(json!(null)))
        .shared();
    let (manager, _) = manager(ethereum(&wallet));
    manager.connect(None).await.unwrap();

    manager.switch_network(11155111).await.unwrap();

    let added = wallet.calls_to("wallet_addEthereumChain");
    assert_eq!(added.len(), 1);
    assert_eq!(added[0][0]["chainId"], "0xaa36a7");
    assert_eq!(added[0][0]["nativeCurrency"]["decimals"], 18);
    assert!(added[0][0]["rpcUrls"].as_array().is_some_and(|urls| !urls.is_empty()));
    assert_eq!(wallet.calls_to("wallet_switchEthereumChain").len(), 2);
    assert_eq!(manager.snapshot().chain_id(), Some(11155111));
}

#[tokio::test]
async fn nested_unrecognized_chain_code() {
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let nested = ProviderRpcError::new(-32603, "Unrecognized chain ID")
        .with_data(json!({ "originalError": { "code": 4902 } }));
    let wallet = MockProvider::metamask(account, "0x1")
        .respond("wallet_switchEthereumChain", Err(nested))
        .respond("wallet_switchEthereumChain", Ok(json!(null)))
        .respond("wallet_addEthereumChain", Ok(json!(null)))
        .shared();
    let (manager, _) = manager(ethereum(&wallet));
    manager.connect(None).await.unwrap();

    manager.switch_network(80002).await.unwrap();
    assert_eq!(wallet.calls_to("wallet_addEthereumChain").len(), 1);
}

#[tokio::test]
async fn unconfigured_unknown_chain_is_unsupported() {
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let wallet = MockProvider::metamask(account, "0x1")
        .respond("wallet_switchEthereumChain", Err(unrecognized_chain()))
        .shared();
    let (manager, _) = manager(ethereum(&wallet));
    manager.connect(None).await.unwrap();

    let err = manager.switch_network(424242).await.unwrap_err();
    assert!(matches!(err, SwitchError::Unsupported { .. }), "{err:?}");
    assert!(wallet.calls_to("wallet_addEthereumChain").is_empty());
    assert_eq!(manager.snapshot().chain_id(), Some(1));
}

#[tokio::test]
async fn rejected_switch() {
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let wallet = MockProvider::metamask(account, "0x1")
        .respond("wallet_switchEthereumChain", Err(ProviderRpcError::user_rejected()))
        .shared();
    let (manager, _) = manager(ethereum(&wallet));
    manager.connect(None).await.unwrap();

    let err = manager.switch_network(137).await.unwrap_err();
    assert!(matches!(err, SwitchError::Rejected), "{err:?}");
    let state = manager.snapshot();
    assert_eq!(state.chain_id(), Some(1));
    assert!(!state.is_switching);
}

#[tokio::test]
async fn switch_requires_connection() {
    let (manager, _) = manager(InjectedGlobals::default());
    let err = manager.switch_network(1).await.unwrap_err();
    assert!(matches!(err, SwitchError::NotConnected), "{err:?}");
}

#[tokio::test]
async fn switch_refreshes_balance() {
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let wallet = MockProvider::metamask(account, "0x1")
        .respond("wallet_switchEthereumChain", Ok(json!(null)))
        .shared();
    let (manager, _) = manager(ethereum(&wallet));
    manager.connect(None).await.unwrap();
    wait_for_state(&manager, |state| state.balance_eth.is_some()).await;
    let before = wallet.calls_to("eth_getBalance").len();

    wallet.set("eth_getBalance", Ok(json!("0xde0b6b3a7640000")));
    manager.switch_network(137).await.unwrap();
    wait_for_state(&manager, |state| state.balance_eth.as_deref() == Some("1.0000")).await;
    assert!(wallet.calls_to("eth_getBalance").len() > before);
}
