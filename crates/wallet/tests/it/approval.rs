use crate::mock::{MockProvider, ethereum, manager, manager_with, test_config};
use alloy_primitives::{Bytes, address, hex};
use axum::{
    Json, Router,
    routing::{get, post},
};
use foresight_wallet::{
    ApprovalRequest, AuthorizeError, ConnectError, InjectedGlobals, PermissionGrant,
    ProviderRpcError, SignatureKind, SignerError, StaticHost, WalletBrand,
};
use serde_json::{Value, json};

fn signature() -> Bytes {
    Bytes::from(vec![0x22; 65])
}

#[tokio::test]
async fn permissions_granted() {
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let wallet = MockProvider::metamask(account, "0x1")
        .respond("wallet_requestPermissions", Ok(json!([{ "parentCapability": "eth_accounts" }])))
        .shared();
    let (manager, _) = manager(ethereum(&wallet));
    manager.connect(None).await.unwrap();

    assert_eq!(manager.request_permissions().await.unwrap(), PermissionGrant::Granted);
    assert_eq!(wallet.calls_to("wallet_requestPermissions"), [json!([{ "eth_accounts": {} }])]);
}

#[tokio::test]
async fn permissions_degrade_to_request_accounts() {
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let wallet = MockProvider::metamask(account, "0x1").shared();
    let (manager, _) = manager(ethereum(&wallet));
    manager.connect(None).await.unwrap();

    assert_eq!(manager.request_permissions().await.unwrap(), PermissionGrant::Degraded);
    assert_eq!(wallet.calls_to("eth_requestAccounts").len(), 2);
}

#[tokio::test]
async fn signers_require_connection() {
    let (manager, _) = manager(InjectedGlobals::default());
    assert!(matches!(manager.request_permissions().await, Err(SignerError::NotConnected)));
    assert!(matches!(
        manager.sign_typed_approval(ApprovalRequest::default()).await,
        Err(SignerError::NotConnected)
    ));
}

#[tokio::test]
async fn typed_approval() {
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let contract = address!("0x5FbDB2315678afecb367f032d93F642f64180aa3");
    let wallet = MockProvider::metamask(account, "0xaa36a7")
        .respond("eth_signTypedData_v4", Ok(json!(signature())))
        .shared();
    let (manager, _) = manager(ethereum(&wallet));
    manager.connect(None).await.unwrap();

    let request = ApprovalRequest {
        verifying_contract: Some(contract),
        action: Some("resolve-market".to_string()),
        nonce: Some(3),
    };
    let approval = manager.sign_typed_approval(request).await.unwrap();
    assert_eq!(approval.signature, signature());
    assert_eq!(approval.kind, SignatureKind::TypedData);
    assert!(!manager.snapshot().is_signing);

    let calls = wallet.calls_to("eth_signTypedData_v4");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][0], json!(account));
    let typed: Value = serde_json::from_str(calls[0][1].as_str().unwrap()).unwrap();
    assert_eq!(typed["primaryType"], "Approve");
    assert_eq!(typed["domain"]["name"], "Foresight MultiSig");
    assert_eq!(typed["domain"]["version"], "1");
    assert_eq!(typed["domain"]["chainId"], 11155111);
    assert_eq!(typed["domain"]["verifyingContract"], json!(contract));
    assert_eq!(typed["message"]["action"], "resolve-market");
    assert_eq!(typed["message"]["nonce"], 3);
    assert!(typed["message"]["timestamp"].as_u64().is_some_and(|ts| ts > 1_600_000_000));
    assert_eq!(typed["types"]["Approve"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn typed_approval_degrades_to_message_signing() {
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let wallet = MockProvider::metamask(account, "0x1")
        .respond("personal_sign", Ok(json!(signature())))
        .shared();
    let (manager, _) = manager(ethereum(&wallet));
    manager.connect(None).await.unwrap();

    let approval = manager.sign_typed_approval(ApprovalRequest::default()).await.unwrap();
    assert_eq!(approval.kind, SignatureKind::PersonalSign);

    let typed_json = wallet.calls_to("eth_signTypedData_v4")[0][1].as_str().unwrap().to_string();
    let signed = wallet.calls_to("personal_sign");
    assert_eq!(signed, [json!([hex::encode_prefixed(&typed_json), account])]);
}

#[tokio::test]
async fn typed_approval_fails_when_every_path_fails() {
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let wallet = MockProvider::metamask(account, "0x1").shared();
    let (manager, _) = manager(ethereum(&wallet));
    manager.connect(None).await.unwrap();

    let err = manager.sign_typed_approval(ApprovalRequest::default()).await.unwrap_err();
    assert!(matches!(err, SignerError::Unsupported { .. }), "{err:?}");
    assert!(!manager.snapshot().is_signing);
}

#[tokio::test]
async fn rejected_typed_approval_is_final() {
    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let wallet = MockProvider::metamask(account, "0x1")
        .respond("eth_signTypedData_v4", Err(ProviderRpcError::user_rejected()))
        .respond("personal_sign", Ok(json!(signature())))
        .shared();
    let (manager, _) = manager(ethereum(&wallet));
    manager.connect(None).await.unwrap();

    let err = manager.sign_typed_approval(ApprovalRequest::default()).await.unwrap_err();
    assert!(matches!(err, SignerError::Rejected), "{err:?}");
    assert!(wallet.calls_to("personal_sign").is_empty());
}

#[tokio::test]
async fn connect_and_authorize_runs_in_order() {
    let app = Router::new()
        .route("/api/siwe/nonce", get(|| async { Json(json!({ "nonce": "n0nce" })) }))
        .route("/api/siwe/verify", post(|| async { Json(json!({ "success": true })) }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let account = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let wallet = MockProvider::okx(account, "0x1")
        .respond("personal_sign", Ok(json!(signature())))
        .respond("eth_signTypedData_v4", Ok(json!(signature())))
        .shared();
    let host = StaticHost::new(InjectedGlobals {
        okx: vec![crate::mock::shared(&wallet)],
        ..Default::default()
    });
    let manager = manager_with(&host, test_config(&url));

    let authorization =
        manager.connect_and_authorize(Some(WalletBrand::Okx), ApprovalRequest::default()).await.unwrap();
    assert_eq!(authorization.session.brand, WalletBrand::Okx);
    assert_eq!(authorization.permissions, Some(PermissionGrant::Degraded));
    assert_eq!(authorization.login.address, account);
    assert_eq!(authorization.approval.kind, SignatureKind::TypedData);

    let order: Vec<String> = wallet
        .calls()
        .into_iter()
        .map(|(method, _)| method)
        .filter(|method| {
            matches!(
                method.as_str(),
                "eth_requestAccounts" | "wallet_requestPermissions" | "personal_sign" | "eth_signTypedData_v4"
            )
        })
        .collect();
    assert_eq!(
        order,
        [
            "eth_requestAccounts",
            "wallet_requestPermissions",
            "eth_requestAccounts",
            "personal_sign",
            "eth_signTypedData_v4"
        ]
    );
}

#[tokio::test]
async fn connect_and_authorize_stops_on_connect_failure() {
    let (manager, _) = manager(InjectedGlobals::default());
    let err = manager.connect_and_authorize(None, ApprovalRequest::default()).await.unwrap_err();
    assert!(matches!(err, AuthorizeError::Connect(ConnectError::NoProvider { .. })), "{err:?}");
}
