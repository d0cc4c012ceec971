use crate::args::{ApprovalArgs, Foresight, ForesightSubcommand, GlobalArgs};
use eyre::Result;
use foresight_wallet::{
    ActiveSession, ApprovalRequest, ApprovalSignature, InjectedGlobals, JsonRpcProvider,
    ProviderRegistry, SharedProvider, StaticHost, WalletConfig, WalletManager,
    network::{chain_id_hex, chain_name},
};
use serde_json::{Value, json};
use std::sync::Arc;

pub async fn run(args: Foresight) -> Result<()> {
    let Foresight { global, cmd } = args;

    let mut config = WalletConfig::load(global.config.as_deref())?;
    if let Some(api_url) = &global.api_url {
        config.api_url = api_url.clone();
    }

    let manager = manager(&global, config.clone())?;
    match cmd {
        ForesightSubcommand::Chains => chains(&config, global.json)?,
        ForesightSubcommand::Connect => {
            let (session, balance) = connect(&manager).await?;
            print_session(&session, balance.as_deref(), global.json)?;
        }
        ForesightSubcommand::Balance => {
            let (session, balance) = connect(&manager).await?;
            let value = json!({ "account": session.address, "balance": balance });
            output(global.json, value, || balance.unwrap_or_else(|| "unknown".to_string()))?;
        }
        ForesightSubcommand::Login => {
            manager.connect(None).await?;
            let login = manager.siwe_login().await?;
            output(global.json, json!({ "address": login.address }), || {
                format!("Signed in as {}", login.address)
            })?;
        }
        ForesightSubcommand::Logout => {
            manager.siwe_logout().await?;
            output(global.json, json!({ "success": true }), || "Signed out".to_string())?;
        }
        ForesightSubcommand::SwitchChain { chain } => {
            manager.connect(None).await?;
            manager.switch_network(chain).await?;
            output(global.json, json!({ "chainId": chain_id_hex(chain) }), || {
                format!("Switched to {} ({chain})", chain_name(chain))
            })?;
        }
        ForesightSubcommand::Approve(approval) => {
            manager.connect(None).await?;
            let signature = manager.sign_typed_approval(approval_request(approval)).await?;
            print_signature(&signature, global.json)?;
        }
        ForesightSubcommand::Authorize(approval) => {
            let authorization =
                manager.connect_and_authorize(None, approval_request(approval)).await?;
            if global.json {
                let value = json!({
                    "account": authorization.session.address,
                    "chainId": authorization.session.chain_id_hex(),
                    "permissions": authorization.permissions.map(|grant| format!("{grant:?}").to_lowercase()),
                    "authenticated": authorization.login.address,
                    "signature": authorization.approval.signature,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_session(&authorization.session, None, false)?;
                println!("Signed in as {}", authorization.login.address);
                print_signature(&authorization.approval, false)?;
            }
        }
    }
    Ok(())
}

/// Connects and reads the balance, a failed balance lookup is not fatal.
async fn connect(manager: &WalletManager) -> Result<(ActiveSession, Option<String>)> {
    let session = manager.connect(None).await?;
    let balance = match manager.refresh_balance().await {
        Ok(balance) => balance,
        Err(err) => {
            warn!(%err, "balance unavailable");
            None
        }
    };
    Ok((session, balance))
}

/// A manager whose only wallet is the node at `--rpc-url`, injected as `window.ethereum`.
fn manager(global: &GlobalArgs, config: WalletConfig) -> Result<WalletManager> {
    let wallet: SharedProvider = Arc::new(JsonRpcProvider::new(global.rpc_url.clone()));
    let mut host =
        StaticHost::new(InjectedGlobals { ethereum: Some(wallet), ..Default::default() });
    if let Some(origin) = &global.origin {
        host = host.with_location(origin.clone());
    }
    let registry = ProviderRegistry::new(Arc::new(host));
    Ok(WalletManager::builder(registry).config(config).build()?)
}

fn approval_request(args: ApprovalArgs) -> ApprovalRequest {
    ApprovalRequest { verifying_contract: args.contract, action: args.action, nonce: args.nonce }
}

fn output(json: bool, value: Value, human: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", human());
    }
    Ok(())
}

fn print_session(session: &ActiveSession, balance: Option<&str>, json: bool) -> Result<()> {
    let value = json!({
        "account": session.address,
        "chainId": session.chain_id_hex(),
        "wallet": session.brand,
        "balance": balance,
    });
    output(json, value, || {
        let chain = match session.chain_id {
            Some(id) => format!("{} ({id})", chain_name(id)),
            None => "unknown".to_string(),
        };
        format!(
            "Account: {}\nChain:   {chain}\nWallet:  {}\nBalance: {}",
            session.address,
            session.brand.display_name(),
            balance.unwrap_or("unknown"),
        )
    })
}

fn print_signature(approval: &ApprovalSignature, json: bool) -> Result<()> {
    let kind = format!("{:?}", approval.kind);
    output(json, json!({ "signature": approval.signature, "kind": kind }), || {
        format!("Signature: {} ({kind})", approval.signature)
    })
}

fn chains(config: &WalletConfig, json: bool) -> Result<()> {
    if json {
        let value = json!({ "chains": config.chains, "rpc": config.rpc });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    println!("Chains added on demand:");
    for (id, chain) in config.chains.iter() {
        println!("  {id:>10}  {}  {}", chain.chain_name, chain.rpc_urls.join(", "));
    }
    println!("Fallback RPC endpoints:");
    for (id, url) in config.rpc.iter() {
        println!("  {id:>10}  {url}");
    }
    Ok(())
}
