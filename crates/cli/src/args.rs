use alloy_chains::Chain;
use alloy_primitives::{Address, ChainId};
use clap::{ArgAction, Parser, Subcommand};
use foresight_wallet::network::parse_chain_id;
use std::path::PathBuf;
use url::Url;

const VERSION_MESSAGE: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");

/// Connect a wallet, sign in to Foresight and sign approvals from the command line.
///
/// The wallet is a JSON-RPC node with unlocked accounts (anvil, hardhat, geth --dev), standing
/// in for a browser extension.
#[derive(Debug, Parser)]
#[command(name = "foresight", version = VERSION_MESSAGE, next_display_order = None)]
pub struct Foresight {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub cmd: ForesightSubcommand,
}

#[derive(Clone, Debug, Parser)]
pub struct GlobalArgs {
    /// The wallet node RPC endpoint.
    #[arg(
        long,
        short,
        global = true,
        env = "FORESIGHT_WALLET_RPC_URL",
        default_value = "http://localhost:8545",
        value_name = "URL"
    )]
    pub rpc_url: Url,

    /// The Foresight backend serving `/api/siwe`. Overrides the configuration.
    #[arg(long, global = true, env = "FORESIGHT_API_URL", value_name = "URL")]
    pub api_url: Option<Url>,

    /// Path to the configuration file.
    #[arg(long, short, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Page URL the sign-in message is issued for.
    #[arg(long, global = true, value_name = "URL")]
    pub origin: Option<Url>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbosity level of the log messages.
    ///
    /// Pass multiple times to increase the verbosity (e.g. -v, -vv, -vvv).
    #[arg(long, short, global = true, action = ArgAction::Count)]
    pub verbosity: u8,
}

#[derive(Debug, Subcommand)]
pub enum ForesightSubcommand {
    /// Connect the wallet and print the session.
    #[command(visible_alias = "c")]
    Connect,

    /// Print the native balance of the connected account.
    #[command(visible_alias = "b")]
    Balance,

    /// Sign in to the backend with Sign-In with Ethereum.
    Login,

    /// End the backend session.
    Logout,

    /// Switch the wallet to another chain, adding it first if needed.
    #[command(visible_alias = "switch")]
    SwitchChain {
        /// Chain name or id, decimal or `0x` prefixed hex.
        #[arg(value_parser = parse_chain)]
        chain: ChainId,
    },

    /// Sign an EIP-712 approval.
    Approve(ApprovalArgs),

    /// Connect, request permissions, sign in and sign an approval in one go.
    Authorize(ApprovalArgs),

    /// List the chains the wallet can be asked to add and the fallback RPC endpoints.
    Chains,
}

#[derive(Clone, Debug, Default, Parser)]
pub struct ApprovalArgs {
    /// Verifying contract of the typed data domain.
    #[arg(long, value_name = "ADDRESS")]
    pub contract: Option<Address>,

    /// The approved action.
    #[arg(long)]
    pub action: Option<String>,

    /// Approval nonce.
    #[arg(long)]
    pub nonce: Option<u64>,
}

fn parse_chain(s: &str) -> Result<ChainId, String> {
    if let Ok(id) = parse_chain_id(s) {
        return Ok(id);
    }
    s.parse::<Chain>().map(|chain| chain.id()).map_err(|_| format!("unknown chain `{s}`"))
}
