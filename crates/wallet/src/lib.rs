//! # foresight-wallet
//!
//! Wallet connectivity for Foresight: discovery of injected EIP-1193 providers (legacy globals
//! and EIP-6963 announcements), a single observable wallet session, native balance lookups with
//! public RPC fallbacks, Sign-In with Ethereum and EIP-712 typed approvals.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate tracing;

pub mod approval;
pub mod balance;
pub mod brand;
pub mod config;
pub mod error;
pub mod host;
pub mod manager;
pub mod network;
pub mod provider;
pub mod registry;
pub mod session;
pub mod siwe;
pub mod store;

pub use approval::{ApprovalRequest, ApprovalSignature, PermissionGrant, SignatureKind};
pub use balance::{BalanceOracle, RpcFallbacks, format_balance};
pub use brand::WalletBrand;
pub use config::WalletConfig;
pub use error::{
    AuthorizeError, BalanceError, ConfigError, ConnectError, LoginError, ProviderRpcError,
    SignerError, SwitchError,
};
pub use host::{InjectedGlobals, StaticHost, WalletHost};
pub use manager::{Authorization, SiweLogin, WalletManager, WalletManagerBuilder};
pub use provider::{Eip1193Provider, JsonRpcProvider, ProviderEvent, SharedProvider};
pub use registry::{AnnouncedProvider, ProviderInfo, ProviderRegistry, WalletDescriptor};
pub use session::{ActiveSession, ConnectionStatus, WalletState};
pub use siwe::{SiweApi, SiweMessage};
pub use store::{MemoryStore, SessionStore};
