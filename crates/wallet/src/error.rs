use alloy_primitives::ChainId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::brand::WalletBrand;

/// Error returned by an EIP-1193 provider `request` call.
///
/// See <https://eips.ethereum.org/EIPS/eip-1193#provider-errors>
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("provider error {code}: {message}")]
pub struct ProviderRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ProviderRpcError {
    /// The user rejected the request.
    pub const USER_REJECTED: i64 = 4001;
    /// The requested method and/or account has not been authorized by the user.
    pub const UNAUTHORIZED: i64 = 4100;
    /// The provider does not support the requested method.
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    /// The provider is disconnected from all chains.
    pub const DISCONNECTED: i64 = 4900;
    /// The provider is not connected to the requested chain.
    pub const CHAIN_DISCONNECTED: i64 = 4901;
    /// `wallet_switchEthereumChain` was called for a chain the wallet does not know.
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn user_rejected() -> Self {
        Self::new(Self::USER_REJECTED, "User rejected the request.")
    }

    pub fn unsupported_method(method: &str) -> Self {
        Self::new(Self::UNSUPPORTED_METHOD, format!("method {method} is not supported"))
    }

    /// Internal JSON-RPC error, used for transport level failures.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(-32603, message)
    }

    /// Returns `true` if the user dismissed the wallet prompt.
    ///
    /// Not every wallet uses code 4001, some only say so in the message.
    pub fn is_user_rejection(&self) -> bool {
        if self.code == Self::USER_REJECTED {
            return true;
        }
        let message = self.message.to_lowercase();
        message.contains("user rejected")
            || message.contains("user denied")
            || message.contains("rejected the request")
            || message.contains("拒绝")
    }

    /// Returns `true` if the wallet does not know the chain it was asked to switch to.
    ///
    /// Mobile wallets nest the original code under `data.originalError.code`.
    pub fn is_unrecognized_chain(&self) -> bool {
        if self.code == Self::UNRECOGNIZED_CHAIN {
            return true;
        }
        self.data
            .as_ref()
            .and_then(|data| data.pointer("/originalError/code"))
            .and_then(Value::as_i64)
            .is_some_and(|code| code == Self::UNRECOGNIZED_CHAIN)
    }
}

/// Errors that can occur while connecting a wallet.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("{}", no_provider_message(.brand))]
    NoProvider { brand: Option<WalletBrand> },
    #[error("the connection request was rejected in the wallet")]
    UserRejected,
    #[error("the wallet did not return any account")]
    NoAccounts,
    #[error(transparent)]
    Provider(#[from] ProviderRpcError),
}

impl ConnectError {
    /// Maps a failed `eth_requestAccounts` call, singling out user rejections.
    pub(crate) fn from_provider(err: ProviderRpcError) -> Self {
        if err.is_user_rejection() { Self::UserRejected } else { Self::Provider(err) }
    }
}

fn no_provider_message(brand: &Option<WalletBrand>) -> String {
    match brand {
        Some(brand) if *brand != WalletBrand::Unknown => format!(
            "{} was not detected, please install the wallet extension: {}",
            brand.display_name(),
            brand.install_url()
        ),
        _ => "no wallet detected, please install a wallet extension".to_string(),
    }
}

/// Errors that can occur while switching the wallet's network.
#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    #[error("no wallet is connected")]
    NotConnected,
    #[error("the network switch was rejected in the wallet")]
    Rejected,
    #[error("the wallet cannot switch to this network: {reason}")]
    Unsupported { reason: String },
}

impl From<ProviderRpcError> for SwitchError {
    fn from(err: ProviderRpcError) -> Self {
        if err.is_user_rejection() {
            Self::Rejected
        } else {
            Self::Unsupported { reason: err.message }
        }
    }
}

/// Errors that can occur while fetching the native balance.
#[derive(Debug, thiserror::Error)]
pub enum BalanceError {
    #[error("no public RPC endpoint is configured for chain {chain_id:?}")]
    NoFallback { chain_id: Option<ChainId> },
    #[error("fallback RPC request failed: {0}")]
    Fallback(#[from] alloy_transport::TransportError),
    #[error("fallback RPC request timed out after {timeout:?}")]
    Timeout { timeout: std::time::Duration },
    #[error("invalid fallback RPC url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Errors that can occur during the Sign-In with Ethereum handshake.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("connect a wallet before signing in")]
    NotConnected,
    #[error("could not obtain a sign-in nonce: {reason}")]
    NonceUnavailable { reason: String },
    #[error("the sign-in message was not signed: {reason}")]
    SignatureRejected { reason: String },
    #[error("the server rejected the sign-in: {reason}")]
    VerificationFailed { reason: String },
}

/// Errors returned by the auxiliary signers.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("no wallet is connected")]
    NotConnected,
    #[error("the signature request was rejected in the wallet")]
    Rejected,
    #[error("the wallet does not support this request: {reason}")]
    Unsupported { reason: String },
    #[error("invalid typed data: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Errors of the combined connect, sign-in and approval flow.
#[derive(Debug, thiserror::Error)]
pub enum AuthorizeError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error(transparent)]
    Approval(#[from] SignerError),
}

/// Configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Figment(#[from] Box<figment::Error>),
    #[error("failed to build the HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}
