use alloy_primitives::{Address, ChainId};

use crate::{brand::WalletBrand, network::chain_id_hex, provider::SharedProvider};

/// The single active wallet connection.
///
/// The address and the provider handle are always set together.
#[derive(Clone, Debug)]
pub struct ActiveSession {
    pub address: Address,
    /// `None` when the wallet reported a chain id that could not be parsed.
    pub chain_id: Option<ChainId>,
    pub brand: WalletBrand,
    pub provider: SharedProvider,
}

impl ActiveSession {
    /// The chain id as `0x` prefixed hex.
    pub fn chain_id_hex(&self) -> Option<String> {
        self.chain_id.map(chain_id_hex)
    }
}

/// Connection lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Observable wallet state.
#[derive(Clone, Debug, Default)]
pub struct WalletState {
    pub session: Option<ActiveSession>,
    pub status: ConnectionStatus,
    /// Message of the last failed connection attempt.
    pub connect_error: Option<String>,
    pub is_connecting: bool,
    pub is_switching: bool,
    pub is_signing: bool,
    /// Native balance as a fixed-point decimal string, `None` while unknown.
    pub balance_eth: Option<String>,
    pub balance_loading: bool,
    /// Address the backend verified through Sign-In with Ethereum.
    pub authenticated: Option<Address>,
}

impl WalletState {
    pub fn account(&self) -> Option<Address> {
        self.session.as_ref().map(|session| session.address)
    }

    pub fn chain_id(&self) -> Option<ChainId> {
        self.session.as_ref().and_then(|session| session.chain_id)
    }

    pub fn current_wallet_type(&self) -> Option<WalletBrand> {
        self.session.as_ref().map(|session| session.brand)
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Drops the session and everything derived from it.
    pub(crate) fn clear_session(&mut self) {
        self.session = None;
        self.status = ConnectionStatus::Disconnected;
        self.balance_eth = None;
        self.balance_loading = false;
        self.authenticated = None;
    }
}
