use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The wallet vendor behind an injected provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletBrand {
    MetaMask,
    Coinbase,
    Binance,
    Okx,
    /// A provider exists but its vendor could not be determined.
    #[default]
    Unknown,
}

impl WalletBrand {
    /// Brands that can be requested explicitly, in the order they are offered to users.
    pub const KNOWN: [Self; 4] = [Self::MetaMask, Self::Coinbase, Self::Binance, Self::Okx];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MetaMask => "metamask",
            Self::Coinbase => "coinbase",
            Self::Binance => "binance",
            Self::Okx => "okx",
            Self::Unknown => "unknown",
        }
    }

    /// Human readable name of the wallet.
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::MetaMask => "MetaMask",
            Self::Coinbase => "Coinbase Wallet",
            Self::Binance => "Binance Wallet",
            Self::Okx => "OKX Wallet",
            Self::Unknown => "Browser Wallet",
        }
    }

    /// Where users can get the extension.
    pub const fn install_url(&self) -> &'static str {
        match self {
            Self::MetaMask => "https://metamask.io/download/",
            Self::Coinbase => "https://www.coinbase.com/wallet/downloads",
            Self::Binance => "https://www.binance.com/en/web3wallet",
            Self::Okx => "https://www.okx.com/web3",
            Self::Unknown => "https://ethereum.org/en/wallets/find-wallet/",
        }
    }

    /// Lowercase fragments found in the EIP-6963 `name`/`rdns` and in legacy `host`/`name`
    /// fields of this brand's provider.
    pub(crate) const fn name_hints(&self) -> &'static [&'static str] {
        match self {
            Self::MetaMask => &["metamask", "io.metamask"],
            Self::Coinbase => &["coinbase", "com.coinbase"],
            Self::Binance => &["binance", "bnb", "com.binance"],
            Self::Okx => &["okx", "okex", "com.okex"],
            Self::Unknown => &[],
        }
    }

    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for WalletBrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletBrand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "metamask" | "meta-mask" => Ok(Self::MetaMask),
            "coinbase" | "coinbase-wallet" | "coinbasewallet" => Ok(Self::Coinbase),
            "binance" | "binance-wallet" | "bsc" => Ok(Self::Binance),
            "okx" | "okex" | "okx-wallet" | "okxwallet" => Ok(Self::Okx),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown wallet brand: {other}")),
        }
    }
}
