//! Sign-In with Ethereum, [EIP-4361](https://eips.ethereum.org/EIPS/eip-4361).
//!
//! The handshake is a challenge-response against the backend:
//! 1. `GET /api/siwe/nonce` returns a single-use nonce
//! 2. the wallet signs an EIP-4361 message embedding that nonce
//! 3. `POST /api/siwe/verify` checks the signature and opens a server session (cookie)

use alloy_primitives::{Address, Bytes, ChainId};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use url::Url;

use crate::{
    config::SiweConfig,
    error::LoginError,
    provider::{self, Eip1193Provider},
};

/// An EIP-4361 message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SiweMessage {
    pub domain: String,
    pub address: Address,
    pub statement: Option<String>,
    pub uri: String,
    pub version: String,
    pub chain_id: ChainId,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub expiration_time: Option<DateTime<Utc>>,
    pub request_id: Option<String>,
    pub resources: Vec<String>,
}

impl fmt::Display for SiweMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} wants you to sign in with your Ethereum account:", self.domain)?;
        // `Address` displays with its EIP-55 checksum, as the format requires.
        writeln!(f, "{}", self.address)?;
        writeln!(f)?;
        // The blank line after the statement stays even without one.
        if let Some(statement) = &self.statement {
            writeln!(f, "{statement}")?;
        }
        writeln!(f)?;
        writeln!(f, "URI: {}", self.uri)?;
        writeln!(f, "Version: {}", self.version)?;
        writeln!(f, "Chain ID: {}", self.chain_id)?;
        writeln!(f, "Nonce: {}", self.nonce)?;
        write!(f, "Issued At: {}", timestamp(&self.issued_at))?;
        if let Some(expiration_time) = &self.expiration_time {
            write!(f, "\nExpiration Time: {}", timestamp(expiration_time))?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, "\nRequest ID: {request_id}")?;
        }
        if !self.resources.is_empty() {
            write!(f, "\nResources:")?;
            for resource in &self.resources {
                write!(f, "\n- {resource}")?;
            }
        }
        Ok(())
    }
}

fn timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Where the sign-in is requested from: the `domain` and `uri` of the message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiweOrigin {
    pub domain: String,
    pub uri: String,
}

impl SiweOrigin {
    /// Domain is the host (and port), uri is the origin of the page.
    pub fn from_url(url: &Url) -> Self {
        let host = url.host_str().unwrap_or_default();
        let domain = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Self { domain, uri: url.origin().ascii_serialization() }
    }
}

/// Body of `POST /api/siwe/verify`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub message: String,
    pub signature: Bytes,
    pub domain: String,
    pub uri: String,
}

#[derive(Debug, Default, Deserialize)]
struct NonceResponse {
    nonce: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VerifyResponse {
    success: Option<bool>,
    message: Option<String>,
}

/// Client of the backend's `/api/siwe` endpoints.
///
/// Keeps cookies, the server session set by `verify` is sent along with later requests.
#[derive(Clone, Debug)]
pub struct SiweApi {
    client: reqwest::Client,
    base: Url,
}

impl SiweApi {
    pub fn new(base: Url, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().cookie_store(true).timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base.join(path)
    }

    /// `GET /api/siwe/nonce`
    pub async fn nonce(&self) -> Result<String, LoginError> {
        let unavailable = |reason: String| LoginError::NonceUnavailable { reason };
        let url = self.endpoint("/api/siwe/nonce").map_err(|e| unavailable(e.to_string()))?;
        let response = self.client.get(url).send().await.map_err(|e| unavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("server responded with {status}")));
        }
        let body: NonceResponse = response.json().await.unwrap_or_default();
        body.nonce
            .filter(|nonce| !nonce.is_empty())
            .ok_or_else(|| unavailable("response did not contain a nonce".to_string()))
    }

    /// `POST /api/siwe/verify`
    pub async fn verify(&self, request: &VerifyRequest) -> Result<(), LoginError> {
        let failed = |reason: String| LoginError::VerificationFailed { reason };
        let url = self.endpoint("/api/siwe/verify").map_err(|e| failed(e.to_string()))?;
        let response =
            self.client.post(url).json(request).send().await.map_err(|e| failed(e.to_string()))?;
        let status = response.status();
        let body: VerifyResponse = response.json().await.unwrap_or_default();
        if !status.is_success() {
            return Err(failed(body.message.unwrap_or_else(|| format!("server responded with {status}"))));
        }
        if body.success == Some(false) {
            return Err(failed(body.message.unwrap_or_else(|| "verification failed".to_string())));
        }
        Ok(())
    }

    /// `GET /api/siwe/logout`
    pub async fn logout(&self) -> reqwest::Result<()> {
        let url = match self.endpoint("/api/siwe/logout") {
            Ok(url) => url,
            Err(err) => {
                warn!(%err, "invalid logout url");
                return Ok(());
            }
        };
        self.client.get(url).send().await?.error_for_status()?;
        Ok(())
    }
}

/// Runs the Sign-In with Ethereum handshake.
#[derive(Clone, Debug)]
pub struct SiweAuthenticator {
    api: SiweApi,
    config: SiweConfig,
}

impl SiweAuthenticator {
    pub fn new(api: SiweApi, config: SiweConfig) -> Self {
        Self { api, config }
    }

    pub fn api(&self) -> &SiweApi {
        &self.api
    }

    /// Resolves the message origin: the page location, else the configured domain/uri, else
    /// the backend url.
    pub fn origin(&self, location: Option<&Url>) -> SiweOrigin {
        if let Some(location) = location {
            return SiweOrigin::from_url(location);
        }
        let fallback = SiweOrigin::from_url(self.api.base());
        SiweOrigin {
            domain: self.config.domain.clone().unwrap_or(fallback.domain),
            uri: self.config.uri.as_ref().map(|uri| uri.to_string()).unwrap_or(fallback.uri),
        }
    }

    /// Builds the message for `address`.
    pub fn message(&self, origin: &SiweOrigin, address: Address, chain_id: ChainId, nonce: String) -> SiweMessage {
        let issued_at = Utc::now();
        let expiration_time = self
            .config
            .expiration_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| issued_at + chrono::Duration::seconds(secs));
        SiweMessage {
            domain: origin.domain.clone(),
            address,
            statement: Some(self.config.statement.clone()).filter(|s| !s.is_empty()),
            uri: origin.uri.clone(),
            version: "1".to_string(),
            chain_id,
            nonce,
            issued_at,
            expiration_time,
            request_id: None,
            resources: Vec::new(),
        }
    }

    /// Fetches a nonce, has the wallet sign the message and lets the backend verify it.
    ///
    /// The signing address is re-read from the wallet right before the message is built, an
    /// account switch may have raced with the call. `fallback_address` is only used when the
    /// wallet cannot list its accounts.
    pub async fn login(
        &self,
        wallet: &dyn Eip1193Provider,
        fallback_address: Address,
        chain_id: Option<ChainId>,
        location: Option<&Url>,
    ) -> Result<Address, LoginError> {
        let nonce = self.api.nonce().await?;

        let address = match provider::accounts(wallet).await {
            Ok(accounts) => accounts.first().copied().ok_or(LoginError::NotConnected)?,
            Err(err) => {
                debug!(%err, "eth_accounts failed, signing with the session address");
                fallback_address
            }
        };

        let origin = self.origin(location);
        let message = self.message(&origin, address, chain_id.unwrap_or(1), nonce).to_string();
        trace!(%message, "requesting SIWE signature");

        let signature = provider::personal_sign(wallet, address, &message)
            .await
            .map_err(|err| LoginError::SignatureRejected { reason: err.message })?;

        self.api
            .verify(&VerifyRequest { message, signature, domain: origin.domain, uri: origin.uri })
            .await?;
        debug!(%address, "SIWE login verified");
        Ok(address)
    }
}
