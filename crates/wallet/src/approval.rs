//! Signing helpers layered on an established connection: the permission request and the
//! EIP-712 typed approval.

use alloy_dyn_abi::TypedData;
use alloy_primitives::{Address, Bytes, ChainId};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    config::ApprovalConfig,
    error::{ProviderRpcError, SignerError},
    provider::{self, Eip1193Provider, request_as},
};

/// Outcome of [`request_permissions`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionGrant {
    /// `wallet_requestPermissions` succeeded.
    Granted,
    /// The wallet has no permissions API, accounts were requested with `eth_requestAccounts`.
    Degraded,
}

/// Asks the wallet for the `eth_accounts` permission, [EIP-2255](https://eips.ethereum.org/EIPS/eip-2255).
///
/// Falls back to `eth_requestAccounts` on any failure.
pub async fn request_permissions(
    wallet: &dyn Eip1193Provider,
) -> Result<PermissionGrant, SignerError> {
    match wallet.request("wallet_requestPermissions", json!([{ "eth_accounts": {} }])).await {
        Ok(_) => Ok(PermissionGrant::Granted),
        Err(err) => {
            debug!(%err, "wallet_requestPermissions failed, requesting accounts instead");
            provider::request_accounts(wallet).await.map_err(signer_error)?;
            Ok(PermissionGrant::Degraded)
        }
    }
}

/// Input of [`sign_typed_approval`], every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    /// Defaults to the zero address.
    pub verifying_contract: Option<Address>,
    /// Defaults to `approve`.
    pub action: Option<String>,
    /// Defaults to `0`.
    pub nonce: Option<u64>,
}

/// How an approval was signed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureKind {
    TypedData,
    /// The wallet could not sign typed data, the JSON payload was signed as a plain message.
    PersonalSign,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalSignature {
    pub signature: Bytes,
    pub kind: SignatureKind,
}

/// Builds the `Approve` typed data payload.
pub fn approval_typed_data(
    config: &ApprovalConfig,
    chain_id: ChainId,
    request: &ApprovalRequest,
    timestamp: u64,
) -> Value {
    json!({
        "types": {
            "EIP712Domain": [
                { "name": "name", "type": "string" },
                { "name": "version", "type": "string" },
                { "name": "chainId", "type": "uint256" },
                { "name": "verifyingContract", "type": "address" },
            ],
            "Approve": [
                { "name": "action", "type": "string" },
                { "name": "nonce", "type": "uint256" },
                { "name": "timestamp", "type": "uint256" },
            ],
        },
        "primaryType": "Approve",
        "domain": {
            "name": config.domain_name,
            "version": config.version,
            "chainId": chain_id,
            "verifyingContract": request.verifying_contract.unwrap_or(Address::ZERO),
        },
        "message": {
            "action": request.action.as_deref().unwrap_or("approve"),
            "nonce": request.nonce.unwrap_or_default(),
            "timestamp": timestamp,
        },
    })
}

/// Signs an approval with `eth_signTypedData_v4`, degrading to `personal_sign` of the JSON
/// payload when the wallet cannot sign typed data.
///
/// A user rejection of the typed data prompt is final.
pub async fn sign_typed_approval(
    wallet: &dyn Eip1193Provider,
    address: Address,
    chain_id: ChainId,
    config: &ApprovalConfig,
    request: &ApprovalRequest,
) -> Result<ApprovalSignature, SignerError> {
    let timestamp = chrono::Utc::now().timestamp().max(0) as u64;
    let payload = approval_typed_data(config, chain_id, request, timestamp);

    // Reject malformed payloads before prompting the user.
    let typed_data: TypedData = serde_json::from_value(payload.clone())?;
    let hash = typed_data.eip712_signing_hash().map_err(|err| SignerError::Unsupported {
        reason: format!("invalid typed data: {err}"),
    })?;
    trace!(%hash, "requesting typed approval signature");

    let json = serde_json::to_string(&payload)?;
    match request_as::<Bytes>(wallet, "eth_signTypedData_v4", json!([address, json])).await {
        Ok(signature) => Ok(ApprovalSignature { signature, kind: SignatureKind::TypedData }),
        Err(err) if err.is_user_rejection() => Err(SignerError::Rejected),
        Err(err) => {
            debug!(%err, "eth_signTypedData_v4 failed, signing the payload as a message");
            let signature =
                provider::personal_sign(wallet, address, &json).await.map_err(signer_error)?;
            Ok(ApprovalSignature { signature, kind: SignatureKind::PersonalSign })
        }
    }
}

fn signer_error(err: ProviderRpcError) -> SignerError {
    if err.is_user_rejection() {
        SignerError::Rejected
    } else {
        SignerError::Unsupported { reason: err.message }
    }
}
