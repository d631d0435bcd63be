//! Signing session passed explicitly into the gateway

use std::fmt;

use ethereum_types::Address;
use thiserror::Error;
use web3::signing::{Key, SecretKey, SecretKeyRef};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid hex private key: {0}")]
    InvalidHex(String),

    #[error("invalid private key: {0}")]
    InvalidKey(String),
}

/// How transactions for the session get signed
#[derive(Clone)]
pub enum Signer {
    /// Key held by this process
    Local(SecretKey),
    /// Account managed by the RPC endpoint (embedded wallet provider)
    NodeManaged,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signer::Local(_) => write!(f, "Local(<redacted>)"),
            Signer::NodeManaged => write!(f, "NodeManaged"),
        }
    }
}

/// The one active signer of a client
#[derive(Debug, Clone)]
pub struct SigningSession {
    account: Address,
    signer: Signer,
}

impl SigningSession {
    /// Session backed by a local private key; the account is derived from it
    pub fn from_secret_key(key: SecretKey) -> Self {
        let account = SecretKeyRef::new(&key).address();
        Self {
            account,
            signer: Signer::Local(key),
        }
    }

    /// Session whose signing happens on the node for `account`
    pub fn node_managed(account: Address) -> Self {
        Self {
            account,
            signer: Signer::NodeManaged,
        }
    }

    /// Parse a hex private key, with or without `0x`
    pub fn from_private_key_hex(key: &str) -> Result<Self, SessionError> {
        let bytes = hex::decode(key.trim().trim_start_matches("0x"))
            .map_err(|e| SessionError::InvalidHex(e.to_string()))?;
        let key = SecretKey::from_slice(&bytes).map_err(|e| SessionError::InvalidKey(e.to_string()))?;
        Ok(Self::from_secret_key(key))
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }
}
