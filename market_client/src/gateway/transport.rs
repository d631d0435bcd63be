//! Chain transport seam
//!
//! The gateway only needs four JSON-RPC capabilities. Keeping them behind a
//! trait lets the readers run against the in-memory chain in `testing`.

use async_trait::async_trait;
use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use web3::ethabi::{self, ParamType, Token};

use super::session::Signer;
use crate::error::{ReadError, WriteError};

/// Selector of the Solidity `Error(string)` revert payload
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Reverted(String),
}

impl From<TransportError> for ReadError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unavailable(msg) => ReadError::Unavailable(msg),
            TransportError::Reverted(msg) => ReadError::Reverted(msg),
        }
    }
}

impl From<TransportError> for WriteError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unavailable(msg) => WriteError::Unavailable(msg),
            TransportError::Reverted(msg) => WriteError::Reverted(msg),
        }
    }
}

/// A signed-or-to-be-signed contract call
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingTransaction {
    pub from: Address,
    pub to: Address,
    pub data: Vec<u8>,
    pub value: Option<U256>,
}

/// Log entry of a mined transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLog {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Vec<u8>,
}

/// Mined transaction receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: H256,
    pub block_number: u64,
    pub gas_used: U256,
    pub success: bool,
    pub logs: Vec<ReceiptLog>,
}

#[async_trait]
pub trait ChainTransport: Send + Sync {
    /// `eth_call` against the latest block
    async fn call(
        &self,
        from: Option<Address>,
        to: Address,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, TransportError>;

    /// Sign (locally or on the node) and broadcast
    async fn send_transaction(
        &self,
        tx: OutgoingTransaction,
        signer: &Signer,
    ) -> Result<H256, TransportError>;

    /// `None` while the transaction is still pending
    async fn receipt(&self, hash: H256) -> Result<Option<Receipt>, TransportError>;

    async fn chain_id(&self) -> Result<u64, TransportError>;
}

/// Extract the message of an `Error(string)` revert payload
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < 4 || data[..4] != ERROR_STRING_SELECTOR {
        return None;
    }
    match ethabi::decode(&[ParamType::String], &data[4..]).ok()?.pop()? {
        Token::String(reason) => Some(reason),
        _ => None,
    }
}

/// Build an `Error(string)` revert payload
pub fn encode_revert_reason(reason: &str) -> Vec<u8> {
    let mut data = ERROR_STRING_SELECTOR.to_vec();
    data.extend(ethabi::encode(&[Token::String(reason.to_string())]));
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revert_reason_round_trip() {
        let data = encode_revert_reason("Market not active");
        assert_eq!(decode_revert_reason(&data).as_deref(), Some("Market not active"));
    }

    #[test]
    fn test_non_error_payload_has_no_reason() {
        assert_eq!(decode_revert_reason(&[]), None);
        assert_eq!(decode_revert_reason(&[0x4e, 0x48, 0x7b, 0x71, 0, 0]), None);
    }
}
