//! JSON-RPC transport over HTTP using web3

use async_trait::async_trait;
use ethereum_types::{Address, H256};
use tracing::debug;
use web3::{
    signing::SecretKeyRef,
    transports::Http,
    types::{Bytes, CallRequest, TransactionParameters, TransactionReceipt, TransactionRequest},
    Web3,
};

use super::session::Signer;
use super::transport::{
    decode_revert_reason, ChainTransport, OutgoingTransaction, Receipt, ReceiptLog, TransportError,
};
use crate::abi::u256_to_u64;

pub struct Web3Transport {
    web3: Web3<Http>,
}

impl Web3Transport {
    pub fn connect(rpc_url: &str) -> Result<Self, TransportError> {
        let transport = Http::new(rpc_url).map_err(classify)?;
        Ok(Self {
            web3: Web3::new(transport),
        })
    }

    fn call_request(tx: &OutgoingTransaction) -> CallRequest {
        CallRequest {
            from: Some(tx.from),
            to: Some(tx.to),
            value: tx.value,
            data: Some(Bytes(tx.data.clone())),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ChainTransport for Web3Transport {
    async fn call(
        &self,
        from: Option<Address>,
        to: Address,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, TransportError> {
        let request = CallRequest {
            from,
            to: Some(to),
            data: Some(Bytes(data)),
            ..Default::default()
        };
        let result = self.web3.eth().call(request, None).await.map_err(classify)?;
        Ok(result.0)
    }

    async fn send_transaction(
        &self,
        tx: OutgoingTransaction,
        signer: &Signer,
    ) -> Result<H256, TransportError> {
        match signer {
            Signer::NodeManaged => {
                let request = TransactionRequest {
                    from: tx.from,
                    to: Some(tx.to),
                    value: tx.value,
                    data: Some(Bytes(tx.data)),
                    ..Default::default()
                };
                self.web3.eth().send_transaction(request).await.map_err(classify)
            }
            Signer::Local(key) => {
                let gas = self
                    .web3
                    .eth()
                    .estimate_gas(Self::call_request(&tx), None)
                    .await
                    .map_err(classify)?;
                debug!(to = ?tx.to, gas = %gas, "Signing transaction locally");

                let params = TransactionParameters {
                    to: Some(tx.to),
                    gas,
                    value: tx.value.unwrap_or_default(),
                    data: Bytes(tx.data),
                    ..Default::default()
                };
                let signed = self
                    .web3
                    .accounts()
                    .sign_transaction(params, SecretKeyRef::new(key))
                    .await
                    .map_err(classify)?;
                self.web3
                    .eth()
                    .send_raw_transaction(signed.raw_transaction)
                    .await
                    .map_err(classify)
            }
        }
    }

    async fn receipt(&self, hash: H256) -> Result<Option<Receipt>, TransportError> {
        let receipt = self
            .web3
            .eth()
            .transaction_receipt(hash)
            .await
            .map_err(classify)?;
        Ok(receipt.and_then(into_receipt))
    }

    async fn chain_id(&self) -> Result<u64, TransportError> {
        let id = self.web3.eth().chain_id().await.map_err(classify)?;
        u256_to_u64(id).ok_or_else(|| TransportError::Unavailable(format!("chain id {} out of range", id)))
    }
}

/// Receipts without a block number are still pending
fn into_receipt(receipt: TransactionReceipt) -> Option<Receipt> {
    let block_number = receipt.block_number?.as_u64();
    Some(Receipt {
        transaction_hash: receipt.transaction_hash,
        block_number,
        gas_used: receipt.gas_used.unwrap_or_default(),
        success: receipt.status.map(|s| s.as_u64() == 1).unwrap_or(true),
        logs: receipt
            .logs
            .into_iter()
            .map(|log| ReceiptLog {
                address: log.address,
                topics: log.topics,
                data: log.data.0,
            })
            .collect(),
    })
}

/// Node errors that mention a revert, or carry revert data, are contract rejections
fn classify(err: web3::Error) -> TransportError {
    match err {
        web3::Error::Rpc(rpc) => {
            let reason = rpc
                .data
                .as_ref()
                .and_then(|data| data.as_str())
                .and_then(|data| hex::decode(data.trim_start_matches("0x")).ok())
                .and_then(|bytes| decode_revert_reason(&bytes));
            match reason {
                Some(reason) => TransportError::Reverted(reason),
                None if rpc.message.contains("revert") => TransportError::Reverted(rpc.message),
                None => TransportError::Unavailable(rpc.message),
            }
        }
        other => TransportError::Unavailable(other.to_string()),
    }
}
