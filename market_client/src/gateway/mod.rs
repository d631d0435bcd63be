//! Contract gateway: ABI-encoded reads and writes against any contract
//!
//! Reads are stateless and may run concurrently without limit. Writes go
//! through the single signing session handed to the constructor and are
//! serialized by `write_lock` from encoding until the node accepts them.
//! The first write checks that the node serves the configured chain.

pub mod session;
pub mod transport;
pub mod web3_transport;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info};
use web3::ethabi::{Contract, Token};

use crate::abi::Outputs;
use crate::error::{ReadError, WriteError};

pub use session::{SessionError, Signer, SigningSession};
pub use transport::{ChainTransport, OutgoingTransaction, Receipt, ReceiptLog, TransportError};
pub use web3_transport::Web3Transport;

/// How long and how often to poll for receipts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub poll_interval: Duration,
    /// `None` leaves timeouts to the transport
    pub timeout: Option<Duration>,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            timeout: None,
        }
    }
}

/// Submitted, not yet confirmed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionHandle {
    pub hash: H256,
    pub from: Address,
    pub to: Address,
    pub function: String,
    pub data: Vec<u8>,
    pub value: Option<U256>,
    pub submitted_at: DateTime<Utc>,
}

pub struct ContractGateway {
    transport: Arc<dyn ChainTransport>,
    session: Option<SigningSession>,
    write_lock: Mutex<()>,
    policy: ConfirmationPolicy,
    expected_chain_id: u64,
    chain_verified: OnceCell<()>,
}

impl ContractGateway {
    pub fn new(
        transport: Arc<dyn ChainTransport>,
        session: Option<SigningSession>,
        expected_chain_id: u64,
        policy: ConfirmationPolicy,
    ) -> Self {
        Self {
            transport,
            session,
            write_lock: Mutex::new(()),
            policy,
            expected_chain_id,
            chain_verified: OnceCell::new(),
        }
    }

    pub fn session(&self) -> Option<&SigningSession> {
        self.session.as_ref()
    }

    /// Address of the connected account, if any
    pub fn account(&self) -> Option<Address> {
        self.session.as_ref().map(SigningSession::account)
    }

    /// Query a view function
    pub async fn read(
        &self,
        contract: Address,
        abi: &Contract,
        function: &str,
        args: &[Token],
    ) -> Result<Outputs, ReadError> {
        let func = abi
            .function(function)
            .map_err(|e| ReadError::Abi(format!("{}: {}", function, e)))?;
        let data = func
            .encode_input(args)
            .map_err(|e| ReadError::Abi(format!("{}: {}", function, e)))?;

        let raw = self
            .transport
            .call(None, contract, data)
            .await
            .map_err(|e| {
                debug!(contract = ?contract, function, error = %e, "Contract read failed");
                ReadError::from(e)
            })?;

        let tokens = func
            .decode_output(&raw)
            .map_err(|e| ReadError::Decode(format!("{}: {}", function, e)))?;
        Ok(Outputs::new(function, tokens))
    }

    /// Encode and submit a transaction; returns as soon as the node accepts it
    pub async fn write(
        &self,
        contract: Address,
        abi: &Contract,
        function: &str,
        args: &[Token],
        value: Option<U256>,
    ) -> Result<TransactionHandle, WriteError> {
        let session = self.session.as_ref().ok_or(WriteError::NotConnected)?;
        self.chain_verified
            .get_or_try_init(|| self.verify_chain())
            .await
            .map_err(|e| {
                error!(function, error = %e, "Refusing to submit transaction");
                e
            })?;
        let _guard = self.write_lock.lock().await;
        let func = abi
            .function(function)
            .map_err(|e| WriteError::Abi(format!("{}: {}", function, e)))?;
        let data = func
            .encode_input(args)
            .map_err(|e| WriteError::Abi(format!("{}: {}", function, e)))?;

        let tx = OutgoingTransaction {
            from: session.account(),
            to: contract,
            data: data.clone(),
            value,
        };

        let hash = self
            .transport
            .send_transaction(tx, session.signer())
            .await
            .map_err(|e| {
                error!(contract = ?contract, function, error = %e, "Transaction submission failed");
                WriteError::from(e)
            })?;

        info!(contract = ?contract, function, tx_hash = ?hash, "Transaction submitted");
        Ok(TransactionHandle {
            hash,
            from: session.account(),
            to: contract,
            function: function.to_string(),
            data,
            value,
            submitted_at: Utc::now(),
        })
    }

    /// Wait until the transaction is mined; a failed receipt becomes `Reverted`
    pub async fn await_confirmation(&self, handle: &TransactionHandle) -> Result<Receipt, WriteError> {
        let receipt = match self.policy.timeout {
            Some(limit) => tokio::time::timeout(limit, self.poll_receipt(handle.hash))
                .await
                .map_err(|_| WriteError::Timeout(format!("{:?}", handle.hash)))??,
            None => self.poll_receipt(handle.hash).await?,
        };

        if !receipt.success {
            let reason = self.replay_revert_reason(handle).await;
            error!(
                tx_hash = ?handle.hash,
                function = %handle.function,
                reason = %reason,
                "Transaction reverted"
            );
            return Err(WriteError::Reverted(reason));
        }

        info!(
            tx_hash = ?handle.hash,
            function = %handle.function,
            block = receipt.block_number,
            "Transaction confirmed"
        );
        Ok(receipt)
    }

    /// `write` followed by `await_confirmation`
    pub async fn write_and_confirm(
        &self,
        contract: Address,
        abi: &Contract,
        function: &str,
        args: &[Token],
        value: Option<U256>,
    ) -> Result<Receipt, WriteError> {
        let handle = self.write(contract, abi, function, args, value).await?;
        self.await_confirmation(&handle).await
    }

    /// Fail unless the node serves the configured chain.
    ///
    /// `write` runs this once and remembers a match; a mismatch is checked
    /// again on the next write.
    pub async fn verify_chain(&self) -> Result<(), WriteError> {
        let actual = self.transport.chain_id().await?;
        if actual != self.expected_chain_id {
            return Err(WriteError::WrongChain {
                expected: self.expected_chain_id,
                actual,
            });
        }
        Ok(())
    }

    async fn poll_receipt(&self, hash: H256) -> Result<Receipt, WriteError> {
        let mut ticker = tokio::time::interval(self.policy.poll_interval);
        loop {
            ticker.tick().await;
            if let Some(receipt) = self.transport.receipt(hash).await? {
                return Ok(receipt);
            }
            debug!(tx_hash = ?hash, "Transaction pending");
        }
    }

    /// Re-run the call to recover the revert message the receipt does not carry
    async fn replay_revert_reason(&self, handle: &TransactionHandle) -> String {
        match self
            .transport
            .call(Some(handle.from), handle.to, handle.data.clone())
            .await
        {
            Err(TransportError::Reverted(reason)) => reason,
            _ => "execution reverted".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::ContractAbis;
    use crate::testing::FakeChain;

    fn gateway(chain: Arc<FakeChain>, session: Option<SigningSession>) -> ContractGateway {
        let policy = ConfirmationPolicy {
            poll_interval: Duration::from_millis(5),
            timeout: Some(Duration::from_secs(5)),
        };
        ContractGateway::new(chain, session, 84532, policy)
    }

    #[tokio::test]
    async fn test_write_without_session_fails_before_network() {
        let abis = ContractAbis::load().unwrap();
        let chain = Arc::new(FakeChain::new(abis.clone()));
        let gw = gateway(chain.clone(), None);

        let result = gw
            .write(Address::repeat_byte(1), &abis.market, "claim", &[], None)
            .await;

        assert_eq!(result.unwrap_err(), WriteError::NotConnected);
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_function_is_abi_error() {
        let abis = ContractAbis::load().unwrap();
        let chain = Arc::new(FakeChain::new(abis.clone()));
        let gw = gateway(chain, None);

        let result = gw
            .read(Address::repeat_byte(1), &abis.market, "nope", &[])
            .await;
        assert!(matches!(result, Err(ReadError::Abi(_))));
    }

    #[tokio::test]
    async fn test_mined_revert_surfaces_reason() {
        let abis = ContractAbis::load().unwrap();
        let chain = Arc::new(FakeChain::new(abis.clone()));
        let market = Address::repeat_byte(7);
        chain.revert_when_mined(market, "claim", "Nothing to claim");

        let session = SigningSession::node_managed(Address::repeat_byte(9));
        let gw = gateway(chain.clone(), Some(session));

        let result = gw
            .write_and_confirm(market, &abis.market, "claim", &[], None)
            .await;
        assert_eq!(result.unwrap_err(), WriteError::Reverted("Nothing to claim".into()));
        assert_eq!(chain.sent_functions(), vec!["claim".to_string()]);
    }

    #[tokio::test]
    async fn test_verify_chain() {
        let chain = Arc::new(FakeChain::new(ContractAbis::load().unwrap()));
        let gw = gateway(chain.clone(), None);
        assert!(gw.verify_chain().await.is_ok());

        chain.set_chain_id(8453);
        assert_eq!(
            gw.verify_chain().await.unwrap_err(),
            WriteError::WrongChain { expected: 84532, actual: 8453 }
        );
    }

    #[tokio::test]
    async fn test_write_on_wrong_chain_sends_nothing() {
        let abis = ContractAbis::load().unwrap();
        let chain = Arc::new(FakeChain::new(abis.clone()));
        chain.set_chain_id(1);
        let session = SigningSession::node_managed(Address::repeat_byte(9));
        let gw = gateway(chain.clone(), Some(session));

        let result = gw
            .write(Address::repeat_byte(7), &abis.market, "claim", &[], None)
            .await;
        assert_eq!(result.unwrap_err(), WriteError::WrongChain { expected: 84532, actual: 1 });
        assert!(chain.sent().is_empty());

        // Once the node serves the right chain, writes go through
        chain.set_chain_id(84532);
        assert!(gw
            .write(Address::repeat_byte(7), &abis.market, "claim", &[], None)
            .await
            .is_ok());
        assert_eq!(chain.sent_functions(), vec!["claim".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_writes_are_serialized() {
        let abis = ContractAbis::load().unwrap();
        let chain = Arc::new(FakeChain::new(abis.clone()));
        let first = Address::repeat_byte(7);
        let second = Address::repeat_byte(8);
        chain.delay(first, "claim", Duration::from_secs(3));
        chain.delay(second, "claim", Duration::from_secs(3));
        let session = SigningSession::node_managed(Address::repeat_byte(9));
        let gw = gateway(chain.clone(), Some(session));

        let started = tokio::time::Instant::now();
        let (a, b) = tokio::join!(
            gw.write(first, &abis.market, "claim", &[], None),
            gw.write(second, &abis.market, "claim", &[], None),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(started.elapsed() >= Duration::from_secs(6));
        assert_ne!(a.hash, b.hash);
        let sent = chain.sent();
        assert_eq!(sent.iter().map(|tx| tx.to).collect::<Vec<_>>(), vec![first, second]);
        assert!(sent[0].hash < sent[1].hash);
        assert_eq!((a.hash, b.hash), (sent[0].hash, sent[1].hash));
    }
}
