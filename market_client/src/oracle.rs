//! Oracle view: resolution outcome, proposal and vote state per market id

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ethereum_types::{Address, H256, U256};
use tracing::{info, warn};
use web3::ethabi::Token;

use crate::abi::{bytes32, ContractAbis, Outputs};
use crate::error::{ReadError, WriteError};
use crate::gateway::{ContractGateway, Receipt};
use crate::types::{Outcome, ProposedResolution, ResolutionStatus, Side, UNRESOLVED_CODE};

#[derive(Clone)]
pub struct OracleReader {
    gateway: Arc<ContractGateway>,
    abis: Arc<ContractAbis>,
    oracle: Address,
}

impl OracleReader {
    pub fn new(gateway: Arc<ContractGateway>, abis: Arc<ContractAbis>, oracle: Address) -> Self {
        Self { gateway, abis, oracle }
    }

    async fn read_oracle(&self, function: &str, args: &[Token]) -> Result<Outputs, ReadError> {
        self.gateway
            .read(self.oracle, &self.abis.oracle, function, args)
            .await
    }

    async fn write_oracle(&self, function: &str, args: &[Token]) -> Result<Receipt, WriteError> {
        let receipt = self
            .gateway
            .write_and_confirm(self.oracle, &self.abis.oracle, function, args, None)
            .await?;
        info!(function, tx_hash = ?receipt.transaction_hash, "Oracle transaction confirmed");
        Ok(receipt)
    }

    pub async fn fetch_resolution(&self, market_id: H256) -> Result<Outcome, ReadError> {
        let code = self
            .read_oracle("getResolution", &[bytes32(market_id)])
            .await?
            .u8(0)?;
        Outcome::from_code(code).ok_or_else(|| ReadError::Decode(format!("unknown outcome code {}", code)))
    }

    /// `Some(Outcome::Unresolved)` while nothing is resolved; `None` only on failure
    pub async fn resolution(&self, market_id: H256) -> Option<Outcome> {
        self.fetch_resolution(market_id)
            .await
            .map_err(|e| warn!(market_id = ?market_id, error = %e, "Failed to fetch resolution"))
            .ok()
    }

    pub async fn fetch_is_finalized(&self, market_id: H256) -> Result<bool, ReadError> {
        self.read_oracle("isResolutionFinalized", &[bytes32(market_id)])
            .await?
            .boolean(0)
    }

    /// False when the read fails
    pub async fn is_finalized(&self, market_id: H256) -> bool {
        self.fetch_is_finalized(market_id).await.unwrap_or_else(|e| {
            warn!(market_id = ?market_id, error = %e, "Failed to check finalization");
            false
        })
    }

    /// `Ok(None)` when no proposal has been made (zero proposer)
    pub async fn fetch_proposal(&self, market_id: H256) -> Result<Option<ProposedResolution>, ReadError> {
        let out = self
            .read_oracle("proposedResolutions", &[bytes32(market_id)])
            .await?;

        let proposer = out.address(2)?;
        if proposer.is_zero() {
            return Ok(None);
        }
        let code = out.u8(0)?;
        let result = Outcome::from_code(code)
            .ok_or_else(|| ReadError::Decode(format!("unknown proposed outcome {}", code)))?;

        Ok(Some(ProposedResolution {
            result,
            timestamp: out.u64(1)?,
            proposer,
            challenge_deadline: out.u64(3)?,
            challenged: out.boolean(4)?,
        }))
    }

    pub async fn proposal(&self, market_id: H256) -> Option<ProposedResolution> {
        self.fetch_proposal(market_id).await.unwrap_or_else(|e| {
            warn!(market_id = ?market_id, error = %e, "Failed to fetch proposed resolution");
            None
        })
    }

    /// Zero when the read fails
    pub async fn vote_count(&self, market_id: H256, side: Side) -> u64 {
        let args = [bytes32(market_id), Token::Uint(side.code().into())];
        let result = self
            .read_oracle("voteCount", &args)
            .await
            .and_then(|out| out.u64(0));
        result.unwrap_or_else(|e| {
            warn!(market_id = ?market_id, side = %side, error = %e, "Failed to fetch vote count");
            0
        })
    }

    /// A stored vote of 255 means the voter has not voted
    pub async fn has_voted(&self, market_id: H256, voter: Address) -> bool {
        let args = [bytes32(market_id), Token::Address(voter)];
        let result = self
            .read_oracle("resolutionVotes", &args)
            .await
            .and_then(|out| out.u8(0));
        match result {
            Ok(vote) => vote != UNRESOLVED_CODE,
            Err(e) => {
                warn!(market_id = ?market_id, voter = ?voter, error = %e, "Failed to check vote status");
                false
            }
        }
    }

    pub async fn fetch_resolution_status(
        &self,
        market_id: H256,
        now: DateTime<Utc>,
    ) -> Result<ResolutionStatus, ReadError> {
        let (outcome, finalized, proposal) = futures::try_join!(
            self.fetch_resolution(market_id),
            self.fetch_is_finalized(market_id),
            self.fetch_proposal(market_id),
        )?;
        Ok(ResolutionStatus::new(market_id, outcome, finalized, proposal, now))
    }

    /// All-or-nothing view of outcome, finalization and proposal
    pub async fn resolution_status(&self, market_id: H256, now: DateTime<Utc>) -> Option<ResolutionStatus> {
        match self.fetch_resolution_status(market_id, now).await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(market_id = ?market_id, error = %e, "Failed to fetch resolution status");
                None
            }
        }
    }

    pub async fn submit_resolution(
        &self,
        market_id: H256,
        result: Side,
        timestamp: u64,
        nonce: u64,
        signature: Vec<u8>,
    ) -> Result<Receipt, WriteError> {
        let args = [
            bytes32(market_id),
            Token::Uint(result.code().into()),
            Token::Uint(U256::from(timestamp)),
            Token::Uint(U256::from(nonce)),
            Token::Bytes(signature),
        ];
        self.write_oracle("submitResolution", &args).await
    }

    pub async fn challenge_resolution(&self, market_id: H256, reason: &str) -> Result<Receipt, WriteError> {
        let args = [bytes32(market_id), Token::String(reason.to_string())];
        self.write_oracle("challengeResolution", &args).await
    }

    pub async fn finalize_resolution(&self, market_id: H256) -> Result<Receipt, WriteError> {
        self.write_oracle("finalizeResolution", &[bytes32(market_id)]).await
    }

    pub async fn admin_resolve(&self, market_id: H256, result: Side) -> Result<Receipt, WriteError> {
        let args = [bytes32(market_id), Token::Uint(result.code().into())];
        self.write_oracle("adminResolve", &args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ConfirmationPolicy, SigningSession};
    use crate::testing::FakeChain;
    use crate::types::ResolutionPhase;
    use chrono::TimeZone;
    use std::time::Duration;

    fn oracle_address() -> Address {
        Address::repeat_byte(0x0C)
    }

    fn oracle(session: Option<SigningSession>) -> (Arc<FakeChain>, OracleReader) {
        let abis = ContractAbis::load().unwrap();
        let chain = Arc::new(FakeChain::new(abis.clone()));
        let policy = ConfirmationPolicy {
            poll_interval: Duration::from_millis(5),
            timeout: Some(Duration::from_secs(5)),
        };
        let gateway = ContractGateway::new(chain.clone(), session, 84532, policy);
        (chain, OracleReader::new(Arc::new(gateway), Arc::new(abis), oracle_address()))
    }

    fn stub_no_proposal(chain: &FakeChain) {
        chain.stub(
            oracle_address(),
            "proposedResolutions",
            vec![
                Token::Uint(U256::zero()),
                Token::Uint(U256::zero()),
                Token::Address(Address::zero()),
                Token::Uint(U256::zero()),
                Token::Bool(false),
            ],
        );
    }

    #[tokio::test]
    async fn test_sentinel_means_unresolved() {
        let (chain, oracle) = oracle(None);
        chain.stub(oracle_address(), "getResolution", vec![Token::Uint(U256::from(255u64))]);

        let outcome = oracle.resolution(H256::repeat_byte(1)).await;
        assert_eq!(outcome, Some(Outcome::Unresolved));
        assert_eq!(outcome.and_then(|o| o.side()), None);
    }

    #[tokio::test]
    async fn test_unknown_outcome_code_is_failure() {
        let (chain, oracle) = oracle(None);
        chain.stub(oracle_address(), "getResolution", vec![Token::Uint(U256::from(7u64))]);
        assert_eq!(oracle.resolution(H256::repeat_byte(1)).await, None);
    }

    #[tokio::test]
    async fn test_status_unproposed() {
        let (chain, oracle) = oracle(None);
        chain.stub(oracle_address(), "getResolution", vec![Token::Uint(U256::from(255u64))]);
        chain.stub(oracle_address(), "isResolutionFinalized", vec![Token::Bool(false)]);
        stub_no_proposal(&chain);

        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let status = oracle.resolution_status(H256::repeat_byte(1), now).await.unwrap();
        assert_eq!(status.phase, ResolutionPhase::Unproposed);
        assert!(status.proposal.is_none());
    }

    #[tokio::test]
    async fn test_status_finalized() {
        let (chain, oracle) = oracle(None);
        chain.stub(oracle_address(), "getResolution", vec![Token::Uint(U256::from(1u64))]);
        chain.stub(oracle_address(), "isResolutionFinalized", vec![Token::Bool(true)]);
        chain.stub(
            oracle_address(),
            "proposedResolutions",
            vec![
                Token::Uint(U256::from(1u64)),
                Token::Uint(U256::from(500u64)),
                Token::Address(Address::repeat_byte(3)),
                Token::Uint(U256::from(800u64)),
                Token::Bool(false),
            ],
        );

        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let status = oracle.resolution_status(H256::repeat_byte(1), now).await.unwrap();
        assert_eq!(status.phase, ResolutionPhase::Finalized { outcome: Outcome::No });
        assert_eq!(status.proposal.unwrap().proposer, Address::repeat_byte(3));
    }

    #[tokio::test]
    async fn test_status_requires_every_read() {
        let (chain, oracle) = oracle(None);
        chain.stub(oracle_address(), "getResolution", vec![Token::Uint(U256::from(255u64))]);
        chain.fail(oracle_address(), "isResolutionFinalized", "timeout");
        stub_no_proposal(&chain);

        assert!(oracle.resolution_status(H256::repeat_byte(1), Utc::now()).await.is_none());
    }

    #[tokio::test]
    async fn test_has_voted() {
        let (chain, oracle) = oracle(None);
        let voter = Address::repeat_byte(4);
        chain.stub(oracle_address(), "resolutionVotes", vec![Token::Uint(U256::from(255u64))]);
        assert!(!oracle.has_voted(H256::repeat_byte(1), voter).await);

        chain.stub(oracle_address(), "resolutionVotes", vec![Token::Uint(U256::zero())]);
        assert!(oracle.has_voted(H256::repeat_byte(1), voter).await);
    }

    #[tokio::test]
    async fn test_finalize_submits() {
        let (chain, oracle) = oracle(Some(SigningSession::node_managed(Address::repeat_byte(9))));
        let receipt = oracle.finalize_resolution(H256::repeat_byte(1)).await.unwrap();

        assert!(receipt.success);
        let sent = chain.sent();
        assert_eq!(sent[0].function, "finalizeResolution");
        assert_eq!(sent[0].args, vec![bytes32(H256::repeat_byte(1))]);
    }

    #[tokio::test]
    async fn test_challenge_revert_surfaces() {
        let (chain, oracle) = oracle(Some(SigningSession::node_managed(Address::repeat_byte(9))));
        chain.revert_when_mined(oracle_address(), "challengeResolution", "Challenge period over");

        let result = oracle.challenge_resolution(H256::repeat_byte(1), "wrong source").await;
        assert_eq!(result.unwrap_err(), WriteError::Reverted("Challenge period over".into()));
    }
}
