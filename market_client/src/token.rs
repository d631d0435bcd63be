//! Stablecoin (ERC-20) balance, allowance and transfers

use std::sync::Arc;

use ethereum_types::Address;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use web3::ethabi::Token;

use crate::abi::ContractAbis;
use crate::amount::{from_base_units, to_base_units};
use crate::error::{ReadError, WriteError};
use crate::gateway::{ContractGateway, Receipt, TransactionHandle};

#[derive(Clone)]
pub struct StablecoinToken {
    gateway: Arc<ContractGateway>,
    abis: Arc<ContractAbis>,
    token: Address,
}

impl StablecoinToken {
    pub fn new(gateway: Arc<ContractGateway>, abis: Arc<ContractAbis>, token: Address) -> Self {
        Self { gateway, abis, token }
    }

    pub fn address(&self) -> Address {
        self.token
    }

    pub async fn fetch_balance(&self, owner: Address) -> Result<Decimal, ReadError> {
        let out = self
            .gateway
            .read(self.token, &self.abis.erc20, "balanceOf", &[Token::Address(owner)])
            .await?;
        Ok(from_base_units(out.uint(0)?))
    }

    /// Zero when the read fails
    pub async fn balance_of(&self, owner: Address) -> Decimal {
        self.fetch_balance(owner).await.unwrap_or_else(|e| {
            warn!(owner = ?owner, error = %e, "Failed to fetch token balance");
            Decimal::ZERO
        })
    }

    pub async fn fetch_allowance(&self, owner: Address, spender: Address) -> Result<Decimal, ReadError> {
        let args = [Token::Address(owner), Token::Address(spender)];
        let out = self
            .gateway
            .read(self.token, &self.abis.erc20, "allowance", &args)
            .await?;
        Ok(from_base_units(out.uint(0)?))
    }

    /// Zero when the read fails
    pub async fn allowance(&self, owner: Address, spender: Address) -> Decimal {
        self.fetch_allowance(owner, spender).await.unwrap_or_else(|e| {
            warn!(owner = ?owner, spender = ?spender, error = %e, "Failed to fetch allowance");
            Decimal::ZERO
        })
    }

    /// True when the allowance is short of `amount` or cannot be read
    pub async fn needs_approval(&self, owner: Address, spender: Address, amount: Decimal) -> bool {
        self.allowance(owner, spender).await < amount
    }

    /// Submit `approve(spender, amount)` without waiting for it to be mined
    pub async fn submit_approve(&self, spender: Address, amount: Decimal) -> Result<TransactionHandle, WriteError> {
        let args = [Token::Address(spender), Token::Uint(to_base_units(amount))];
        self.gateway
            .write(self.token, &self.abis.erc20, "approve", &args, None)
            .await
    }

    pub async fn approve(&self, spender: Address, amount: Decimal) -> Result<Receipt, WriteError> {
        let handle = self.submit_approve(spender, amount).await?;
        let receipt = self.gateway.await_confirmation(&handle).await?;
        info!(spender = ?spender, amount = %amount, "Token approval confirmed");
        Ok(receipt)
    }

    pub async fn transfer(&self, to: Address, amount: Decimal) -> Result<Receipt, WriteError> {
        let args = [Token::Address(to), Token::Uint(to_base_units(amount))];
        let receipt = self
            .gateway
            .write_and_confirm(self.token, &self.abis.erc20, "transfer", &args, None)
            .await?;
        info!(to = ?to, amount = %amount, "Token transfer confirmed");
        Ok(receipt)
    }

    /// Approve only when the connected account's allowance is short; `None` if nothing was sent
    pub async fn ensure_approval(&self, spender: Address, amount: Decimal) -> Result<Option<Receipt>, WriteError> {
        let owner = self.gateway.account().ok_or(WriteError::NotConnected)?;
        if !self.needs_approval(owner, spender, amount).await {
            debug!(spender = ?spender, amount = %amount, "Allowance already sufficient");
            return Ok(None);
        }
        self.approve(spender, amount).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ConfirmationPolicy, SigningSession};
    use crate::testing::FakeChain;
    use ethereum_types::U256;
    use std::time::Duration;

    fn usdc() -> Address {
        Address::repeat_byte(0xDC)
    }

    fn owner() -> Address {
        Address::repeat_byte(0x01)
    }

    fn token(session: Option<SigningSession>) -> (Arc<FakeChain>, StablecoinToken) {
        let abis = ContractAbis::load().unwrap();
        let chain = Arc::new(FakeChain::new(abis.clone()));
        let policy = ConfirmationPolicy {
            poll_interval: Duration::from_millis(5),
            timeout: Some(Duration::from_secs(5)),
        };
        let gateway = ContractGateway::new(chain.clone(), session, 84532, policy);
        (chain, StablecoinToken::new(Arc::new(gateway), Arc::new(abis), usdc()))
    }

    #[tokio::test]
    async fn test_balance_scaled() {
        let (chain, token) = token(None);
        chain.stub(usdc(), "balanceOf", vec![Token::Uint(U256::from(1_500_250_000u64))]);
        assert_eq!(token.balance_of(owner()).await, Decimal::new(1_500_25, 2));
    }

    #[tokio::test]
    async fn test_balance_failure_reads_zero() {
        let (chain, token) = token(None);
        chain.fail(usdc(), "balanceOf", "timeout");
        assert_eq!(token.balance_of(owner()).await, Decimal::ZERO);
        assert!(token.fetch_balance(owner()).await.is_err());
    }

    #[tokio::test]
    async fn test_ensure_approval_skips_when_sufficient() {
        let (chain, token) = token(Some(SigningSession::node_managed(owner())));
        chain.stub(usdc(), "allowance", vec![Token::Uint(U256::from(100_000_000u64))]);

        let receipt = token.ensure_approval(Address::repeat_byte(5), Decimal::from(50)).await.unwrap();
        assert!(receipt.is_none());
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_approval_approves_shortfall() {
        let (chain, token) = token(Some(SigningSession::node_managed(owner())));
        chain.stub(usdc(), "allowance", vec![Token::Uint(U256::from(10_000_000u64))]);
        let spender = Address::repeat_byte(5);

        let receipt = token.ensure_approval(spender, Decimal::from(50)).await.unwrap();
        assert!(receipt.is_some());

        let sent = chain.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].function, "approve");
        assert_eq!(
            sent[0].args,
            vec![Token::Address(spender), Token::Uint(U256::from(50_000_000u64))]
        );
    }

    #[tokio::test]
    async fn test_ensure_approval_needs_session() {
        let (chain, token) = token(None);
        let result = token.ensure_approval(Address::repeat_byte(5), Decimal::ONE).await;
        assert_eq!(result.unwrap_err(), WriteError::NotConnected);
        assert!(chain.calls().is_empty());
    }
}
