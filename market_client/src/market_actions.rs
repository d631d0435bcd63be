//! State-changing calls on a market contract

use std::sync::Arc;

use ethereum_types::Address;
use rust_decimal::Decimal;
use tracing::info;
use web3::ethabi::Token;

use crate::abi::ContractAbis;
use crate::amount::to_base_units;
use crate::error::WriteError;
use crate::gateway::{ContractGateway, Receipt, TransactionHandle};
use crate::types::Side;

#[derive(Clone)]
pub struct MarketActions {
    gateway: Arc<ContractGateway>,
    abis: Arc<ContractAbis>,
}

impl MarketActions {
    pub fn new(gateway: Arc<ContractGateway>, abis: Arc<ContractAbis>) -> Self {
        Self { gateway, abis }
    }

    pub async fn submit_stake(
        &self,
        market: Address,
        side: Side,
        amount: Decimal,
    ) -> Result<TransactionHandle, WriteError> {
        let args = [Token::Uint(side.code().into()), Token::Uint(to_base_units(amount))];
        self.gateway
            .write(market, &self.abis.market, "stake", &args, None)
            .await
    }

    pub async fn stake(&self, market: Address, side: Side, amount: Decimal) -> Result<Receipt, WriteError> {
        let handle = self.submit_stake(market, side, amount).await?;
        self.gateway.await_confirmation(&handle).await
    }

    /// Collect winnings; the contract reverts when there is nothing to claim
    pub async fn claim(&self, market: Address) -> Result<Receipt, WriteError> {
        let receipt = self
            .gateway
            .write_and_confirm(market, &self.abis.market, "claim", &[], None)
            .await?;
        info!(market = ?market, tx_hash = ?receipt.transaction_hash, "Claim confirmed");
        Ok(receipt)
    }
}
