//! Position reader: a user's stakes and claim status in one market

use std::sync::Arc;

use ethereum_types::Address;
use rust_decimal::Decimal;
use tracing::{error, warn};
use web3::ethabi::Token;

use crate::abi::ContractAbis;
use crate::amount::from_base_units;
use crate::error::ReadError;
use crate::gateway::ContractGateway;
use crate::types::{Position, Side};

#[derive(Clone)]
pub struct PositionReader {
    gateway: Arc<ContractGateway>,
    abis: Arc<ContractAbis>,
}

impl PositionReader {
    pub fn new(gateway: Arc<ContractGateway>, abis: Arc<ContractAbis>) -> Self {
        Self { gateway, abis }
    }

    pub async fn fetch_stake(&self, market: Address, user: Address) -> Result<Position, ReadError> {
        let abi = &self.abis.market;
        let gw = &self.gateway;
        let yes_args = [Token::Address(user), Token::Uint(Side::Yes.code().into())];
        let no_args = [Token::Address(user), Token::Uint(Side::No.code().into())];
        let user_arg = [Token::Address(user)];

        let (yes, no, can_claim, payout) = futures::try_join!(
            gw.read(market, abi, "stakes", &yes_args),
            gw.read(market, abi, "stakes", &no_args),
            gw.read(market, abi, "canClaim", &user_arg),
            gw.read(market, abi, "getPotentialPayout", &user_arg),
        )?;

        let position = Position::new(
            from_base_units(yes.uint(0)?),
            from_base_units(no.uint(0)?),
            can_claim.boolean(0)?,
            from_base_units(payout.uint(0)?),
        );
        if position.conflicting_sides {
            warn!(
                market = ?market,
                user = ?user,
                yes_stake = %position.yes_stake,
                no_stake = %position.no_stake,
                "User holds stake on both sides, reporting YES"
            );
        }
        Ok(position)
    }

    /// `None` when any of the underlying reads fails
    pub async fn get_stake(&self, market: Address, user: Address) -> Option<Position> {
        match self.fetch_stake(market, user).await {
            Ok(position) => Some(position),
            Err(e) if e.is_transient() => {
                warn!(market = ?market, user = ?user, error = %e, "Failed to fetch position");
                None
            }
            Err(e) => {
                error!(market = ?market, user = ?user, error = %e, "Position reads returned unusable data");
                None
            }
        }
    }

    /// False when the read fails
    pub async fn can_claim(&self, market: Address, user: Address) -> bool {
        let result = self
            .gateway
            .read(market, &self.abis.market, "canClaim", &[Token::Address(user)])
            .await
            .and_then(|out| out.boolean(0));
        result.unwrap_or_else(|e| {
            warn!(market = ?market, user = ?user, error = %e, "Failed to check claim status");
            false
        })
    }

    /// Zero when the read fails
    pub async fn potential_payout(&self, market: Address, user: Address) -> Decimal {
        let result = self
            .gateway
            .read(market, &self.abis.market, "getPotentialPayout", &[Token::Address(user)])
            .await
            .and_then(|out| out.uint(0));
        match result {
            Ok(payout) => from_base_units(payout),
            Err(e) => {
                warn!(market = ?market, user = ?user, error = %e, "Failed to fetch potential payout");
                Decimal::ZERO
            }
        }
    }
}
