//! Market reader: one consistent `MarketInfo` per market contract

use std::sync::Arc;

use ethereum_types::Address;
use tracing::{debug, error, warn};

use crate::abi::ContractAbis;
use crate::amount::from_base_units;
use crate::error::ReadError;
use crate::gateway::ContractGateway;
use crate::types::{MarketInfo, MarketState};

#[derive(Clone)]
pub struct MarketReader {
    gateway: Arc<ContractGateway>,
    abis: Arc<ContractAbis>,
}

impl MarketReader {
    pub fn new(gateway: Arc<ContractGateway>, abis: Arc<ContractAbis>) -> Self {
        Self { gateway, abis }
    }

    /// Fetch the six market fields concurrently; any failure fails the whole read
    pub async fn fetch_info(&self, market: Address) -> Result<MarketInfo, ReadError> {
        let abi = &self.abis.market;
        let gw = &self.gateway;

        let (ends_at, state, yes_pool, no_pool, fee_bp, max_stake) = futures::try_join!(
            gw.read(market, abi, "endsAt", &[]),
            gw.read(market, abi, "state", &[]),
            gw.read(market, abi, "yesPool", &[]),
            gw.read(market, abi, "noPool", &[]),
            gw.read(market, abi, "feeBP", &[]),
            gw.read(market, abi, "maxStakePerUser", &[]),
        )?;

        let state_code = state.u8(0)?;
        let state = MarketState::from_code(state_code)
            .ok_or_else(|| ReadError::Decode(format!("unknown market state {}", state_code)))?;
        let fee_bp = u16::try_from(fee_bp.u64(0)?)
            .map_err(|_| ReadError::Decode("feeBP overflows u16".to_string()))?;

        let info = MarketInfo::new(
            market,
            ends_at.u64(0)?,
            state,
            from_base_units(yes_pool.uint(0)?),
            from_base_units(no_pool.uint(0)?),
            fee_bp,
            from_base_units(max_stake.uint(0)?),
        );
        debug!(market = ?market, state = %info.state, total_pool = %info.total_pool, "Fetched market info");
        Ok(info)
    }

    /// `None` when any of the underlying reads fails
    pub async fn get_info(&self, market: Address) -> Option<MarketInfo> {
        match self.fetch_info(market).await {
            Ok(info) => Some(info),
            Err(e) if e.is_transient() => {
                warn!(market = ?market, error = %e, "Failed to fetch market info");
                None
            }
            Err(e) => {
                error!(market = ?market, error = %e, "Market returned unusable data");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ConfirmationPolicy;
    use crate::testing::{FakeChain, MarketFixture};
    use ethereum_types::U256;
    use rust_decimal::Decimal;
    use web3::ethabi::Token;

    fn reader() -> (Arc<FakeChain>, MarketReader) {
        let abis = ContractAbis::load().unwrap();
        let chain = Arc::new(FakeChain::new(abis.clone()));
        let gateway = ContractGateway::new(chain.clone(), None, 84532, ConfirmationPolicy::default());
        (chain, MarketReader::new(Arc::new(gateway), Arc::new(abis)))
    }

    #[tokio::test]
    async fn test_fetch_info_assembles_fields() {
        let (chain, reader) = reader();
        let market = Address::repeat_byte(0x42);
        chain.stub_market(
            market,
            &MarketFixture {
                yes_pool: U256::from(125_000_000_000u64),
                no_pool: U256::from(48_000_000_000u64),
                ..Default::default()
            },
        );

        let info = reader.fetch_info(market).await.unwrap();
        assert_eq!(info.address, market);
        assert_eq!(info.state, MarketState::Active);
        assert_eq!(info.total_pool, Decimal::from(173_000));
        assert_eq!(info.fee_bp, 200);
        assert_eq!(info.max_stake_per_user, Decimal::from(10_000));
        assert!((info.yes_probability - 72.25).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_one_failed_read_yields_none() {
        let (chain, reader) = reader();
        let market = Address::repeat_byte(0x42);
        chain.stub_market(market, &MarketFixture::default());
        chain.fail(market, "feeBP", "connection reset");

        assert!(reader.get_info(market).await.is_none());
        assert!(matches!(reader.fetch_info(market).await, Err(ReadError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_unknown_state_is_decode_error() {
        let (chain, reader) = reader();
        let market = Address::repeat_byte(0x42);
        chain.stub_market(market, &MarketFixture::default());
        chain.stub(market, "state", vec![Token::Uint(U256::from(9u8))]);

        assert!(matches!(reader.fetch_info(market).await, Err(ReadError::Decode(_))));
        assert!(reader.get_info(market).await.is_none());
    }
}
