//! Combined market / position / resolution view for one market page

use chrono::{DateTime, Utc};
use ethereum_types::{Address, H256};
use serde::{Deserialize, Serialize};

use crate::market_reader::MarketReader;
use crate::oracle::OracleReader;
use crate::position_reader::PositionReader;
use crate::types::{MarketInfo, Position, ResolutionStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub market: MarketInfo,
    pub position: Option<Position>,
    pub resolution: Option<ResolutionStatus>,
    pub open_for_staking: bool,
    pub taken_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct MarketView {
    markets: MarketReader,
    positions: PositionReader,
    oracle: OracleReader,
}

impl MarketView {
    pub fn new(markets: MarketReader, positions: PositionReader, oracle: OracleReader) -> Self {
        Self {
            markets,
            positions,
            oracle,
        }
    }

    /// `None` only when the market itself cannot be read; the sub-views fail independently
    pub async fn snapshot(
        &self,
        market: Address,
        market_id: Option<H256>,
        user: Option<Address>,
        now: DateTime<Utc>,
    ) -> Option<MarketSnapshot> {
        let position = async {
            match user {
                Some(user) => self.positions.get_stake(market, user).await,
                None => None,
            }
        };
        let resolution = async {
            match market_id {
                Some(id) => self.oracle.resolution_status(id, now).await,
                None => None,
            }
        };

        let (info, position, resolution) =
            futures::join!(self.markets.get_info(market), position, resolution);
        let info = info?;

        Some(MarketSnapshot {
            open_for_staking: info.is_open_for_staking(now),
            market: info,
            position,
            resolution,
            taken_at: now,
        })
    }
}
