//! A user's positions across one directory page, with totals for a dashboard

use ethereum_types::Address;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::directory::MarketDirectory;
use crate::position_reader::PositionReader;
use crate::types::Position;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioEntry {
    pub market: Address,
    pub position: Position,
}

/// Non-empty positions in directory order plus their totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub user: Address,
    pub entries: Vec<PortfolioEntry>,
    pub total_staked: Decimal,
    /// Sum of `potential_payout` over all entries, claimable or not
    pub total_potential_payout: Decimal,
    /// Entries that cannot be claimed yet
    pub active_count: usize,
    pub claimable_count: usize,
}

impl Portfolio {
    pub fn new(user: Address, entries: Vec<PortfolioEntry>) -> Self {
        let total_staked = entries.iter().map(|e| e.position.total_stake).sum();
        let total_potential_payout = entries.iter().map(|e| e.position.potential_payout).sum();
        let claimable_count = entries.iter().filter(|e| e.position.can_claim).count();

        Self {
            user,
            active_count: entries.len() - claimable_count,
            claimable_count,
            total_staked,
            total_potential_payout,
            entries,
        }
    }

    pub fn claimable(&self) -> impl Iterator<Item = &PortfolioEntry> {
        self.entries.iter().filter(|e| e.position.can_claim)
    }
}

#[derive(Clone)]
pub struct PortfolioReader {
    directory: MarketDirectory,
    positions: PositionReader,
}

impl PortfolioReader {
    pub fn new(directory: MarketDirectory, positions: PositionReader) -> Self {
        Self {
            directory,
            positions,
        }
    }

    /// Positions of `user` in one directory page.
    ///
    /// Markets are read concurrently. Failed reads and markets where the user
    /// has no stake are left out; the rest keep directory order.
    pub async fn user_positions(&self, user: Address, offset: u64, limit: u64) -> Vec<PortfolioEntry> {
        let markets = self.directory.list_markets(offset, limit).await;
        let positions = join_all(markets.iter().map(|market| self.positions.get_stake(*market, user))).await;

        markets
            .into_iter()
            .zip(positions)
            .filter_map(|(market, position)| match position {
                Some(position) if position.total_stake > Decimal::ZERO => {
                    Some(PortfolioEntry { market, position })
                }
                Some(_) => {
                    debug!(market = ?market, user = ?user, "No stake in market");
                    None
                }
                None => None,
            })
            .collect()
    }

    pub async fn portfolio(&self, user: Address, offset: u64, limit: u64) -> Portfolio {
        let portfolio = Portfolio::new(user, self.user_positions(user, offset, limit).await);
        info!(
            user = ?user,
            positions = portfolio.entries.len(),
            claimable = portfolio.claimable_count,
            total_staked = %portfolio.total_staked,
            "Portfolio loaded"
        );
        portfolio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn entry(byte: u8, yes: i64, no: i64, can_claim: bool, payout: i64) -> PortfolioEntry {
        PortfolioEntry {
            market: Address::repeat_byte(byte),
            position: Position::new(Decimal::from(yes), Decimal::from(no), can_claim, Decimal::from(payout)),
        }
    }

    #[test]
    fn test_totals_and_counts() {
        let portfolio = Portfolio::new(
            Address::repeat_byte(0xAA),
            vec![entry(1, 100, 0, false, 180), entry(2, 0, 40, true, 75), entry(3, 10, 0, true, 0)],
        );

        assert_eq!(portfolio.total_staked, Decimal::from(150));
        assert_eq!(portfolio.total_potential_payout, Decimal::from(255));
        assert_eq!(portfolio.active_count, 1);
        assert_eq!(portfolio.claimable_count, 2);
        let claimable: Vec<Address> = portfolio.claimable().map(|e| e.market).collect();
        assert_eq!(claimable, vec![Address::repeat_byte(2), Address::repeat_byte(3)]);
        assert_eq!(portfolio.entries[1].position.side, Some(Side::No));
    }

    #[test]
    fn test_empty_portfolio() {
        let portfolio = Portfolio::new(Address::zero(), Vec::new());
        assert_eq!(portfolio.total_staked, Decimal::ZERO);
        assert_eq!(portfolio.active_count, 0);
        assert_eq!(portfolio.claimable_count, 0);
    }
}
