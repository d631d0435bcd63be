//! Read-only projections of on-chain state

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ethereum_types::{Address, H256};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Probability reported for a market with empty pools
pub const EMPTY_MARKET_PROBABILITY: f64 = 50.0;

/// Oracle code meaning "no value yet"
pub const UNRESOLVED_CODE: u8 = 255;

/// Market lifecycle as stored by the market contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketState {
    Pending,
    Active,
    Closed,
    Resolved,
    Cancelled,
}

impl MarketState {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MarketState::Pending),
            1 => Some(MarketState::Active),
            2 => Some(MarketState::Closed),
            3 => Some(MarketState::Resolved),
            4 => Some(MarketState::Cancelled),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            MarketState::Pending => 0,
            MarketState::Active => 1,
            MarketState::Closed => 2,
            MarketState::Resolved => 3,
            MarketState::Cancelled => 4,
        }
    }
}

impl fmt::Display for MarketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketState::Pending => write!(f, "Pending"),
            MarketState::Active => write!(f, "Active"),
            MarketState::Closed => write!(f, "Closed"),
            MarketState::Resolved => write!(f, "Resolved"),
            MarketState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Outcome side of a binary market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn code(&self) -> u8 {
        match self {
            Side::Yes => 0,
            Side::No => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Side::Yes),
            1 => Some(Side::No),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yes" => Ok(Side::Yes),
            "no" => Ok(Side::No),
            other => Err(format!("unknown side '{}'", other)),
        }
    }
}

/// Oracle resolution value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Yes,
    No,
    /// Sentinel 255: nothing resolved yet
    Unresolved,
}

impl Outcome {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            UNRESOLVED_CODE => Some(Outcome::Unresolved),
            other => Side::from_code(other).map(Outcome::from),
        }
    }

    pub fn side(&self) -> Option<Side> {
        match self {
            Outcome::Yes => Some(Side::Yes),
            Outcome::No => Some(Side::No),
            Outcome::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Outcome::Unresolved)
    }
}

impl From<Side> for Outcome {
    fn from(side: Side) -> Self {
        match side {
            Side::Yes => Outcome::Yes,
            Side::No => Outcome::No,
        }
    }
}

/// Denormalized market snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketInfo {
    pub address: Address,
    /// Unix seconds
    pub ends_at: u64,
    pub state: MarketState,
    pub yes_pool: Decimal,
    pub no_pool: Decimal,
    pub total_pool: Decimal,
    /// Percentage in `[0, 100]`
    pub yes_probability: f64,
    pub fee_bp: u16,
    pub max_stake_per_user: Decimal,
}

impl MarketInfo {
    pub fn new(
        address: Address,
        ends_at: u64,
        state: MarketState,
        yes_pool: Decimal,
        no_pool: Decimal,
        fee_bp: u16,
        max_stake_per_user: Decimal,
    ) -> Self {
        let total_pool = yes_pool + no_pool;
        Self {
            address,
            ends_at,
            state,
            yes_pool,
            no_pool,
            total_pool,
            yes_probability: yes_probability(yes_pool, total_pool),
            fee_bp,
            max_stake_per_user,
        }
    }

    pub fn no_probability(&self) -> f64 {
        100.0 - self.yes_probability
    }

    pub fn fee_percent(&self) -> Decimal {
        Decimal::from(self.fee_bp) / Decimal::from(100)
    }

    /// Active and not yet past its end time
    pub fn is_open_for_staking(&self, now: DateTime<Utc>) -> bool {
        self.state == MarketState::Active && (now.timestamp().max(0) as u64) < self.ends_at
    }
}

/// `yes / total * 100`, or 50 for an empty market
pub fn yes_probability(yes_pool: Decimal, total_pool: Decimal) -> f64 {
    if total_pool <= Decimal::ZERO {
        return EMPTY_MARKET_PROBABILITY;
    }
    let ratio = yes_pool / total_pool * Decimal::from(100);
    ratio
        .to_f64()
        .unwrap_or(EMPTY_MARKET_PROBABILITY)
        .clamp(0.0, 100.0)
}

/// A user's stake in one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub yes_stake: Decimal,
    pub no_stake: Decimal,
    pub total_stake: Decimal,
    pub side: Option<Side>,
    /// Stake on both sides at once; `side` then reports YES
    pub conflicting_sides: bool,
    pub can_claim: bool,
    pub potential_payout: Decimal,
}

impl Position {
    pub fn new(yes_stake: Decimal, no_stake: Decimal, can_claim: bool, potential_payout: Decimal) -> Self {
        let has_yes = yes_stake > Decimal::ZERO;
        let has_no = no_stake > Decimal::ZERO;
        let side = if has_yes {
            Some(Side::Yes)
        } else if has_no {
            Some(Side::No)
        } else {
            None
        };

        Self {
            yes_stake,
            no_stake,
            total_stake: yes_stake + no_stake,
            side,
            conflicting_sides: has_yes && has_no,
            can_claim,
            potential_payout,
        }
    }

    pub fn has_position(&self) -> bool {
        self.side.is_some()
    }

    /// What a claim would pay right now
    pub fn claimable_payout(&self) -> Decimal {
        if self.can_claim {
            self.potential_payout
        } else {
            Decimal::ZERO
        }
    }
}

/// Factory-wide totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactoryStatistics {
    pub total_markets: u64,
    pub total_volume: Decimal,
    pub avg_fee: Decimal,
    pub treasury: Address,
}

/// Pending oracle proposal for a market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedResolution {
    pub result: Outcome,
    pub timestamp: u64,
    pub proposer: Address,
    pub challenge_deadline: u64,
    pub challenged: bool,
}

/// Where a market stands in the propose / challenge / finalize sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ResolutionPhase {
    Unproposed,
    ChallengeWindow { closes_at: u64 },
    Challenged,
    AwaitingFinalization,
    Finalized { outcome: Outcome },
}

/// Oracle-side view of one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionStatus {
    pub market_id: H256,
    pub outcome: Outcome,
    pub finalized: bool,
    pub proposal: Option<ProposedResolution>,
    pub phase: ResolutionPhase,
}

impl ResolutionStatus {
    pub fn new(
        market_id: H256,
        outcome: Outcome,
        finalized: bool,
        proposal: Option<ProposedResolution>,
        now: DateTime<Utc>,
    ) -> Self {
        let phase = resolution_phase(outcome, finalized, proposal.as_ref(), now);
        Self {
            market_id,
            outcome,
            finalized,
            proposal,
            phase,
        }
    }
}

fn resolution_phase(
    outcome: Outcome,
    finalized: bool,
    proposal: Option<&ProposedResolution>,
    now: DateTime<Utc>,
) -> ResolutionPhase {
    if finalized {
        return ResolutionPhase::Finalized { outcome };
    }
    match proposal {
        None => ResolutionPhase::Unproposed,
        Some(p) if p.challenged => ResolutionPhase::Challenged,
        Some(p) if (now.timestamp().max(0) as u64) < p.challenge_deadline => {
            ResolutionPhase::ChallengeWindow {
                closes_at: p.challenge_deadline,
            }
        }
        Some(_) => ResolutionPhase::AwaitingFinalization,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    fn market(yes: i64, no: i64) -> MarketInfo {
        MarketInfo::new(
            Address::repeat_byte(1),
            1_900_000_000,
            MarketState::Active,
            dec(yes),
            dec(no),
            200,
            dec(10_000),
        )
    }

    #[test]
    fn test_probability_scenario() {
        let info = market(125_000, 48_000);
        assert_eq!(info.total_pool, dec(173_000));
        assert!((info.yes_probability - 72.25).abs() < 0.01);
        assert!((info.no_probability() - 27.75).abs() < 0.01);
    }

    #[test]
    fn test_empty_market_is_even() {
        let info = market(0, 0);
        assert_eq!(info.yes_probability, 50.0);
    }

    #[test]
    fn test_probability_bounds() {
        assert_eq!(market(10, 0).yes_probability, 100.0);
        assert_eq!(market(0, 10).yes_probability, 0.0);
        for (yes, no) in [(1, 999_999), (3, 7), (999_999, 1)] {
            let p = market(yes, no).yes_probability;
            assert!((0.0..=100.0).contains(&p));
        }
    }

    #[test]
    fn test_fee_percent() {
        assert_eq!(market(0, 0).fee_percent(), Decimal::new(2, 0));
    }

    #[test]
    fn test_open_for_staking() {
        let info = market(1, 1);
        let before = Utc.timestamp_opt(1_800_000_000, 0).unwrap();
        let after = Utc.timestamp_opt(1_900_000_001, 0).unwrap();
        assert!(info.is_open_for_staking(before));
        assert!(!info.is_open_for_staking(after));

        let mut closed = info.clone();
        closed.state = MarketState::Closed;
        assert!(!closed.is_open_for_staking(before));
    }

    #[test]
    fn test_position_side() {
        let yes = Position::new(dec(500), dec(0), false, dec(0));
        assert_eq!(yes.side, Some(Side::Yes));
        assert_eq!(yes.total_stake, dec(500));

        let no = Position::new(dec(0), dec(20), false, dec(0));
        assert_eq!(no.side, Some(Side::No));

        let none = Position::new(dec(0), dec(0), false, dec(0));
        assert_eq!(none.side, None);
        assert!(!none.has_position());
    }

    #[test]
    fn test_both_sides_flagged() {
        let both = Position::new(dec(5), dec(3), false, dec(0));
        assert_eq!(both.side, Some(Side::Yes));
        assert!(both.conflicting_sides);
    }

    #[test]
    fn test_claimable_payout_requires_claimability() {
        let pending = Position::new(dec(5), dec(0), false, dec(9));
        assert_eq!(pending.claimable_payout(), Decimal::ZERO);

        let won = Position::new(dec(5), dec(0), true, dec(9));
        assert_eq!(won.claimable_payout(), dec(9));
    }

    #[test]
    fn test_outcome_codes() {
        assert_eq!(Outcome::from_code(0), Some(Outcome::Yes));
        assert_eq!(Outcome::from_code(1), Some(Outcome::No));
        assert_eq!(Outcome::from_code(255), Some(Outcome::Unresolved));
        assert_eq!(Outcome::from_code(2), None);
        assert!(!Outcome::Unresolved.is_resolved());
        assert_eq!(Outcome::Unresolved.side(), None);
    }

    #[test]
    fn test_market_state_codes() {
        for code in 0..=4u8 {
            assert_eq!(MarketState::from_code(code).unwrap().code(), code);
        }
        assert_eq!(MarketState::from_code(5), None);
    }

    #[test]
    fn test_side_parsing() {
        assert_eq!("YES".parse::<Side>().unwrap(), Side::Yes);
        assert_eq!("no".parse::<Side>().unwrap(), Side::No);
        assert!("maybe".parse::<Side>().is_err());
    }

    #[test]
    fn test_resolution_phases() {
        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let id = H256::repeat_byte(3);
        let proposal = ProposedResolution {
            result: Outcome::Yes,
            timestamp: 900,
            proposer: Address::repeat_byte(2),
            challenge_deadline: 2_000,
            challenged: false,
        };

        let status = ResolutionStatus::new(id, Outcome::Unresolved, false, None, now);
        assert_eq!(status.phase, ResolutionPhase::Unproposed);

        let status = ResolutionStatus::new(id, Outcome::Unresolved, false, Some(proposal.clone()), now);
        assert_eq!(status.phase, ResolutionPhase::ChallengeWindow { closes_at: 2_000 });

        let late = Utc.timestamp_opt(2_500, 0).unwrap();
        let status = ResolutionStatus::new(id, Outcome::Unresolved, false, Some(proposal.clone()), late);
        assert_eq!(status.phase, ResolutionPhase::AwaitingFinalization);

        let challenged = ProposedResolution {
            challenged: true,
            ..proposal.clone()
        };
        let status = ResolutionStatus::new(id, Outcome::Unresolved, false, Some(challenged), now);
        assert_eq!(status.phase, ResolutionPhase::Challenged);

        let status = ResolutionStatus::new(id, Outcome::No, true, Some(proposal), now);
        assert_eq!(status.phase, ResolutionPhase::Finalized { outcome: Outcome::No });
    }
}
