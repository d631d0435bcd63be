//! Two-step stake submission: approve the market to pull the stablecoin, then stake
//!
//! Stages move `Idle -> Approving -> Approved -> Staking -> Confirmed`, or end
//! in `Failed` from either in-flight stage. A failed approval never submits a
//! stake. The flow leaves cached projections alone; callers re-fetch.

use chrono::{DateTime, Utc};
use ethereum_types::{Address, H256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{ValidationError, WriteError};
use crate::gateway::Receipt;
use crate::market_actions::MarketActions;
use crate::token::StablecoinToken;
use crate::types::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeStage {
    Idle,
    Approving,
    Approved,
    Staking,
    Confirmed,
    Failed,
}

impl StakeStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StakeStage::Confirmed | StakeStage::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StakeFlowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("approval failed: {0}")]
    Approval(WriteError),

    #[error("stake failed: {0}")]
    Stake(WriteError),

    #[error("cannot run a stake flow from stage {0:?}")]
    InvalidStage(StakeStage),
}

/// What the user asked to stake, plus the balance last shown to them
#[derive(Debug, Clone, PartialEq)]
pub struct StakeRequest {
    pub market: Address,
    pub side: Option<Side>,
    pub amount: Decimal,
    pub last_known_balance: Decimal,
}

impl StakeRequest {
    /// Entry guard; returns the chosen side
    pub fn validate(&self) -> Result<Side, ValidationError> {
        let side = self.side.ok_or(ValidationError::MissingSide)?;
        if self.amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount);
        }
        if self.amount > self.last_known_balance {
            return Err(ValidationError::InsufficientBalance {
                amount: self.amount,
                balance: self.last_known_balance,
            });
        }
        Ok(side)
    }
}

/// Persistable record of one stake attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeAttempt {
    pub id: Uuid,
    pub market: Address,
    pub side: Side,
    pub amount: Decimal,
    pub stage: StakeStage,
    pub approve_tx: Option<H256>,
    pub stake_tx: Option<H256>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StakeAttempt {
    fn new(market: Address, side: Side, amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            market,
            side,
            amount,
            stage: StakeStage::Idle,
            approve_tx: None,
            stake_tx: None,
            error: None,
            started_at: now,
            updated_at: now,
        }
    }
}

pub struct StakeFlow {
    token: StablecoinToken,
    actions: MarketActions,
    attempt: StakeAttempt,
    stage_tx: watch::Sender<StakeStage>,
}

impl StakeFlow {
    /// Validate the request; nothing touches the chain until `run`
    pub fn new(
        token: StablecoinToken,
        actions: MarketActions,
        request: &StakeRequest,
    ) -> Result<Self, StakeFlowError> {
        let side = request.validate()?;
        let attempt = StakeAttempt::new(request.market, side, request.amount);
        Ok(Self::from_attempt(token, actions, attempt))
    }

    /// Continue an attempt whose approval already confirmed
    pub fn resume(
        token: StablecoinToken,
        actions: MarketActions,
        attempt: StakeAttempt,
    ) -> Result<Self, StakeFlowError> {
        if attempt.stage != StakeStage::Approved {
            return Err(StakeFlowError::InvalidStage(attempt.stage));
        }
        Ok(Self::from_attempt(token, actions, attempt))
    }

    fn from_attempt(token: StablecoinToken, actions: MarketActions, attempt: StakeAttempt) -> Self {
        let (stage_tx, _) = watch::channel(attempt.stage);
        Self {
            token,
            actions,
            attempt,
            stage_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StakeStage> {
        self.stage_tx.subscribe()
    }

    pub fn attempt(&self) -> &StakeAttempt {
        &self.attempt
    }

    pub fn stage(&self) -> StakeStage {
        self.attempt.stage
    }

    fn advance(&mut self, stage: StakeStage) {
        self.attempt.stage = stage;
        self.attempt.updated_at = Utc::now();
        self.stage_tx.send_replace(stage);
    }

    fn fail(&mut self, err: StakeFlowError) -> StakeFlowError {
        error!(attempt = %self.attempt.id, market = ?self.attempt.market, error = %err, "Stake flow failed");
        self.attempt.error = Some(err.to_string());
        self.advance(StakeStage::Failed);
        err
    }

    /// Drive the flow to `Confirmed` or `Failed`; returns the stake receipt
    pub async fn run(&mut self) -> Result<Receipt, StakeFlowError> {
        match self.attempt.stage {
            StakeStage::Idle => self.run_approval().await?,
            StakeStage::Approved => {}
            other => return Err(StakeFlowError::InvalidStage(other)),
        }
        self.run_stake().await
    }

    async fn run_approval(&mut self) -> Result<(), StakeFlowError> {
        self.advance(StakeStage::Approving);
        match self.token.approve(self.attempt.market, self.attempt.amount).await {
            Ok(receipt) => {
                self.attempt.approve_tx = Some(receipt.transaction_hash);
                self.advance(StakeStage::Approved);
                Ok(())
            }
            Err(e) => Err(self.fail(StakeFlowError::Approval(e))),
        }
    }

    async fn run_stake(&mut self) -> Result<Receipt, StakeFlowError> {
        self.advance(StakeStage::Staking);
        let StakeAttempt { market, side, amount, .. } = self.attempt;
        match self.actions.stake(market, side, amount).await {
            Ok(receipt) => {
                self.attempt.stake_tx = Some(receipt.transaction_hash);
                self.advance(StakeStage::Confirmed);
                info!(
                    attempt = %self.attempt.id,
                    market = ?market,
                    side = %side,
                    amount = %amount,
                    "Stake confirmed"
                );
                Ok(receipt)
            }
            Err(e) => Err(self.fail(StakeFlowError::Stake(e))),
        }
    }
}
