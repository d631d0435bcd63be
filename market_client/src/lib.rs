//! Client view model for an EVM prediction-market platform
//!
//! Reads factory, market, oracle and stablecoin contracts over JSON-RPC and
//! assembles consistent projections (`MarketInfo`, `Position`,
//! `ResolutionStatus`) for a presentation layer. Writes go through one
//! explicit `SigningSession`.

pub mod abi;
pub mod amount;
pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod market_actions;
pub mod market_reader;
pub mod market_view;
pub mod oracle;
pub mod poller;
pub mod portfolio;
pub mod position_reader;
pub mod snapshot;
pub mod staking_flow;
pub mod testing;
pub mod token;
pub mod tracing_logger;
pub mod types;

pub use amount::{from_base_units, parse_amount, to_base_units, USDC_DECIMALS};
pub use client::{ClientError, MarketClient, PolledSnapshots};
pub use config::{ClientConfig, ConfigError};
pub use directory::{CreatedMarket, MarketDirectory, MarketDraft};
pub use error::{AmountError, ReadError, SubmitError, ValidationError, WriteError};
pub use gateway::{ConfirmationPolicy, ContractGateway, Receipt, SessionError, SigningSession, TransactionHandle};
pub use market_view::{MarketSnapshot, MarketView};
pub use portfolio::{Portfolio, PortfolioEntry, PortfolioReader};
pub use staking_flow::{StakeAttempt, StakeFlow, StakeFlowError, StakeRequest, StakeStage};
pub use types::{
    FactoryStatistics, MarketInfo, MarketState, Outcome, Position, ProposedResolution, ResolutionPhase,
    ResolutionStatus, Side,
};
