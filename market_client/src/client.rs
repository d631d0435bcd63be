//! Wires configuration, gateway and the per-contract readers together

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};

use crate::abi::ContractAbis;
use crate::config::{ClientConfig, ConfigError};
use crate::directory::MarketDirectory;
use crate::gateway::{ChainTransport, ContractGateway, SigningSession, TransportError, Web3Transport};
use crate::market_actions::MarketActions;
use crate::market_reader::MarketReader;
use crate::market_view::MarketView;
use crate::oracle::OracleReader;
use crate::poller::Poller;
use crate::portfolio::PortfolioReader;
use crate::position_reader::PositionReader;
use crate::snapshot::SnapshotSlot;
use crate::staking_flow::{StakeAttempt, StakeFlow, StakeFlowError, StakeRequest};
use crate::token::StablecoinToken;
use crate::types::FactoryStatistics;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to load contract ABIs: {0}")]
    Abi(String),

    #[error("failed to connect: {0}")]
    Transport(#[from] TransportError),
}

/// Slots kept fresh by `MarketClient::start_polling`
#[derive(Clone)]
pub struct PolledSnapshots {
    /// Stays empty without a connected account
    pub balance: Arc<SnapshotSlot<Decimal>>,
    pub statistics: Arc<SnapshotSlot<FactoryStatistics>>,
}

#[derive(Clone)]
pub struct MarketClient {
    config: ClientConfig,
    gateway: Arc<ContractGateway>,
    directory: MarketDirectory,
    markets: MarketReader,
    positions: PositionReader,
    oracle: OracleReader,
    token: StablecoinToken,
    actions: MarketActions,
}

impl MarketClient {
    /// Validate `config`, then connect over HTTP with the configured signer
    pub fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let session = config.signing_session()?;
        let transport = Arc::new(Web3Transport::connect(&config.chain.rpc_url)?);
        info!(
            rpc_url = %config.chain.rpc_url,
            chain_id = config.chain.chain_id,
            account = ?session.as_ref().map(SigningSession::account),
            "Market client connected"
        );
        Self::with_transport(config, transport, session)
    }

    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn ChainTransport>,
        session: Option<SigningSession>,
    ) -> Result<Self, ClientError> {
        let abis = Arc::new(ContractAbis::load().map_err(|e| ClientError::Abi(e.to_string()))?);
        let gateway = Arc::new(ContractGateway::new(
            transport,
            session,
            config.chain.chain_id,
            config.confirmation_policy(),
        ));

        Ok(Self {
            directory: MarketDirectory::new(gateway.clone(), abis.clone(), config.contracts.factory),
            markets: MarketReader::new(gateway.clone(), abis.clone()),
            positions: PositionReader::new(gateway.clone(), abis.clone()),
            oracle: OracleReader::new(gateway.clone(), abis.clone(), config.contracts.oracle),
            token: StablecoinToken::new(gateway.clone(), abis.clone(), config.contracts.usdc),
            actions: MarketActions::new(gateway.clone(), abis),
            gateway,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<ContractGateway> {
        &self.gateway
    }

    pub fn directory(&self) -> &MarketDirectory {
        &self.directory
    }

    pub fn markets(&self) -> &MarketReader {
        &self.markets
    }

    pub fn positions(&self) -> &PositionReader {
        &self.positions
    }

    pub fn oracle(&self) -> &OracleReader {
        &self.oracle
    }

    pub fn token(&self) -> &StablecoinToken {
        &self.token
    }

    pub fn actions(&self) -> &MarketActions {
        &self.actions
    }

    pub fn portfolio(&self) -> PortfolioReader {
        PortfolioReader::new(self.directory.clone(), self.positions.clone())
    }

    pub fn market_view(&self) -> MarketView {
        MarketView::new(self.markets.clone(), self.positions.clone(), self.oracle.clone())
    }

    pub fn stake_flow(&self, request: &StakeRequest) -> Result<StakeFlow, StakeFlowError> {
        StakeFlow::new(self.token.clone(), self.actions.clone(), request)
    }

    pub fn resume_stake(&self, attempt: StakeAttempt) -> Result<StakeFlow, StakeFlowError> {
        StakeFlow::resume(self.token.clone(), self.actions.clone(), attempt)
    }

    /// Register balance and statistics refresh loops on `poller`
    pub fn start_polling(&self, poller: &mut Poller) -> PolledSnapshots {
        let snapshots = PolledSnapshots {
            balance: Arc::new(SnapshotSlot::new()),
            statistics: Arc::new(SnapshotSlot::new()),
        };

        match self.gateway.account() {
            Some(owner) => {
                let token = self.token.clone();
                poller.spawn(
                    "balance",
                    self.config.polling.balance_interval,
                    snapshots.balance.clone(),
                    move || {
                        let token = token.clone();
                        async move {
                            token
                                .fetch_balance(owner)
                                .await
                                .map_err(|e| warn!(owner = ?owner, error = %e, "Balance refresh failed"))
                                .ok()
                        }
                    },
                );
            }
            None => info!("No account connected, balance polling disabled"),
        }

        let directory = self.directory.clone();
        poller.spawn(
            "statistics",
            self.config.polling.statistics_interval,
            snapshots.statistics.clone(),
            move || {
                let directory = directory.clone();
                async move { directory.statistics().await }
            },
        );

        snapshots
    }
}
