//! Market directory: paginated factory listing, factory statistics and market creation
//!
//! Reads here degrade to empty results when the factory cannot be reached;
//! the detail fan-out drops individual markets that fail and keeps the
//! directory order of the rest.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ethereum_types::{Address, H256, U256};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use web3::ethabi::{Event, RawLog, Token};

use crate::abi::{bytes32, ContractAbis, Outputs};
use crate::amount::{from_base_units, to_base_units};
use crate::error::{ReadError, SubmitError, ValidationError};
use crate::gateway::{ContractGateway, Receipt, ReceiptLog};
use crate::market_reader::MarketReader;
use crate::types::{FactoryStatistics, MarketInfo};

/// Largest fee the factory accepts, in basis points
pub const MAX_FEE_BP: u16 = 10_000;

/// Parameters of a fully specified market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDraft {
    pub question: String,
    pub category: String,
    pub sources: Vec<String>,
    pub ends_at: DateTime<Utc>,
    /// `None` keeps the factory default
    pub fee_bp: Option<u16>,
    pub max_stake_per_user: Option<Decimal>,
    pub max_total_pool: Option<Decimal>,
}

impl MarketDraft {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        validate_market_fields(&self.question, &self.category, self.ends_at, now)?;
        match self.fee_bp {
            Some(fee) if fee > MAX_FEE_BP => Err(ValidationError::FeeTooHigh(fee)),
            _ => Ok(()),
        }
    }
}

fn validate_market_fields(
    question: &str,
    category: &str,
    ends_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    if question.trim().is_empty() {
        return Err(ValidationError::EmptyQuestion);
    }
    if category.trim().is_empty() {
        return Err(ValidationError::EmptyCategory);
    }
    if ends_at <= now {
        return Err(ValidationError::EndTimeInPast {
            ends_at: ends_at.timestamp(),
        });
    }
    Ok(())
}

fn unix_seconds(at: DateTime<Utc>) -> U256 {
    U256::from(at.timestamp().max(0) as u64)
}

/// Result of a confirmed market creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedMarket {
    pub receipt: Receipt,
    /// Taken from the `MarketCreated` event; `None` if the receipt carries none
    pub market: Option<Address>,
    pub market_id: Option<H256>,
}

#[derive(Clone)]
pub struct MarketDirectory {
    gateway: Arc<ContractGateway>,
    abis: Arc<ContractAbis>,
    factory: Address,
    markets: MarketReader,
}

impl MarketDirectory {
    pub fn new(gateway: Arc<ContractGateway>, abis: Arc<ContractAbis>, factory: Address) -> Self {
        let markets = MarketReader::new(gateway.clone(), abis.clone());
        Self {
            gateway,
            abis,
            factory,
            markets,
        }
    }

    pub fn factory(&self) -> Address {
        self.factory
    }

    async fn read_factory(
        &self,
        function: &str,
        args: &[Token],
    ) -> Result<Outputs, ReadError> {
        self.gateway
            .read(self.factory, &self.abis.factory, function, args)
            .await
    }

    /// Market addresses in directory order; empty on failure
    pub async fn list_markets(&self, offset: u64, limit: u64) -> Vec<Address> {
        let args = [Token::Uint(offset.into()), Token::Uint(limit.into())];
        let result = self
            .read_factory("getAllMarkets", &args)
            .await
            .and_then(|out| out.addresses(0));
        result.unwrap_or_else(|e| {
            warn!(offset, limit, error = %e, "Failed to list markets");
            Vec::new()
        })
    }

    /// Zero on failure
    pub async fn total_count(&self) -> u64 {
        let result = self
            .read_factory("getTotalMarkets", &[])
            .await
            .and_then(|out| out.u64(0));
        result.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to fetch total market count");
            0
        })
    }

    /// Page of markets with details fetched concurrently; failed markets are skipped
    pub async fn list_markets_with_details(&self, offset: u64, limit: u64) -> Vec<MarketInfo> {
        let addresses = self.list_markets(offset, limit).await;
        if addresses.is_empty() {
            return Vec::new();
        }

        let requested = addresses.len();
        let details = join_all(addresses.into_iter().map(|market| self.markets.get_info(market))).await;
        let markets: Vec<MarketInfo> = details.into_iter().flatten().collect();

        if markets.len() < requested {
            warn!(
                requested,
                loaded = markets.len(),
                "Some markets failed to load and were skipped"
            );
        }
        markets
    }

    pub async fn statistics(&self) -> Option<FactoryStatistics> {
        let result = self.read_factory("getStatistics", &[]).await.and_then(|out| {
            Ok(FactoryStatistics {
                total_markets: out.u64(0)?,
                total_volume: from_base_units(out.uint(1)?),
                avg_fee: from_base_units(out.uint(2)?),
                treasury: out.address(3)?,
            })
        });
        match result {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "Failed to fetch factory statistics");
                None
            }
        }
    }

    /// Market address registered under `market_id`; `None` for unknown ids or failure
    pub async fn market_by_id(&self, market_id: H256) -> Option<Address> {
        let result = self
            .read_factory("getMarket", &[bytes32(market_id)])
            .await
            .and_then(|out| out.address(0));
        match result {
            Ok(address) if address.is_zero() => None,
            Ok(address) => Some(address),
            Err(e) => {
                warn!(market_id = ?market_id, error = %e, "Failed to look up market by id");
                None
            }
        }
    }

    pub async fn category_markets(&self, category: &str) -> Vec<H256> {
        let result = self
            .read_factory("getCategoryMarkets", &[Token::String(category.to_string())])
            .await
            .and_then(|out| out.bytes32_array(0));
        result.unwrap_or_else(|e| {
            warn!(category, error = %e, "Failed to fetch category markets");
            Vec::new()
        })
    }

    pub async fn creator_markets(&self, creator: Address) -> Vec<H256> {
        let result = self
            .read_factory("getCreatorMarkets", &[Token::Address(creator)])
            .await
            .and_then(|out| out.bytes32_array(0));
        result.unwrap_or_else(|e| {
            warn!(creator = ?creator, error = %e, "Failed to fetch creator markets");
            Vec::new()
        })
    }

    /// Create a market with factory defaults for fee and caps
    pub async fn create_simple_market(
        &self,
        question: &str,
        category: &str,
        ends_at: DateTime<Utc>,
    ) -> Result<CreatedMarket, SubmitError> {
        validate_market_fields(question, category, ends_at, Utc::now())?;

        let args = [
            Token::String(question.to_string()),
            Token::String(category.to_string()),
            Token::Uint(unix_seconds(ends_at)),
        ];
        self.submit_creation("createSimpleMarket", &args).await
    }

    pub async fn create_market(&self, draft: &MarketDraft) -> Result<CreatedMarket, SubmitError> {
        draft.validate(Utc::now())?;

        let args = [
            Token::String(draft.question.clone()),
            Token::String(draft.category.clone()),
            Token::Array(draft.sources.iter().cloned().map(Token::String).collect()),
            Token::Uint(unix_seconds(draft.ends_at)),
            Token::Uint(draft.fee_bp.unwrap_or(0).into()),
            Token::Uint(draft.max_stake_per_user.map(to_base_units).unwrap_or_default()),
            Token::Uint(draft.max_total_pool.map(to_base_units).unwrap_or_default()),
        ];
        self.submit_creation("createMarket", &args).await
    }

    async fn submit_creation(&self, function: &str, args: &[Token]) -> Result<CreatedMarket, SubmitError> {
        let receipt = self
            .gateway
            .write_and_confirm(self.factory, &self.abis.factory, function, args, None)
            .await?;

        let created = self
            .abis
            .factory
            .event("MarketCreated")
            .ok()
            .and_then(|event| find_market_created(event, self.factory, &receipt.logs));
        match created {
            Some((market, market_id)) => {
                info!(market = ?market, market_id = ?market_id, "Market created");
            }
            None => warn!(tx_hash = ?receipt.transaction_hash, "Market created but no MarketCreated event found"),
        }

        Ok(CreatedMarket {
            market: created.map(|(market, _)| market),
            market_id: created.map(|(_, id)| id),
            receipt,
        })
    }
}

/// First `MarketCreated` log emitted by the factory, as `(market, market_id)`
fn find_market_created(event: &Event, factory: Address, logs: &[ReceiptLog]) -> Option<(Address, H256)> {
    let signature = event.signature();
    logs.iter()
        .filter(|log| log.address == factory && log.topics.first() == Some(&signature))
        .find_map(|log| {
            let parsed = event
                .parse_log(RawLog {
                    topics: log.topics.clone(),
                    data: log.data.clone(),
                })
                .ok()?;

            let mut market = None;
            let mut market_id = None;
            for param in parsed.params {
                match (param.name.as_str(), param.value) {
                    ("market", Token::Address(address)) => market = Some(address),
                    ("marketId", Token::FixedBytes(bytes)) if bytes.len() == 32 => {
                        market_id = Some(H256::from_slice(&bytes))
                    }
                    _ => {}
                }
            }
            Some((market?, market_id?))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ConfirmationPolicy, SigningSession};
    use crate::testing::{FakeChain, MarketFixture};
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;
    use web3::ethabi;


    fn factory() -> Address {
        Address::repeat_byte(0xFA)
    }

    fn directory(session: Option<SigningSession>) -> (Arc<FakeChain>, MarketDirectory) {
        let abis = ContractAbis::load().unwrap();
        let chain = Arc::new(FakeChain::new(abis.clone()));
        let policy = ConfirmationPolicy {
            poll_interval: Duration::from_millis(5),
            timeout: Some(Duration::from_secs(5)),
        };
        let gateway = ContractGateway::new(chain.clone(), session, 84532, policy);
        (chain, MarketDirectory::new(Arc::new(gateway), Arc::new(abis), factory()))
    }

    fn market_created_log(abis: &ContractAbis, market: Address, market_id: H256) -> ReceiptLog {
        let event = abis.factory.event("MarketCreated").unwrap();
        ReceiptLog {
            address: factory(),
            topics: vec![
                event.signature(),
                market_id,
                H256::from(market),
                H256::from(Address::repeat_byte(0x99)),
            ],
            data: ethabi::encode(&[
                Token::String("Will it rain?".into()),
                Token::String("weather".into()),
                Token::Uint(U256::from(1_900_000_000u64)),
            ]),
        }
    }

    #[tokio::test]
    async fn test_details_skip_failures_and_keep_order() {
        let (chain, dir) = directory(None);
        let markets: Vec<Address> = (1..=4u8).map(Address::repeat_byte).collect();
        chain.stub(
            factory(),
            "getAllMarkets",
            vec![Token::Array(markets.iter().copied().map(Token::Address).collect())],
        );
        for market in &markets {
            chain.stub_market(*market, &MarketFixture::default());
        }
        chain.fail(markets[1], "noPool", "timeout");

        let details = dir.list_markets_with_details(0, 50).await;
        let loaded: Vec<Address> = details.iter().map(|m| m.address).collect();
        assert_eq!(loaded, vec![markets[0], markets[2], markets[3]]);
    }

    #[tokio::test]
    async fn test_unreachable_factory_gives_empty_results() {
        let (chain, dir) = directory(None);
        chain.fail(factory(), "getAllMarkets", "connection refused");

        assert!(dir.list_markets(0, 10).await.is_empty());
        assert!(dir.list_markets_with_details(0, 10).await.is_empty());
        assert_eq!(dir.total_count().await, 0);
        assert!(dir.statistics().await.is_none());
    }

    #[tokio::test]
    async fn test_statistics_scaled() {
        let (chain, dir) = directory(None);
        chain.stub(
            factory(),
            "getStatistics",
            vec![
                Token::Uint(U256::from(12u64)),
                Token::Uint(U256::from(2_500_000_000u64)),
                Token::Uint(U256::from(200u64)),
                Token::Address(Address::repeat_byte(0x77)),
            ],
        );

        let stats = dir.statistics().await.unwrap();
        assert_eq!(stats.total_markets, 12);
        assert_eq!(stats.total_volume, Decimal::from(2_500));
        assert_eq!(stats.treasury, Address::repeat_byte(0x77));
    }

    #[tokio::test]
    async fn test_unknown_market_id() {
        let (chain, dir) = directory(None);
        chain.stub(factory(), "getMarket", vec![Token::Address(Address::zero())]);
        assert_eq!(dir.market_by_id(H256::repeat_byte(1)).await, None);
    }

    #[tokio::test]
    async fn test_create_simple_market_reads_event() {
        let (chain, dir) = directory(Some(SigningSession::node_managed(Address::repeat_byte(0x99))));
        let abis = ContractAbis::load().unwrap();
        let market = Address::repeat_byte(0x55);
        let market_id = H256::repeat_byte(0x66);
        chain.emit_logs(factory(), "createSimpleMarket", vec![market_created_log(&abis, market, market_id)]);

        let created = dir
            .create_simple_market("Will it rain?", "weather", Utc::now() + ChronoDuration::days(7))
            .await
            .unwrap();
        assert_eq!(created.market, Some(market));
        assert_eq!(created.market_id, Some(market_id));
        assert_eq!(chain.sent_functions(), vec!["createSimpleMarket".to_string()]);
    }

    #[tokio::test]
    async fn test_create_market_validates_before_submitting() {
        let (chain, dir) = directory(Some(SigningSession::node_managed(Address::repeat_byte(0x99))));
        let draft = MarketDraft {
            question: "Will it rain?".into(),
            category: "weather".into(),
            sources: vec!["https://example.org".into()],
            ends_at: Utc::now() + ChronoDuration::days(1),
            fee_bp: Some(20_000),
            max_stake_per_user: None,
            max_total_pool: None,
        };

        let result = dir.create_market(&draft).await;
        assert_eq!(result.unwrap_err(), SubmitError::Validation(ValidationError::FeeTooHigh(20_000)));

        let past = MarketDraft {
            fee_bp: None,
            ends_at: Utc::now() - ChronoDuration::hours(1),
            ..draft
        };
        assert!(matches!(
            dir.create_market(&past).await,
            Err(SubmitError::Validation(ValidationError::EndTimeInPast { .. }))
        ));
        assert!(chain.sent().is_empty());
    }

    #[test]
    fn test_blank_question_rejected() {
        let now = Utc::now();
        let later = now + ChronoDuration::minutes(5);
        assert_eq!(
            validate_market_fields("  ", "sports", later, now),
            Err(ValidationError::EmptyQuestion)
        );
        assert_eq!(
            validate_market_fields("Q?", "", later, now),
            Err(ValidationError::EmptyCategory)
        );
        assert!(validate_market_fields("Q?", "sports", later, now).is_ok());
    }
}
