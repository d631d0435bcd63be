//! In-memory chain for exercising readers and flows without a node
//!
//! Calldata is decoded with the bundled ABIs, so stubs are keyed by contract
//! address, function name and (optionally) decoded arguments.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use ethereum_types::{Address, H256, U256};
use web3::ethabi::{self, Function, Token};

use crate::abi::ContractAbis;
use crate::gateway::{ChainTransport, OutgoingTransaction, Receipt, ReceiptLog, Signer, TransportError};

/// Canned answer for a read
#[derive(Debug, Clone)]
pub enum Reply {
    Return(Vec<Token>),
    Unavailable(String),
    Revert(String),
}

#[derive(Debug, Clone)]
struct Stub {
    contract: Address,
    function: String,
    args: Option<Vec<Token>>,
    reply: Reply,
}

/// A transaction the fake accepted
#[derive(Debug, Clone, PartialEq)]
pub struct SentTransaction {
    pub hash: H256,
    pub from: Address,
    pub to: Address,
    pub function: String,
    pub args: Vec<Token>,
    pub value: Option<U256>,
}

#[derive(Debug, Default)]
struct FakeState {
    stubs: Vec<Stub>,
    calls: Vec<(Address, String)>,
    sent: Vec<SentTransaction>,
    receipts: HashMap<H256, Receipt>,
    mined_reverts: Vec<(Address, String)>,
    send_failures: Vec<(Address, String, TransportError)>,
    logs: Vec<(Address, String, Vec<ReceiptLog>)>,
    delays: Vec<(Address, String, Duration)>,
    chain_id: u64,
}

/// Values for the six market fields; amounts in base units
#[derive(Debug, Clone)]
pub struct MarketFixture {
    pub ends_at: u64,
    pub state: u8,
    pub yes_pool: U256,
    pub no_pool: U256,
    pub fee_bp: u16,
    pub max_stake_per_user: U256,
}

impl Default for MarketFixture {
    fn default() -> Self {
        Self {
            ends_at: 1_900_000_000,
            state: 1,
            yes_pool: U256::zero(),
            no_pool: U256::zero(),
            fee_bp: 200,
            max_stake_per_user: U256::from(10_000_000_000u64),
        }
    }
}

pub struct FakeChain {
    abis: ContractAbis,
    state: Mutex<FakeState>,
}

impl FakeChain {
    pub fn new(abis: ContractAbis) -> Self {
        Self {
            abis,
            state: Mutex::new(FakeState {
                chain_id: 84532,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push_stub(&self, contract: Address, function: &str, args: Option<Vec<Token>>, reply: Reply) {
        self.state().stubs.push(Stub {
            contract,
            function: function.to_string(),
            args,
            reply,
        });
    }

    /// Answer `function` on `contract` for any arguments
    pub fn stub(&self, contract: Address, function: &str, outputs: Vec<Token>) {
        self.push_stub(contract, function, None, Reply::Return(outputs));
    }

    /// Answer `function` only for exactly these arguments
    pub fn stub_with_args(&self, contract: Address, function: &str, args: Vec<Token>, outputs: Vec<Token>) {
        self.push_stub(contract, function, Some(args), Reply::Return(outputs));
    }

    /// Make reads of `function` fail as if the node were down
    pub fn fail(&self, contract: Address, function: &str, reason: &str) {
        self.push_stub(contract, function, None, Reply::Unavailable(reason.to_string()));
    }

    /// Make reads of `function` revert
    pub fn revert(&self, contract: Address, function: &str, reason: &str) {
        self.push_stub(contract, function, None, Reply::Revert(reason.to_string()));
    }

    /// Reject submissions of `function` at the node
    pub fn fail_send(&self, contract: Address, function: &str, error: TransportError) {
        self.state()
            .send_failures
            .push((contract, function.to_string(), error));
    }

    /// Accept `function` but mine it with a failed status
    pub fn revert_when_mined(&self, contract: Address, function: &str, reason: &str) {
        self.state()
            .mined_reverts
            .push((contract, function.to_string()));
        self.revert(contract, function, reason);
    }

    /// Attach logs to the receipt of `function`
    pub fn emit_logs(&self, contract: Address, function: &str, logs: Vec<ReceiptLog>) {
        self.state().logs.push((contract, function.to_string(), logs));
    }

    /// Hold reads and submissions of `function` for `delay` before answering
    pub fn delay(&self, contract: Address, function: &str, delay: Duration) {
        self.state().delays.push((contract, function.to_string(), delay));
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.state().chain_id = chain_id;
    }

    pub fn sent(&self) -> Vec<SentTransaction> {
        self.state().sent.clone()
    }

    pub fn sent_functions(&self) -> Vec<String> {
        self.state().sent.iter().map(|tx| tx.function.clone()).collect()
    }

    /// Reads served so far, as `(contract, function)`
    pub fn calls(&self) -> Vec<(Address, String)> {
        self.state().calls.clone()
    }

    /// Stub the six fields the market reader fetches
    pub fn stub_market(&self, market: Address, fixture: &MarketFixture) {
        self.stub(market, "endsAt", vec![Token::Uint(fixture.ends_at.into())]);
        self.stub(market, "state", vec![Token::Uint(fixture.state.into())]);
        self.stub(market, "yesPool", vec![Token::Uint(fixture.yes_pool)]);
        self.stub(market, "noPool", vec![Token::Uint(fixture.no_pool)]);
        self.stub(market, "feeBP", vec![Token::Uint(fixture.fee_bp.into())]);
        self.stub(market, "maxStakePerUser", vec![Token::Uint(fixture.max_stake_per_user)]);
    }

    /// Stub the four reads behind a user's position
    pub fn stub_position(
        &self,
        market: Address,
        user: Address,
        yes_stake: U256,
        no_stake: U256,
        can_claim: bool,
        payout: U256,
    ) {
        self.stub_with_args(
            market,
            "stakes",
            vec![Token::Address(user), Token::Uint(0u8.into())],
            vec![Token::Uint(yes_stake)],
        );
        self.stub_with_args(
            market,
            "stakes",
            vec![Token::Address(user), Token::Uint(1u8.into())],
            vec![Token::Uint(no_stake)],
        );
        self.stub(market, "canClaim", vec![Token::Bool(can_claim)]);
        self.stub(market, "getPotentialPayout", vec![Token::Uint(payout)]);
    }

    fn delay_for(&self, contract: Address, function: &str) -> Option<Duration> {
        self.state()
            .delays
            .iter()
            .find(|(to, name, _)| *to == contract && name == function)
            .map(|(_, _, delay)| *delay)
    }

    fn decode_call(&self, data: &[u8]) -> Result<(Function, Vec<Token>), TransportError> {
        if data.len() < 4 {
            return Err(TransportError::Unavailable("calldata too short".into()));
        }
        let function = self
            .abis
            .all()
            .into_iter()
            .flat_map(|contract| contract.functions())
            .find(|function| function.short_signature()[..] == data[..4])
            .cloned()
            .ok_or_else(|| TransportError::Unavailable("unknown selector".into()))?;
        let args = function
            .decode_input(&data[4..])
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        Ok((function, args))
    }
}

#[async_trait]
impl ChainTransport for FakeChain {
    async fn call(
        &self,
        _from: Option<Address>,
        to: Address,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, TransportError> {
        let (function, args) = self.decode_call(&data)?;

        let delay = self.delay_for(to, &function.name);
        let reply = {
            let mut state = self.state();
            state.calls.push((to, function.name.clone()));
            let reply = state
                .stubs
                .iter()
                .rev()
                .find(|stub| {
                    stub.contract == to
                        && stub.function == function.name
                        && stub.args.as_ref().map_or(true, |expected| *expected == args)
                })
                .map(|stub| stub.reply.clone());
            reply
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Some(Reply::Return(outputs)) => Ok(ethabi::encode(&outputs)),
            Some(Reply::Unavailable(reason)) => Err(TransportError::Unavailable(reason)),
            Some(Reply::Revert(reason)) => Err(TransportError::Reverted(reason)),
            None => Err(TransportError::Unavailable(format!(
                "no stub for {:?}.{}",
                to, function.name
            ))),
        }
    }

    async fn send_transaction(
        &self,
        tx: OutgoingTransaction,
        _signer: &Signer,
    ) -> Result<H256, TransportError> {
        let (function, args) = self.decode_call(&tx.data)?;
        if let Some(delay) = self.delay_for(tx.to, &function.name) {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();

        if let Some((_, _, error)) = state
            .send_failures
            .iter()
            .find(|(contract, name, _)| *contract == tx.to && *name == function.name)
        {
            return Err(error.clone());
        }

        let nonce = state.sent.len() as u64 + 1;
        let hash = H256::from_low_u64_be(nonce);
        let success = !state
            .mined_reverts
            .iter()
            .any(|(contract, name)| *contract == tx.to && *name == function.name);
        let logs = state
            .logs
            .iter()
            .filter(|(contract, name, _)| *contract == tx.to && *name == function.name)
            .flat_map(|(_, _, logs)| logs.clone())
            .collect();

        state.receipts.insert(
            hash,
            Receipt {
                transaction_hash: hash,
                block_number: nonce,
                gas_used: U256::from(21_000u64),
                success,
                logs,
            },
        );
        state.sent.push(SentTransaction {
            hash,
            from: tx.from,
            to: tx.to,
            function: function.name.clone(),
            args,
            value: tx.value,
        });
        Ok(hash)
    }

    async fn receipt(&self, hash: H256) -> Result<Option<Receipt>, TransportError> {
        Ok(self.state().receipts.get(&hash).cloned())
    }

    async fn chain_id(&self) -> Result<u64, TransportError> {
        Ok(self.state().chain_id)
    }
}
