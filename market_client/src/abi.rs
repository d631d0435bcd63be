//! Contract ABIs and typed access to decoded call outputs

use ethereum_types::{Address, H256, U256};
use web3::ethabi::{Contract, Token};

use crate::error::ReadError;

const FACTORY_ABI: &[u8] = include_bytes!("../abi/factory.json");
const MARKET_ABI: &[u8] = include_bytes!("../abi/market.json");
const ORACLE_ABI: &[u8] = include_bytes!("../abi/oracle.json");
const ERC20_ABI: &[u8] = include_bytes!("../abi/erc20.json");

/// The four contract interfaces this client talks to
#[derive(Debug, Clone)]
pub struct ContractAbis {
    pub factory: Contract,
    pub market: Contract,
    pub oracle: Contract,
    pub erc20: Contract,
}

impl ContractAbis {
    /// Parse the bundled ABI files
    pub fn load() -> Result<Self, web3::ethabi::Error> {
        Ok(Self {
            factory: Contract::load(FACTORY_ABI)?,
            market: Contract::load(MARKET_ABI)?,
            oracle: Contract::load(ORACLE_ABI)?,
            erc20: Contract::load(ERC20_ABI)?,
        })
    }

    /// Iterate all interfaces, used to look up a function by selector
    pub fn all(&self) -> [&Contract; 4] {
        [&self.factory, &self.market, &self.oracle, &self.erc20]
    }
}

/// Decoded return values of one contract call
#[derive(Debug, Clone, PartialEq)]
pub struct Outputs {
    function: String,
    tokens: Vec<Token>,
}

impl Outputs {
    pub fn new(function: impl Into<String>, tokens: Vec<Token>) -> Self {
        Self {
            function: function.into(),
            tokens,
        }
    }

    fn token(&self, index: usize) -> Result<&Token, ReadError> {
        self.tokens.get(index).ok_or_else(|| {
            ReadError::Decode(format!("{}: missing output {}", self.function, index))
        })
    }

    fn mismatch(&self, index: usize, expected: &str) -> ReadError {
        ReadError::Decode(format!(
            "{}: output {} is not {}",
            self.function, index, expected
        ))
    }

    pub fn uint(&self, index: usize) -> Result<U256, ReadError> {
        match self.token(index)? {
            Token::Uint(value) => Ok(*value),
            _ => Err(self.mismatch(index, "uint")),
        }
    }

    /// A uint that must fit in `u64` (timestamps, counts)
    pub fn u64(&self, index: usize) -> Result<u64, ReadError> {
        let value = self.uint(index)?;
        u256_to_u64(value).ok_or_else(|| {
            ReadError::Decode(format!("{}: output {} overflows u64", self.function, index))
        })
    }

    /// A uint that must fit in `u8` (enum codes)
    pub fn u8(&self, index: usize) -> Result<u8, ReadError> {
        let value = self.u64(index)?;
        u8::try_from(value).map_err(|_| {
            ReadError::Decode(format!("{}: output {} overflows u8", self.function, index))
        })
    }

    pub fn boolean(&self, index: usize) -> Result<bool, ReadError> {
        match self.token(index)? {
            Token::Bool(value) => Ok(*value),
            _ => Err(self.mismatch(index, "bool")),
        }
    }

    pub fn address(&self, index: usize) -> Result<Address, ReadError> {
        match self.token(index)? {
            Token::Address(value) => Ok(*value),
            _ => Err(self.mismatch(index, "address")),
        }
    }

    pub fn addresses(&self, index: usize) -> Result<Vec<Address>, ReadError> {
        match self.token(index)? {
            Token::Array(items) => items
                .iter()
                .map(|item| match item {
                    Token::Address(value) => Ok(*value),
                    _ => Err(self.mismatch(index, "address[]")),
                })
                .collect(),
            _ => Err(self.mismatch(index, "address[]")),
        }
    }

    pub fn bytes32_array(&self, index: usize) -> Result<Vec<H256>, ReadError> {
        match self.token(index)? {
            Token::Array(items) => items
                .iter()
                .map(|item| match item {
                    Token::FixedBytes(bytes) if bytes.len() == 32 => Ok(H256::from_slice(bytes)),
                    _ => Err(self.mismatch(index, "bytes32[]")),
                })
                .collect(),
            _ => Err(self.mismatch(index, "bytes32[]")),
        }
    }
}

/// Narrow a `U256` to `u64` without panicking
pub fn u256_to_u64(value: U256) -> Option<u64> {
    if value.bits() <= 64 {
        Some(value.low_u64())
    } else {
        None
    }
}

/// ABI token for a `bytes32` argument
pub fn bytes32(value: H256) -> Token {
    Token::FixedBytes(value.as_bytes().to_vec())
}
