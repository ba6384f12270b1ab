pub mod abi;
pub mod multicall;
pub mod rpc;

pub use abi::{decode_returns, BatchCall};
pub use multicall::{ensure_positional, BatchCaller, BatchEntry, Multicall};
pub use rpc::{read_contract, BlockSource, ContractReader, EthersReader};
