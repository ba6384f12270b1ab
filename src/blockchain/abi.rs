use alloy::primitives::{Address, Bytes};
use alloy::sol;
use alloy::sol_types::SolCall;

use crate::types::{ScannerError, ScannerResult};

// Define Solidity interfaces using alloy's sol! macro

// Compound-style comptroller (risk engine)
sol! {
    interface IComptroller {
        function getAllBorrowers() external view returns (address[] memory);
        function getAllMarkets() external view returns (address[] memory);
        function getAssetsIn(address account) external view returns (address[] memory);
        function getAccountLiquidity(address account) external view returns (
            uint256 errorCode,
            uint256 liquidity,
            uint256 shortfall
        );
        function oracle() external view returns (address);
    }
}

// Money market (cToken)
sol! {
    interface ICToken {
        function totalBorrows() external view returns (uint256);
        function underlying() external view returns (address);
        function symbol() external view returns (string);
        function borrowBalanceStored(address account) external view returns (uint256);
        function balanceOfUnderlying(address owner) external returns (uint256);
    }
}

// ERC20 metadata of a market's underlying token
sol! {
    interface IERC20Metadata {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
    }
}

// Protocol price oracle, queried for display only
sol! {
    interface IPriceOracle {
        function getUnderlyingPrice(address cToken) external view returns (uint256);
    }
}

// Multicall (v1) batching helper
sol! {
    interface IMulticall {
        struct Call {
            address target;
            bytes callData;
        }

        function aggregate(Call[] calldata calls) external returns (
            uint256 blockNumber,
            bytes[] memory returnData
        );
    }
}

/// One entry of a multicall batch: a target contract and ABI-encoded calldata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCall {
    pub target: Address,
    pub data: Bytes,
}

impl BatchCall {
    pub fn new<C: SolCall>(target: Address, call: &C) -> Self {
        Self {
            target,
            data: call.abi_encode().into(),
        }
    }
}

impl From<BatchCall> for IMulticall::Call {
    fn from(call: BatchCall) -> Self {
        IMulticall::Call {
            target: call.target,
            callData: call.data,
        }
    }
}

/// Decode raw return data using the output schema of `C`
pub fn decode_returns<C: SolCall>(data: &[u8]) -> ScannerResult<C::Return> {
    C::abi_decode_returns(data).map_err(|e| ScannerError::Decode {
        method: C::SIGNATURE,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use alloy::sol_types::SolValue;

    #[test]
    fn test_batch_call_carries_selector() {
        let target = Address::repeat_byte(0x11);
        let account = Address::repeat_byte(0x22);
        let call = BatchCall::new(target, &IComptroller::getAssetsInCall { account });

        assert_eq!(call.target, target);
        assert_eq!(&call.data[..4], IComptroller::getAssetsInCall::SELECTOR.as_slice());
        assert_eq!(call.data.len(), 4 + 32);
        assert_eq!(&call.data[4 + 12..], account.as_slice());
    }

    #[test]
    fn test_decode_liquidity_triple() {
        let data = (U256::from(0u64), U256::from(9u64), U256::from(10u64)).abi_encode_params();
        let out = decode_returns::<IComptroller::getAccountLiquidityCall>(&data).unwrap();

        assert_eq!(out.errorCode, U256::ZERO);
        assert_eq!(out.liquidity, U256::from(9u64));
        assert_eq!(out.shortfall, U256::from(10u64));
    }

    #[test]
    fn test_decode_failure_names_method() {
        match decode_returns::<IComptroller::getAccountLiquidityCall>(&[0u8; 7]) {
            Err(ScannerError::Decode { method, .. }) => {
                assert_eq!(method, "getAccountLiquidity(address)");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("truncated output decoded"),
        }
    }
}
