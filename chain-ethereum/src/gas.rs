use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Bytes, Eip1559TransactionRequest, U256};
use ethers_signers::{LocalWallet, Signer};
use relay_core::{ChainCommunicationError, ChainResult};

/// Fee parameters for a single transaction attempt. Every chain targeted by this system is
/// an EIP-1559 chain (spec.md §4.6 "If the chain supports EIP-1559 ... use it"); the legacy
/// variant exists for completeness on chains that don't, using a flat gas price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasPrice {
    Legacy { gas_price: U256 },
    Eip1559 { max_fee: U256, max_priority_fee: U256 },
}

impl GasPrice {
    pub fn max_fee(&self) -> U256 {
        match self {
            GasPrice::Legacy { gas_price } => *gas_price,
            GasPrice::Eip1559 { max_fee, .. } => *max_fee,
        }
    }

    /// ≥12.5% bump, the EVM replacement floor (spec.md §4.7, GLOSSARY "Replacement").
    pub fn bumped(&self, numerator: u64, denominator: u64) -> GasPrice {
        let bump = |v: U256| (v * U256::from(numerator) + U256::from(denominator) - 1) / U256::from(denominator);
        match self {
            GasPrice::Legacy { gas_price } => GasPrice::Legacy {
                gas_price: bump(*gas_price),
            },
            GasPrice::Eip1559 {
                max_fee,
                max_priority_fee,
            } => GasPrice::Eip1559 {
                max_fee: bump(*max_fee),
                max_priority_fee: bump(*max_priority_fee),
            },
        }
    }

    /// `ceil(v * (num+den)/den)`, i.e. at least `num/den` fractionally higher than `self`.
    pub fn at_least_bumped_over(&self, floor_num: u64, floor_den: u64) -> GasPrice {
        self.bumped(floor_num + floor_den, floor_den)
    }
}

pub fn build_eip1559_tx(
    to: Address,
    data: Bytes,
    value: U256,
    chain_id: u64,
    nonce: U256,
    gas_limit: U256,
    gas_price: GasPrice,
) -> ChainResult<TypedTransaction> {
    let (max_fee, max_priority_fee) = match gas_price {
        GasPrice::Eip1559 {
            max_fee,
            max_priority_fee,
        } => (max_fee, max_priority_fee),
        GasPrice::Legacy { gas_price } => (gas_price, gas_price),
    };
    let req = Eip1559TransactionRequest::new()
        .to(to)
        .data(data)
        .value(value)
        .chain_id(chain_id)
        .nonce(nonce)
        .gas(gas_limit)
        .max_fee_per_gas(max_fee)
        .max_priority_fee_per_gas(max_priority_fee);
    Ok(TypedTransaction::Eip1559(req))
}

pub async fn sign_and_encode(tx: &TypedTransaction, signer: &LocalWallet) -> ChainResult<Bytes> {
    let signature = signer
        .sign_transaction(tx)
        .await
        .map_err(|e| ChainCommunicationError::SignerUnavailable(e.to_string()))?;
    Ok(tx.rlp_signed(&signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bumped_rounds_up_to_at_least_the_exact_fraction() {
        let price = GasPrice::Legacy {
            gas_price: U256::from(1_000_000_007u64),
        };
        let bumped = price.bumped(1125, 1000);
        // 1_000_000_007 * 1.125 = 1_125_000_007.875, must round up, never down.
        assert_eq!(bumped, GasPrice::Legacy {
            gas_price: U256::from(1_125_000_008u64)
        });
    }

    #[test]
    fn at_least_bumped_over_matches_the_evm_replacement_floor() {
        let price = GasPrice::Eip1559 {
            max_fee: U256::from(1_000_000_000u64),
            max_priority_fee: U256::from(2_000_000_000u64),
        };
        let replacement = price.at_least_bumped_over(125, 1000);
        assert_eq!(replacement.max_fee(), U256::from(1_125_000_000u64));
        match replacement {
            GasPrice::Eip1559 { max_priority_fee, .. } => {
                assert_eq!(max_priority_fee, U256::from(2_250_000_000u64));
            }
            GasPrice::Legacy { .. } => panic!("expected an eip1559 price"),
        }
    }

    #[test]
    fn at_least_bumped_over_is_strictly_greater_than_the_original() {
        let price = GasPrice::Legacy {
            gas_price: U256::from(1),
        };
        let replacement = price.at_least_bumped_over(125, 1000);
        assert!(replacement.max_fee() > price.max_fee(), "a 1-wei price must still clear the floor");
    }

    #[test]
    fn max_fee_reads_through_both_variants() {
        let legacy = GasPrice::Legacy {
            gas_price: U256::from(42),
        };
        let eip1559 = GasPrice::Eip1559 {
            max_fee: U256::from(99),
            max_priority_fee: U256::from(1),
        };
        assert_eq!(legacy.max_fee(), U256::from(42));
        assert_eq!(eip1559.max_fee(), U256::from(99));
    }
}
