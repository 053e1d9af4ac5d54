// src/config.rs
use ethers::types::{Address, U256};

use crate::dispatch::FailurePolicy;

/// Settings for one hosted account, resolved from the command line and `.env`.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    pub account: Address,
    pub owner: Address,
    pub entry_point: Address,
    pub chain_id: u64,
    /// When set, nonce and deposit reads and submissions go to a live EntryPoint.
    pub eth_rpc_url: Option<String>,
    /// Receives the fees of operations submitted with `handleOps`.
    pub beneficiary: Address,
    pub failure_policy: FailurePolicy,
    /// Starting native balance of the account in the in-memory ledger.
    pub initial_balance: U256,
}

impl AccountConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.owner.is_zero() {
            anyhow::bail!("owner address must not be zero");
        }
        if self.entry_point.is_zero() {
            anyhow::bail!("entry point address must not be zero");
        }
        if self.account == self.entry_point {
            anyhow::bail!("account and entry point must be different addresses");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AccountConfig {
        AccountConfig {
            account: Address::repeat_byte(0xaa),
            owner: Address::repeat_byte(0x01),
            entry_point: Address::repeat_byte(0xee),
            chain_id: 31337,
            eth_rpc_url: None,
            beneficiary: Address::zero(),
            failure_policy: FailurePolicy::FailFast,
            initial_balance: U256::zero(),
        }
    }

    #[test]
    fn accepts_distinct_non_zero_addresses() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn rejects_zero_owner() {
        let mut config = config();
        config.owner = Address::zero();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_account_acting_as_its_own_coordinator() {
        let mut config = config();
        config.entry_point = config.account;
        assert!(config.validate().is_err());
    }
}
