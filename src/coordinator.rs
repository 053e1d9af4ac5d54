// src/coordinator.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::prelude::*;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::abi::EntryPoint;
use crate::error::AccountError;
use crate::types::UserOperation;

/// The single party allowed to drive an account's privileged entry points.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Identity checked by the account's access guard.
    fn address(&self) -> Address;

    /// Hands an operation to the coordinator; returns its operation hash.
    async fn submit(&self, op: UserOperation) -> Result<H256, AccountError>;

    async fn get_nonce(&self, account: Address, key: U256) -> Result<U256, AccountError>;

    async fn get_deposit(&self, account: Address) -> Result<U256, AccountError>;
}

/// Coordinator kept entirely in memory. Nonces follow the `key << 64 | sequence`
/// layout; submitting an operation consumes its sequence number.
#[derive(Debug)]
pub struct InMemoryEntryPoint {
    address: Address,
    chain_id: u64,
    state: Mutex<EntryPointState>,
}

#[derive(Debug, Default)]
struct EntryPointState {
    sequences: HashMap<(Address, U256), u64>,
    deposits: HashMap<Address, U256>,
    submitted: Vec<UserOperation>,
}

impl InMemoryEntryPoint {
    pub fn new(address: Address, chain_id: u64) -> Self {
        Self {
            address,
            chain_id,
            state: Mutex::new(EntryPointState::default()),
        }
    }

    pub async fn deposit_to(&self, account: Address, amount: U256) {
        let mut state = self.state.lock().await;
        let deposit = state.deposits.entry(account).or_default();
        *deposit = deposit.saturating_add(amount);
    }

    pub async fn submitted(&self) -> Vec<UserOperation> {
        self.state.lock().await.submitted.clone()
    }
}

#[async_trait]
impl Coordinator for InMemoryEntryPoint {
    fn address(&self) -> Address {
        self.address
    }

    async fn submit(&self, op: UserOperation) -> Result<H256, AccountError> {
        let mut state = self.state.lock().await;
        let key = op.nonce_key();
        let sequence = state.sequences.entry((op.sender, key)).or_default();

        if op.nonce.low_u64() != *sequence {
            return Err(AccountError::Coordinator(format!(
                "invalid nonce {} for {:?}, expected sequence {}",
                op.nonce, op.sender, sequence
            )));
        }
        *sequence += 1;

        let hash = op.hash(self.address, self.chain_id);
        debug!("Accepted operation {:?} from {:?}", hash, op.sender);
        state.submitted.push(op);

        Ok(hash)
    }

    async fn get_nonce(&self, account: Address, key: U256) -> Result<U256, AccountError> {
        let state = self.state.lock().await;
        let sequence = state
            .sequences
            .get(&(account, key))
            .copied()
            .unwrap_or_default();
        Ok((key << 64) | U256::from(sequence))
    }

    async fn get_deposit(&self, account: Address) -> Result<U256, AccountError> {
        let state = self.state.lock().await;
        Ok(state.deposits.get(&account).copied().unwrap_or_default())
    }
}

/// Coordinator backed by an EntryPoint contract reached over JSON-RPC.
pub struct EntryPointCoordinator {
    contract: EntryPoint<Provider<Http>>,
    chain_id: u64,
    beneficiary: Address,
}

impl EntryPointCoordinator {
    pub fn new(
        address: Address,
        client: Arc<Provider<Http>>,
        chain_id: u64,
        beneficiary: Address,
    ) -> Self {
        info!("Using EntryPoint at {:?} on chain {}", address, chain_id);

        Self {
            contract: EntryPoint::new(address, client),
            chain_id,
            beneficiary,
        }
    }
}

#[async_trait]
impl Coordinator for EntryPointCoordinator {
    fn address(&self) -> Address {
        self.contract.address()
    }

    async fn submit(&self, op: UserOperation) -> Result<H256, AccountError> {
        let hash = op.hash(self.contract.address(), self.chain_id);

        let call = self.contract.handle_ops(vec![op.into()], self.beneficiary);
        let pending = call
            .send()
            .await
            .map_err(|e| AccountError::Coordinator(e.to_string()))?;
        let tx_hash = pending.tx_hash();

        let receipt = pending
            .await
            .map_err(|e| AccountError::Coordinator(e.to_string()))?
            .ok_or_else(|| AccountError::Coordinator(format!("handleOps {tx_hash:?} dropped")))?;

        if receipt.status != Some(1u64.into()) {
            return Err(AccountError::Coordinator(format!(
                "handleOps {tx_hash:?} reverted"
            )));
        }

        info!("Submitted operation {:?} in transaction {:?}", hash, tx_hash);
        Ok(hash)
    }

    async fn get_nonce(&self, account: Address, key: U256) -> Result<U256, AccountError> {
        self.contract
            .get_nonce(account, key)
            .call()
            .await
            .map_err(|e| AccountError::Coordinator(e.to_string()))
    }

    async fn get_deposit(&self, account: Address) -> Result<U256, AccountError> {
        self.contract
            .balance_of(account)
            .call()
            .await
            .map_err(|e| AccountError::Coordinator(e.to_string()))
    }
}
