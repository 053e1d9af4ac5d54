// src/dispatch.rs
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{AccountError, CallRevert};
use crate::types::Call;

/// Upper bound on the number of calls in one batch.
pub const MAX_BATCH_CALLS: usize = 10;

/// Width of each slot's window into a fixed-slot batch payload.
pub const SLOT_STRIDE: usize = 256;

/// What the account does when a forwarded call reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the whole operation on the first revert.
    #[default]
    FailFast,
    /// Keep going and report each call's outcome in the receipt.
    BestEffort,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail-fast" => Ok(Self::FailFast),
            "best-effort" => Ok(Self::BestEffort),
            other => Err(format!("unknown failure policy: {other}")),
        }
    }
}

/// The host environment that carries out calls made by the account.
#[async_trait]
pub trait CallForwarder: Send + Sync {
    /// Performs `call` with `from` as the sender. There is no per-call budget:
    /// the call gets whatever the host has left.
    async fn forward(&self, from: Address, call: &Call) -> Result<Bytes, CallRevert>;

    /// Marks a point the host can roll back to.
    async fn snapshot(&self) -> SnapshotId;

    /// Undoes every effect since `id` was taken and drops later snapshots.
    async fn revert_to(&self, id: SnapshotId);

    /// Keeps the effects since `id` and forgets the snapshot.
    async fn release(&self, id: SnapshotId);
}

/// Handle returned by `CallForwarder::snapshot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotId(usize);

/// An ordered, length-carrying sequence of calls, at most `MAX_BATCH_CALLS`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    calls: Vec<Call>,
}

impl Batch {
    pub fn new(calls: Vec<Call>) -> Result<Self, AccountError> {
        if calls.len() > MAX_BATCH_CALLS {
            return Err(AccountError::BatchTooLarge(calls.len()));
        }
        Ok(Self { calls })
    }

    /// Reads the fixed-slot layout: slots are taken in order until the first
    /// zero target, and slot `i` gets `payload[256 * i..256 * (i + 1)]`.
    /// Slots after the first zero target are not looked at.
    pub fn from_fixed_slots(
        targets: &[Address; MAX_BATCH_CALLS],
        amounts: &[U256; MAX_BATCH_CALLS],
        payload: &[u8],
    ) -> Result<Self, AccountError> {
        let mut calls = Vec::new();

        for (index, (target, amount)) in targets.iter().zip(amounts.iter()).enumerate() {
            if target.is_zero() {
                break;
            }

            let start = index * SLOT_STRIDE;
            let data = payload
                .get(start..start + SLOT_STRIDE)
                .ok_or(AccountError::BatchPayloadOutOfRange {
                    index,
                    len: payload.len(),
                })?;

            calls.push(Call::new(*target, *amount, data.to_vec()));
        }

        Ok(Self { calls })
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }
}

/// In-memory host with native balances. Value moves from the caller to the
/// target on every forwarded call; targets registered with `revert_on` fail.
#[derive(Debug, Default)]
pub struct Ledger {
    state: Mutex<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<Address, U256>,
    reverting: HashSet<Address>,
    forwarded: Vec<(Address, Call)>,
    snapshots: Vec<HashMap<Address, U256>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn credit(&self, account: Address, amount: U256) {
        let mut state = self.state.lock().await;
        let balance = state.balances.entry(account).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub async fn balance_of(&self, account: Address) -> U256 {
        let state = self.state.lock().await;
        state.balances.get(&account).copied().unwrap_or_default()
    }

    pub async fn revert_on(&self, target: Address) {
        self.state.lock().await.reverting.insert(target);
    }

    /// Every call that reached the ledger, reverted or not, in arrival order.
    pub async fn forwarded(&self) -> Vec<(Address, Call)> {
        self.state.lock().await.forwarded.clone()
    }
}

#[async_trait]
impl CallForwarder for Ledger {
    async fn forward(&self, from: Address, call: &Call) -> Result<Bytes, CallRevert> {
        let mut state = self.state.lock().await;
        state.forwarded.push((from, call.clone()));

        if state.reverting.contains(&call.target) {
            return Err(CallRevert::Reverted(format!(
                "target {:?} rejects calls",
                call.target
            )));
        }

        let available = state.balances.get(&from).copied().unwrap_or_default();
        if available < call.value {
            return Err(CallRevert::InsufficientBalance {
                available,
                required: call.value,
            });
        }

        if !call.value.is_zero() {
            state.balances.insert(from, available - call.value);
            let target = state.balances.entry(call.target).or_default();
            *target = target.saturating_add(call.value);
        }

        debug!(
            "Forwarded {} wei from {:?} to {:?} with {} bytes of data",
            call.value,
            from,
            call.target,
            call.data.len()
        );

        Ok(Bytes::default())
    }

    async fn snapshot(&self) -> SnapshotId {
        let mut state = self.state.lock().await;
        let balances = state.balances.clone();
        state.snapshots.push(balances);
        SnapshotId(state.snapshots.len() - 1)
    }

    async fn revert_to(&self, id: SnapshotId) {
        let mut state = self.state.lock().await;
        if id.0 < state.snapshots.len() {
            let mut dropped = state.snapshots.split_off(id.0);
            state.balances = dropped.swap_remove(0);
            debug!("Reverted ledger to snapshot {}", id.0);
        }
    }

    async fn release(&self, id: SnapshotId) {
        let mut state = self.state.lock().await;
        state.snapshots.truncate(id.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(filled: &[(u8, u64)]) -> ([Address; MAX_BATCH_CALLS], [U256; MAX_BATCH_CALLS]) {
        let mut targets = [Address::zero(); MAX_BATCH_CALLS];
        let mut amounts = [U256::zero(); MAX_BATCH_CALLS];
        for (i, (byte, amount)) in filled.iter().enumerate() {
            if *byte != 0 {
                targets[i] = Address::repeat_byte(*byte);
            }
            amounts[i] = U256::from(*amount);
        }
        (targets, amounts)
    }

    #[test]
    fn stops_at_first_zero_target() {
        let (targets, amounts) = slots(&[(1, 0), (2, 1), (0, 0), (3, 9)]);
        let payload = vec![0u8; SLOT_STRIDE * MAX_BATCH_CALLS];

        let batch = Batch::from_fixed_slots(&targets, &amounts, &payload).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.calls()[0].target, Address::repeat_byte(1));
        assert_eq!(batch.calls()[1].target, Address::repeat_byte(2));
        assert_eq!(batch.calls()[1].value, U256::from(1));
    }

    #[test]
    fn slices_payload_at_fixed_stride() {
        let (targets, amounts) = slots(&[(1, 0), (2, 0)]);
        let mut payload = vec![0x11u8; SLOT_STRIDE];
        payload.extend(vec![0x22u8; SLOT_STRIDE]);

        let batch = Batch::from_fixed_slots(&targets, &amounts, &payload).unwrap();
        assert_eq!(&batch.calls()[0].data[..], &payload[..SLOT_STRIDE]);
        assert_eq!(&batch.calls()[1].data[..], &payload[SLOT_STRIDE..]);
    }

    #[test]
    fn short_payload_aborts_the_batch() {
        let (targets, amounts) = slots(&[(1, 0), (2, 0)]);
        let payload = vec![0u8; SLOT_STRIDE + 10];

        let err = Batch::from_fixed_slots(&targets, &amounts, &payload).unwrap_err();
        assert!(matches!(
            err,
            AccountError::BatchPayloadOutOfRange { index: 1, len } if len == SLOT_STRIDE + 10
        ));
    }

    #[test]
    fn leading_zero_target_is_an_empty_batch() {
        let (targets, amounts) = slots(&[(0, 0), (1, 0)]);
        let batch = Batch::from_fixed_slots(&targets, &amounts, &[]).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn dynamic_batch_is_bounded() {
        let calls = vec![Call::new(Address::repeat_byte(1), U256::zero(), vec![]); 11];
        assert!(matches!(
            Batch::new(calls),
            Err(AccountError::BatchTooLarge(11))
        ));
    }

    #[test]
    fn failure_policy_parses_cli_names() {
        assert_eq!("fail-fast".parse::<FailurePolicy>(), Ok(FailurePolicy::FailFast));
        assert_eq!("best-effort".parse::<FailurePolicy>(), Ok(FailurePolicy::BestEffort));
        assert!("sometimes".parse::<FailurePolicy>().is_err());
    }

    #[tokio::test]
    async fn ledger_moves_value_and_rejects_overdraft() {
        let ledger = Ledger::new();
        let account = Address::repeat_byte(0xaa);
        let target = Address::repeat_byte(0xbb);
        ledger.credit(account, U256::from(10)).await;

        ledger
            .forward(account, &Call::new(target, U256::from(4), vec![]))
            .await
            .unwrap();
        assert_eq!(ledger.balance_of(account).await, U256::from(6));
        assert_eq!(ledger.balance_of(target).await, U256::from(4));

        let err = ledger
            .forward(account, &Call::new(target, U256::from(7), vec![]))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CallRevert::InsufficientBalance {
                available: U256::from(6),
                required: U256::from(7),
            }
        );
        assert_eq!(ledger.forwarded().await.len(), 2);
    }

    #[tokio::test]
    async fn revert_to_restores_balances_and_drops_later_snapshots() {
        let ledger = Ledger::new();
        let account = Address::repeat_byte(0xaa);
        let target = Address::repeat_byte(0xbb);
        ledger.credit(account, U256::from(10)).await;

        let outer = ledger.snapshot().await;
        ledger
            .forward(account, &Call::new(target, U256::from(3), vec![]))
            .await
            .unwrap();
        let inner = ledger.snapshot().await;
        ledger
            .forward(account, &Call::new(target, U256::from(2), vec![]))
            .await
            .unwrap();

        ledger.revert_to(inner).await;
        assert_eq!(ledger.balance_of(target).await, U256::from(3));

        ledger.revert_to(outer).await;
        assert_eq!(ledger.balance_of(account).await, U256::from(10));
        assert_eq!(ledger.balance_of(target).await, U256::zero());

        // both snapshots are gone, so this is a no-op
        ledger.revert_to(inner).await;
        assert_eq!(ledger.balance_of(account).await, U256::from(10));
    }

    #[tokio::test]
    async fn release_keeps_effects() {
        let ledger = Ledger::new();
        let account = Address::repeat_byte(0xaa);
        let target = Address::repeat_byte(0xbb);
        ledger.credit(account, U256::from(10)).await;

        let id = ledger.snapshot().await;
        ledger
            .forward(account, &Call::new(target, U256::from(4), vec![]))
            .await
            .unwrap();
        ledger.release(id).await;
        ledger.revert_to(id).await;

        assert_eq!(ledger.balance_of(target).await, U256::from(4));
    }

    #[tokio::test]
    async fn ledger_reverts_registered_targets() {
        let ledger = Ledger::new();
        let target = Address::repeat_byte(0xbb);
        ledger.revert_on(target).await;

        let result = ledger
            .forward(Address::repeat_byte(1), &Call::new(target, U256::zero(), vec![]))
            .await;
        assert!(matches!(result, Err(CallRevert::Reverted(_))));
    }
}
