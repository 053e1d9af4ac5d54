// src/account.rs
use std::sync::Arc;

use ethers::abi::AbiDecode;
use ethers::contract::EthCall;
use ethers::types::{Address, Bytes, H256, U256};
use tracing::{debug, info, warn};

use crate::abi::{AccountAbiCalls, ExecuteBatchCall, ExecuteCall};
use crate::coordinator::Coordinator;
use crate::dispatch::{Batch, CallForwarder, FailurePolicy, MAX_BATCH_CALLS};
use crate::error::{AccountError, SignatureError};
use crate::signature::SignatureParts;
use crate::types::{
    AccountEvent, Call, CallOutcome, ExecutionReceipt, UserOperation, ValidationResponse,
    VALIDATION_SUCCESS,
};

/// A single-owner smart account.
///
/// Owner and coordinator are fixed at construction and there is no way to
/// change them afterwards. Every state-changing entry point must be invoked by
/// the coordinator; the read accessors and `receive` are open to anyone.
///
/// Entry points are atomic: an `Err` means nothing was emitted, and events are
/// only handed back inside a successful receipt.
pub struct Account {
    address: Address,
    owner: Address,
    coordinator: Arc<dyn Coordinator>,
    forwarder: Arc<dyn CallForwarder>,
    failure_policy: FailurePolicy,
}

impl Account {
    pub fn new(
        address: Address,
        owner: Address,
        coordinator: Arc<dyn Coordinator>,
        forwarder: Arc<dyn CallForwarder>,
    ) -> Self {
        info!(
            "Initialized account {:?} with owner {:?} and coordinator {:?}",
            address,
            owner,
            coordinator.address()
        );

        Self {
            address,
            owner,
            coordinator,
            forwarder,
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn coordinator(&self) -> Address {
        self.coordinator.address()
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Access guard shared by every privileged entry point.
    fn ensure_coordinator(&self, caller: Address) -> Result<(), AccountError> {
        let coordinator = self.coordinator.address();
        if caller != coordinator {
            warn!("Rejected call from {:?}: not the coordinator", caller);
            return Err(AccountError::AccessDenied {
                caller,
                coordinator,
            });
        }
        Ok(())
    }

    /// Checks that `op` was signed by the owner over `op_hash`.
    ///
    /// Returns `VALIDATION_SUCCESS` when it was. Any other outcome, including
    /// a signature that is not exactly 65 bytes, is an `InvalidSignature` error.
    /// A non-zero `missing_funds` is sent to the coordinator after the
    /// signature checks out; whether that transfer succeeds is the
    /// coordinator's concern.
    pub async fn validate_user_op(
        &self,
        caller: Address,
        op: &UserOperation,
        op_hash: H256,
        missing_funds: U256,
    ) -> Result<ValidationResponse, AccountError> {
        self.ensure_coordinator(caller)?;

        let recovered = SignatureParts::try_from(&op.signature)?.recover(op_hash)?;
        debug!("Recovered signer {:?}, owner {:?}", recovered, self.owner);

        if recovered != self.owner {
            warn!("Signature for {:?} not made by the owner", op_hash);
            return Err(SignatureError::SignerMismatch {
                recovered,
                owner: self.owner,
            }
            .into());
        }

        if !missing_funds.is_zero() {
            self.pay_prefund(caller, missing_funds).await;
        }

        Ok(ValidationResponse {
            validation_data: VALIDATION_SUCCESS,
            events: vec![AccountEvent::SignerChecked {
                recovered,
                owner: self.owner,
            }],
        })
    }

    async fn pay_prefund(&self, coordinator: Address, amount: U256) {
        let prefund = Call::new(coordinator, amount, Bytes::default());
        if let Err(e) = self.forwarder.forward(self.address, &prefund).await {
            warn!("Prefund of {} to {:?} failed: {}", amount, coordinator, e);
        }
    }

    /// Forwards one call on the account's behalf.
    pub async fn execute(
        &self,
        caller: Address,
        call: Call,
    ) -> Result<ExecutionReceipt, AccountError> {
        self.ensure_coordinator(caller)?;
        self.dispatch(&[call]).await
    }

    /// Fixed-slot batch: up to ten `(target, amount)` pairs sharing one payload
    /// buffer cut into 256-byte windows. The first zero target ends the batch.
    pub async fn execute_batch(
        &self,
        caller: Address,
        targets: [Address; MAX_BATCH_CALLS],
        amounts: [U256; MAX_BATCH_CALLS],
        payload: Bytes,
    ) -> Result<ExecutionReceipt, AccountError> {
        self.ensure_coordinator(caller)?;
        let batch = Batch::from_fixed_slots(&targets, &amounts, &payload)?;
        self.dispatch(batch.calls()).await
    }

    /// Batch of explicit calls, forwarded in order.
    pub async fn execute_calls(
        &self,
        caller: Address,
        calls: Vec<Call>,
    ) -> Result<ExecutionReceipt, AccountError> {
        self.ensure_coordinator(caller)?;
        let batch = Batch::new(calls)?;
        self.dispatch(batch.calls()).await
    }

    /// ABI entry: routes encoded `execute`/`executeBatch` calldata to the
    /// matching entry point. Calldata that names neither selector, empty
    /// calldata included, falls through to `receive`. A known selector with
    /// undecodable arguments is rejected.
    pub async fn handle_call(
        &self,
        caller: Address,
        value: U256,
        calldata: &[u8],
    ) -> Result<ExecutionReceipt, AccountError> {
        match AccountAbiCalls::decode(calldata) {
            Ok(AccountAbiCalls::Execute(call)) => {
                self.execute(caller, Call::new(call.target, call.value, call.payload))
                    .await
            }
            Ok(AccountAbiCalls::ExecuteBatch(call)) => {
                self.execute_batch(caller, call.targets, call.amounts, call.payload)
                    .await
            }
            Err(e) if has_account_selector(calldata) => {
                Err(AccountError::InvalidCalldata(e.to_string()))
            }
            Err(_) => {
                self.receive(caller, value);
                Ok(ExecutionReceipt::default())
            }
        }
    }

    pub async fn get_nonce(&self) -> Result<U256, AccountError> {
        self.coordinator.get_nonce(self.address, U256::zero()).await
    }

    pub async fn get_deposit(&self) -> Result<U256, AccountError> {
        self.coordinator.get_deposit(self.address).await
    }

    /// Accepts a plain value transfer. Nothing on the account changes.
    pub fn receive(&self, sender: Address, value: U256) {
        debug!("Received {} wei from {:?}", value, sender);
    }

    async fn dispatch(&self, calls: &[Call]) -> Result<ExecutionReceipt, AccountError> {
        let mut receipt = ExecutionReceipt::default();
        let snapshot = self.forwarder.snapshot().await;

        for (index, call) in calls.iter().enumerate() {
            debug!(
                "Forwarding call {} to {:?}: value {}, data 0x{}",
                index,
                call.target,
                call.value,
                hex::encode(&call.data)
            );

            let (success, output) = match self.forwarder.forward(self.address, call).await {
                Ok(output) => (true, output),
                Err(e) => match self.failure_policy {
                    FailurePolicy::FailFast => {
                        warn!("Call {} to {:?} failed: {}", index, call.target, e);
                        self.forwarder.revert_to(snapshot).await;
                        return Err(AccountError::CallFailed {
                            index,
                            target: call.target,
                            reason: e.to_string(),
                        });
                    }
                    FailurePolicy::BestEffort => {
                        debug!("Call {} to {:?} failed, continuing: {}", index, call.target, e);
                        (false, Bytes::from(e.to_string().into_bytes()))
                    }
                },
            };

            receipt.events.push(AccountEvent::Executed {
                target: call.target,
                value: call.value,
                payload: call.data.clone(),
            });
            receipt.outcomes.push(CallOutcome {
                target: call.target,
                success,
                output,
            });
        }

        self.forwarder.release(snapshot).await;
        Ok(receipt)
    }
}

fn has_account_selector(calldata: &[u8]) -> bool {
    calldata.get(..4).map_or(false, |selector| {
        selector == ExecuteCall::selector() || selector == ExecuteBatchCall::selector()
    })
}
