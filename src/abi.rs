// src/abi.rs
use ethers::abi::AbiEncode;
use ethers::contract::abigen;
use ethers::types::{Address, Bytes, U256};

use crate::dispatch::MAX_BATCH_CALLS;
use crate::types::Call;

abigen!(
    AccountAbi,
    r#"[
        function execute(address target, uint256 value, bytes payload)
        function executeBatch(address[10] targets, uint256[10] amounts, bytes payload)
    ]"#
);

abigen!(
    EntryPoint,
    r#"[
        struct PackedUserOperation { address sender; uint256 nonce; bytes initCode; bytes callData; bytes32 accountGasLimits; uint256 preVerificationGas; bytes32 gasFees; bytes paymasterAndData; bytes signature; }
        function getNonce(address sender, uint192 key) external view returns (uint256)
        function balanceOf(address account) external view returns (uint256)
        function handleOps(PackedUserOperation[] ops, address beneficiary) external
    ]"#
);

/// Calldata for `execute(target, value, payload)`, as placed in an operation's
/// `callData`.
pub fn encode_execute(call: &Call) -> Bytes {
    ExecuteCall {
        target: call.target,
        value: call.value,
        payload: call.data.clone(),
    }
    .encode()
    .into()
}

/// Calldata for the fixed-slot `executeBatch`. Unused slots stay zero, which
/// the account reads as the end of the batch. Each payload is padded to its
/// 256-byte window; longer payloads are truncated.
pub fn encode_execute_batch(calls: &[Call]) -> Bytes {
    let mut targets = [Address::zero(); MAX_BATCH_CALLS];
    let mut amounts = [U256::zero(); MAX_BATCH_CALLS];
    let mut payload = Vec::with_capacity(calls.len() * crate::dispatch::SLOT_STRIDE);

    for (i, call) in calls.iter().take(MAX_BATCH_CALLS).enumerate() {
        targets[i] = call.target;
        amounts[i] = call.value;

        let mut window = [0u8; crate::dispatch::SLOT_STRIDE];
        let len = call.data.len().min(window.len());
        window[..len].copy_from_slice(&call.data[..len]);
        payload.extend_from_slice(&window);
    }

    ExecuteBatchCall {
        targets,
        amounts,
        payload: payload.into(),
    }
    .encode()
    .into()
}

impl From<crate::types::UserOperation> for PackedUserOperation {
    fn from(op: crate::types::UserOperation) -> Self {
        Self {
            sender: op.sender,
            nonce: op.nonce,
            init_code: op.init_code,
            call_data: op.call_data,
            account_gas_limits: op.account_gas_limits.to_fixed_bytes(),
            pre_verification_gas: op.pre_verification_gas,
            gas_fees: op.gas_fees.to_fixed_bytes(),
            paymaster_and_data: op.paymaster_and_data,
            signature: op.signature,
        }
    }
}
