// src/error.rs
use ethers::types::{Address, U256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Access denied: caller {caller:?} is not the coordinator {coordinator:?}")]
    AccessDenied { caller: Address, coordinator: Address },

    #[error("Invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("Call {index} to {target:?} failed: {reason}")]
    CallFailed {
        index: usize,
        target: Address,
        reason: String,
    },

    #[error("Batch of {0} calls exceeds the limit of {max}", max = crate::dispatch::MAX_BATCH_CALLS)]
    BatchTooLarge(usize),

    #[error("Batch payload of {len} bytes has no 256-byte window for slot {index}")]
    BatchPayloadOutOfRange { index: usize, len: usize },

    #[error("Invalid calldata: {0}")]
    InvalidCalldata(String),

    #[error("Coordinator error: {0}")]
    Coordinator(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("expected 65 signature bytes, got {0}")]
    Length(usize),

    #[error("recovery byte must be 27 or 28, got {0}")]
    RecoveryByte(u8),

    #[error("signer could not be recovered: {0}")]
    Unrecoverable(String),

    #[error("recovered signer {recovered:?} is not the owner {owner:?}")]
    SignerMismatch { recovered: Address, owner: Address },
}

/// Revert reported by the host for a single forwarded call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallRevert {
    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: U256, required: U256 },

    #[error("reverted: {0}")]
    Reverted(String),
}
