//! Validation and execution engine of a single-owner ERC-4337 style account.
//!
//! The account accepts privileged calls only from its coordinator, checks
//! operation signatures against a fixed owner, and forwards single or batched
//! calls through the host environment.

pub mod abi;
pub mod account;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod rpc;
pub mod signature;
pub mod types;

pub use account::Account;
pub use coordinator::{Coordinator, EntryPointCoordinator, InMemoryEntryPoint};
pub use dispatch::{Batch, CallForwarder, FailurePolicy, Ledger, MAX_BATCH_CALLS};
pub use error::{AccountError, CallRevert, SignatureError};
pub use types::{Call, ExecutionReceipt, UserOperation, VALIDATION_SUCCESS};
