// src/rpc.rs
use std::sync::Arc;

use ethers::types::{Address, Bytes, H256, U256};
use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::error::ErrorObjectOwned;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::account::Account;
use crate::dispatch::MAX_BATCH_CALLS;
use crate::error::AccountError;
use crate::types::{Call, ExecutionReceipt, UserOperation, ValidationResponse};

pub const ACCESS_DENIED_CODE: i32 = -32001;
pub const INVALID_SIGNATURE_CODE: i32 = -32002;
pub const ACCOUNT_ERROR_CODE: i32 = -32000;
pub const INVALID_PARAMS_CODE: i32 = -32602;

// The host is simulated, so the caller identity is passed explicitly.
#[rpc(server, namespace = "account")]
pub trait AccountRpc {
    #[method(name = "validateUserOp")]
    async fn validate_user_op(
        &self,
        caller: Address,
        user_op: UserOperation,
        user_op_hash: H256,
        missing_funds: U256,
    ) -> RpcResult<ValidationResponse>;

    #[method(name = "execute")]
    async fn execute(
        &self,
        caller: Address,
        target: Address,
        value: U256,
        data: Bytes,
    ) -> RpcResult<ExecutionReceipt>;

    #[method(name = "executeBatch")]
    async fn execute_batch(
        &self,
        caller: Address,
        targets: Vec<Address>,
        amounts: Vec<U256>,
        payload: Bytes,
    ) -> RpcResult<ExecutionReceipt>;

    #[method(name = "executeCalls")]
    async fn execute_calls(&self, caller: Address, calls: Vec<Call>) -> RpcResult<ExecutionReceipt>;

    /// Raw ABI-encoded call into the account.
    #[method(name = "call")]
    async fn call(&self, caller: Address, value: U256, data: Bytes) -> RpcResult<ExecutionReceipt>;

    #[method(name = "receive")]
    async fn receive(&self, sender: Address, value: U256) -> RpcResult<()>;

    #[method(name = "getNonce")]
    async fn get_nonce(&self) -> RpcResult<U256>;

    #[method(name = "getDeposit")]
    async fn get_deposit(&self) -> RpcResult<U256>;

    #[method(name = "owner")]
    async fn owner(&self) -> RpcResult<Address>;
}

pub struct AccountRpcImpl {
    // Held for the whole of each request so operations never interleave.
    account: Arc<Mutex<Account>>,
}

impl AccountRpcImpl {
    pub fn new(account: Arc<Mutex<Account>>) -> Self {
        Self { account }
    }
}

fn to_rpc_error(e: AccountError) -> ErrorObjectOwned {
    let code = match e {
        AccountError::AccessDenied { .. } => ACCESS_DENIED_CODE,
        AccountError::InvalidSignature(_) => INVALID_SIGNATURE_CODE,
        _ => ACCOUNT_ERROR_CODE,
    };
    ErrorObjectOwned::owned(code, format!("Account error: {}", e), None::<()>)
}

fn fixed_slots<T: Copy + Default>(values: Vec<T>, name: &str) -> RpcResult<[T; MAX_BATCH_CALLS]> {
    if values.len() > MAX_BATCH_CALLS {
        return Err(ErrorObjectOwned::owned(
            INVALID_PARAMS_CODE,
            format!("{} has {} entries, at most {} allowed", name, values.len(), MAX_BATCH_CALLS),
            None::<()>,
        ));
    }
    let mut slots = [T::default(); MAX_BATCH_CALLS];
    slots[..values.len()].copy_from_slice(&values);
    Ok(slots)
}

fn respond<T>(method: &str, result: Result<T, AccountError>) -> RpcResult<T> {
    match result {
        Ok(value) => {
            info!("{} succeeded", method);
            Ok(value)
        }
        Err(e) => {
            error!("{} failed: {}", method, e);
            Err(to_rpc_error(e))
        }
    }
}

#[async_trait]
impl AccountRpcServer for AccountRpcImpl {
    async fn validate_user_op(
        &self,
        caller: Address,
        user_op: UserOperation,
        user_op_hash: H256,
        missing_funds: U256,
    ) -> RpcResult<ValidationResponse> {
        debug!("Received validateUserOp for sender: {:?}", user_op.sender);

        let account = self.account.lock().await;
        let result = account
            .validate_user_op(caller, &user_op, user_op_hash, missing_funds)
            .await;
        respond("validateUserOp", result)
    }

    async fn execute(
        &self,
        caller: Address,
        target: Address,
        value: U256,
        data: Bytes,
    ) -> RpcResult<ExecutionReceipt> {
        let account = self.account.lock().await;
        let result = account.execute(caller, Call::new(target, value, data)).await;
        respond("execute", result)
    }

    async fn execute_batch(
        &self,
        caller: Address,
        targets: Vec<Address>,
        amounts: Vec<U256>,
        payload: Bytes,
    ) -> RpcResult<ExecutionReceipt> {
        let targets = fixed_slots(targets, "targets")?;
        let amounts = fixed_slots(amounts, "amounts")?;

        let account = self.account.lock().await;
        let result = account.execute_batch(caller, targets, amounts, payload).await;
        respond("executeBatch", result)
    }

    async fn execute_calls(&self, caller: Address, calls: Vec<Call>) -> RpcResult<ExecutionReceipt> {
        let account = self.account.lock().await;
        let result = account.execute_calls(caller, calls).await;
        respond("executeCalls", result)
    }

    async fn call(&self, caller: Address, value: U256, data: Bytes) -> RpcResult<ExecutionReceipt> {
        let account = self.account.lock().await;
        let result = account.handle_call(caller, value, &data).await;
        respond("call", result)
    }

    async fn receive(&self, sender: Address, value: U256) -> RpcResult<()> {
        let account = self.account.lock().await;
        account.receive(sender, value);
        Ok(())
    }

    async fn get_nonce(&self) -> RpcResult<U256> {
        let account = self.account.lock().await;
        let result = account.get_nonce().await;
        respond("getNonce", result)
    }

    async fn get_deposit(&self) -> RpcResult<U256> {
        let account = self.account.lock().await;
        let result = account.get_deposit().await;
        respond("getDeposit", result)
    }

    async fn owner(&self) -> RpcResult<Address> {
        Ok(self.account.lock().await.owner())
    }
}
