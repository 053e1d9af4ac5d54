// src/types.rs
use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

/// Returned by `validate_user_op` when the owner signed the operation.
pub const VALIDATION_SUCCESS: H256 = H256::zero();

/// User operation in the EntryPoint v0.7 packed layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub account_gas_limits: H256,
    pub pre_verification_gas: U256,
    pub gas_fees: H256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOperation {
    pub fn gas_limits(&self) -> AccountGasLimits {
        AccountGasLimits::unpack(self.account_gas_limits)
    }

    pub fn fees(&self) -> GasFees {
        GasFees::unpack(self.gas_fees)
    }

    /// The nonce key, i.e. the upper 192 bits of the nonce.
    pub fn nonce_key(&self) -> U256 {
        self.nonce >> 64
    }

    /// Hash the coordinator hands to `validateUserOp`, computed the way the
    /// v0.7 EntryPoint computes `getUserOpHash`. The signature is not covered.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> H256 {
        let packed = encode(&[
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::FixedBytes(keccak256(&self.init_code).to_vec()),
            Token::FixedBytes(keccak256(&self.call_data).to_vec()),
            Token::FixedBytes(self.account_gas_limits.as_bytes().to_vec()),
            Token::Uint(self.pre_verification_gas),
            Token::FixedBytes(self.gas_fees.as_bytes().to_vec()),
            Token::FixedBytes(keccak256(&self.paymaster_and_data).to_vec()),
        ]);

        let outer = encode(&[
            Token::FixedBytes(keccak256(packed).to_vec()),
            Token::Address(entry_point),
            Token::Uint(U256::from(chain_id)),
        ]);

        H256::from(keccak256(outer))
    }
}

/// `accountGasLimits`: verification gas limit in the high 128 bits, call gas
/// limit in the low 128 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountGasLimits {
    pub verification_gas_limit: u128,
    pub call_gas_limit: u128,
}

impl AccountGasLimits {
    pub fn pack(&self) -> H256 {
        pack_u128_pair(self.verification_gas_limit, self.call_gas_limit)
    }

    pub fn unpack(packed: H256) -> Self {
        let (verification_gas_limit, call_gas_limit) = unpack_u128_pair(packed);
        Self {
            verification_gas_limit,
            call_gas_limit,
        }
    }
}

/// `gasFees`: max priority fee in the high 128 bits, max fee in the low 128 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasFees {
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
}

impl GasFees {
    pub fn pack(&self) -> H256 {
        pack_u128_pair(self.max_priority_fee_per_gas, self.max_fee_per_gas)
    }

    pub fn unpack(packed: H256) -> Self {
        let (max_priority_fee_per_gas, max_fee_per_gas) = unpack_u128_pair(packed);
        Self {
            max_priority_fee_per_gas,
            max_fee_per_gas,
        }
    }
}

fn pack_u128_pair(high: u128, low: u128) -> H256 {
    let mut packed = [0u8; 32];
    packed[..16].copy_from_slice(&high.to_be_bytes());
    packed[16..].copy_from_slice(&low.to_be_bytes());
    H256::from(packed)
}

fn unpack_u128_pair(packed: H256) -> (u128, u128) {
    let mut high = [0u8; 16];
    let mut low = [0u8; 16];
    high.copy_from_slice(&packed.as_bytes()[..16]);
    low.copy_from_slice(&packed.as_bytes()[16..]);
    (u128::from_be_bytes(high), u128::from_be_bytes(low))
}

/// A single call the account forwards on its own behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub target: Address,
    pub value: U256,
    pub data: Bytes,
}

impl Call {
    pub fn new(target: Address, value: U256, data: impl Into<Bytes>) -> Self {
        Self {
            target,
            value,
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum AccountEvent {
    /// One per forwarded call.
    #[serde(rename_all = "camelCase")]
    Executed {
        target: Address,
        value: U256,
        payload: Bytes,
    },
    /// Diagnostic only; not a stable interface.
    #[serde(rename_all = "camelCase")]
    SignerChecked { recovered: Address, owner: Address },
}

/// Result of one forwarded call as seen by the caller of the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOutcome {
    pub target: Address,
    pub success: bool,
    pub output: Bytes,
}

/// Everything an entry point produced. Only returned when the whole operation
/// succeeded; an aborted operation yields an error and no receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReceipt {
    pub events: Vec<AccountEvent>,
    pub outcomes: Vec<CallOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResponse {
    pub validation_data: H256,
    pub events: Vec<AccountEvent>,
}
