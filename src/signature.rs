// src/signature.rs
use ethers::signers::LocalWallet;
use ethers::types::{Address, Bytes, Signature, H256, U256};

use crate::error::SignatureError;
use crate::types::UserOperation;

pub const SIGNATURE_LENGTH: usize = 65;

/// A 65-byte `r || s || v` signature split into its named components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureParts {
    pub r: H256,
    pub s: H256,
    pub v: u8,
}

impl TryFrom<&[u8]> for SignatureParts {
    type Error = SignatureError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(SignatureError::Length(bytes.len()));
        }

        let (r, rest) = bytes.split_at(32);
        let (s, v) = rest.split_at(32);
        let v = v[0];

        // ecrecover only understands the legacy 27/28 encoding
        if v != 27 && v != 28 {
            return Err(SignatureError::RecoveryByte(v));
        }

        Ok(Self {
            r: H256::from_slice(r),
            s: H256::from_slice(s),
            v,
        })
    }
}

impl TryFrom<&Bytes> for SignatureParts {
    type Error = SignatureError;

    fn try_from(bytes: &Bytes) -> Result<Self, Self::Error> {
        Self::try_from(&bytes[..])
    }
}

impl From<SignatureParts> for Signature {
    fn from(parts: SignatureParts) -> Self {
        Signature {
            r: U256::from_big_endian(parts.r.as_bytes()),
            s: U256::from_big_endian(parts.s.as_bytes()),
            v: u64::from(parts.v),
        }
    }
}

impl SignatureParts {
    /// Recovers the signer of a raw 32-byte digest. No message prefix is applied.
    pub fn recover(&self, digest: H256) -> Result<Address, SignatureError> {
        Signature::from(*self)
            .recover(digest)
            .map_err(|e| SignatureError::Unrecoverable(e.to_string()))
    }
}

/// Parses `signature` and recovers the address that signed `digest`.
pub fn recover_signer(digest: H256, signature: &[u8]) -> Result<Address, SignatureError> {
    SignatureParts::try_from(signature)?.recover(digest)
}

/// Signs the operation hash the way an owner key does: over the raw hash,
/// producing the 65-byte blob the account expects.
pub fn sign_user_operation(
    wallet: &LocalWallet,
    op: &UserOperation,
    entry_point: Address,
    chain_id: u64,
) -> Result<Bytes, SignatureError> {
    let digest = op.hash(entry_point, chain_id);
    let signature = wallet
        .sign_hash(digest)
        .map_err(|e| SignatureError::Unrecoverable(e.to_string()))?;
    Ok(Bytes::from(signature.to_vec()))
}
