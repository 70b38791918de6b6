//! Error types for script validation

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural failure while decoding the wire format
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WireFormatError {
    #[error("unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },

    #[error("{0} trailing bytes after transaction")]
    TrailingBytes(usize),

    #[error("non-minimal compact size encoding of {0}")]
    NonMinimalVarInt(u64),

    #[error("count or length {0} exceeds decode bound")]
    OversizedCount(u64),

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Why a script did not validate
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptError {
    #[error("script evaluated without error but finished with a false/empty top stack element")]
    EvalFalse,
    #[error("OP_RETURN was encountered")]
    OpReturn,

    // Limits
    #[error("script is too big")]
    ScriptSize,
    #[error("push value size limit exceeded")]
    PushSize,
    #[error("operation limit exceeded")]
    OpCount,
    #[error("stack size limit exceeded")]
    StackSize,
    #[error("signature count negative or greater than pubkey count")]
    SigCount,
    #[error("pubkey count negative or limit exceeded")]
    PubkeyCount,

    // Failed verify operations
    #[error("script failed an OP_VERIFY operation")]
    Verify,
    #[error("script failed an OP_EQUALVERIFY operation")]
    EqualVerify,
    #[error("script failed an OP_CHECKMULTISIGVERIFY operation")]
    CheckMultiSigVerify,
    #[error("script failed an OP_CHECKSIGVERIFY operation")]
    CheckSigVerify,
    #[error("script failed an OP_NUMEQUALVERIFY operation")]
    NumEqualVerify,

    // Logical and syntax errors
    #[error("opcode missing or not understood")]
    BadOpcode,
    #[error("attempted to use a disabled opcode")]
    DisabledOpcode,
    #[error("operation not valid with the current stack size")]
    InvalidStackOperation,
    #[error("operation not valid with the current altstack size")]
    InvalidAltstackOperation,
    #[error("invalid OP_IF construction")]
    UnbalancedConditional,

    // Script numbers
    #[error("script number overflow")]
    NumberOverflow,
    #[error("non-minimally encoded script number")]
    NonMinimalNumber,

    // Lock times
    #[error("negative locktime")]
    NegativeLockTime,
    #[error("locktime requirement not satisfied")]
    UnsatisfiedLockTime,

    // Malleability and encoding rules
    #[error("signature hash type missing or not understood")]
    SigHashType,
    #[error("non-canonical DER signature")]
    SigDer,
    #[error("data push larger than necessary")]
    MinimalData,
    #[error("only push operators allowed in signatures")]
    SigPushOnly,
    #[error("non-canonical signature: S value is unnecessarily high")]
    SigHighS,
    #[error("dummy CHECKMULTISIG argument must be zero")]
    SigNullDummy,
    #[error("public key is neither compressed nor uncompressed")]
    PubkeyType,
    #[error("stack size must be exactly one after execution")]
    CleanStack,
    #[error("signature must be zero for failed CHECK(MULTI)SIG operation")]
    NullFail,
    #[error("NOPx reserved for soft-fork upgrades")]
    DiscourageUpgradableNops,
    #[error("OP_CODESEPARATOR is not allowed")]
    OpCodeSeparator,
    #[error("signature is found in scriptCode")]
    SigFindAndDelete,

    // Transaction context
    #[error("SIGHASH_SINGLE input index has no matching output")]
    SighashSingleOutOfRange,
    #[error("input index out of range")]
    InputIndexOutOfRange,
    #[error("referenced output not found")]
    MissingPrevout,
    #[error("unsupported rule flag combination: {0}")]
    UnsupportedFlags(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`ScriptError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// Malformed opcode or operand encoding
    Syntax,
    /// The script ran and a rule rejected it
    Execution,
    /// Unexpected fault inside the engine
    Internal,
}

impl ScriptError {
    pub fn category(&self) -> FailureCategory {
        match self {
            ScriptError::BadOpcode => FailureCategory::Syntax,
            ScriptError::Internal(_) => FailureCategory::Internal,
            _ => FailureCategory::Execution,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("Wire format error: {0}")]
    WireFormat(#[from] WireFormatError),

    #[error("Script syntax error: {0}")]
    ScriptSyntax(String),

    #[error("Invalid rule flags: {0}")]
    InvalidFlags(String),

    #[error("Invalid transaction id: {0}")]
    InvalidTxid(String),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
