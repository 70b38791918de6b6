//! # Script-Consensus
//!
//! Validation of legacy transaction scripts against the outputs they spend.
//!
//! The crate decides, for one input of a transaction and the prior output it
//! references, whether the input's unlocking script satisfies the output's
//! locking script under a set of rule flags. Everything is a pure function of
//! its inputs.
//!
//! ## Architecture
//!
//! Modules build on each other, leaf to root:
//! - `wire`: canonical transaction encoding and the transaction id
//! - `opcodes`, `reader`: script instructions and the readable notation
//! - `sighash`: the legacy signature hash
//! - `signature`: DER and public key rules, ECDSA verification
//! - `script`: the stack interpreter
//! - `redeem`: script templates, multisig and P2SH redemption
//! - `validation`: per-input orchestration
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: no shared mutable state; safe to call from any thread
//! 2. **Explicit Results**: every rejection carries a [`ScriptError`] reason
//! 3. **Exact Version Pinning**: consensus-critical crypto crates are pinned
//! 4. **Immutable Flags**: [`RuleFlags`] values are combined, never mutated
//!
//! ## Usage
//!
//! ```rust
//! use script_consensus::ScriptValidator;
//! use script_consensus::flags::RuleFlags;
//! use script_consensus::reader::Script;
//! use script_consensus::types::*;
//!
//! let validator = ScriptValidator::new();
//! let prior = TransactionOutput::new(1000, Script::from_readable("2 ADD 5 EQUAL").unwrap());
//! let tx = Transaction::new(
//!     1,
//!     vec![TransactionInput {
//!         previous_output: OutPoint::new(Txid([7u8; 32]), 0),
//!         script_sig: Script::from_readable("3").unwrap(),
//!         sequence: 0xffffffff,
//!     }],
//!     vec![TransactionOutput::new(900, Script::from_readable("1").unwrap())],
//!     0,
//! );
//! let result = validator.validate(&tx, 0, &prior, RuleFlags::default_set());
//! assert_eq!(result, ValidationResult::Valid);
//! ```

pub mod types;
pub mod constants;
pub mod error;
pub mod flags;
pub mod wire;
pub mod opcodes;
pub mod reader;
pub mod sighash;
pub mod signature;
pub mod script;
pub mod redeem;
pub mod validation;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use error::{ConsensusError, FailureCategory, Result, ScriptError, WireFormatError};
pub use flags::RuleFlags;
pub use reader::{Script, ScriptBuilder};
pub use script::{NoSignatureChecker, SignatureChecker};
pub use validation::{
    ExecutionContext, InterpreterEngine, PrevoutLookup, ScriptEngine,
    TransactionSignatureChecker,
};

/// Entry point bundling the validation operations
///
/// # Examples
///
/// ```
/// use script_consensus::ScriptValidator;
/// use script_consensus::flags::RuleFlags;
/// use script_consensus::reader::Script;
/// use script_consensus::types::*;
/// use std::collections::HashMap;
///
/// let validator = ScriptValidator::new();
///
/// let funding = Transaction::new(
///     1,
///     vec![],
///     vec![TransactionOutput::new(5000, Script::from_readable("1").unwrap())],
///     0,
/// );
/// let spend = Transaction::new(
///     1,
///     vec![TransactionInput {
///         previous_output: OutPoint::new(funding.txid(), 0),
///         script_sig: Script::new(),
///         sequence: 0xffffffff,
///     }],
///     vec![],
///     0,
/// );
///
/// let mut prior = HashMap::new();
/// prior.insert(funding.txid(), funding);
/// let results = validator.validate_transaction(&spend, &prior, RuleFlags::default_set());
/// assert_eq!(results, vec![ValidationResult::Valid]);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptValidator;

impl ScriptValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate one input against the output it spends
    pub fn validate(
        &self,
        tx: &Transaction,
        input_index: usize,
        prior_output: &TransactionOutput,
        flags: RuleFlags,
    ) -> ValidationResult {
        validation::validate(tx, input_index, prior_output, flags)
    }

    /// Validate one input with a caller-supplied engine
    pub fn validate_with(
        &self,
        engine: &dyn ScriptEngine,
        tx: &Transaction,
        input_index: usize,
        prior_output: &TransactionOutput,
        flags: RuleFlags,
    ) -> ValidationResult {
        validation::validate_with(engine, tx, input_index, prior_output, flags)
    }

    /// Decode a transaction and validate one of its inputs
    ///
    /// # Examples
    ///
    /// ```
    /// use script_consensus::{ConsensusError, ScriptValidator, WireFormatError};
    /// use script_consensus::flags::RuleFlags;
    /// use script_consensus::reader::Script;
    /// use script_consensus::types::TransactionOutput;
    ///
    /// let validator = ScriptValidator::new();
    /// let prior = TransactionOutput::new(1, Script::from_readable("1").unwrap());
    /// let err = validator
    ///     .validate_wire(&[0x01, 0x00], 0, &prior, RuleFlags::default_set())
    ///     .unwrap_err();
    /// assert!(matches!(err, ConsensusError::WireFormat(WireFormatError::UnexpectedEnd { .. })));
    /// ```
    pub fn validate_wire(
        &self,
        bytes: &[u8],
        input_index: usize,
        prior_output: &TransactionOutput,
        flags: RuleFlags,
    ) -> Result<ValidationResult> {
        validation::validate_wire(bytes, input_index, prior_output, flags)
    }

    /// Validate every input of a transaction, resolving prior outputs through `lookup`
    pub fn validate_transaction<L: PrevoutLookup + ?Sized>(
        &self,
        tx: &Transaction,
        lookup: &L,
        flags: RuleFlags,
    ) -> Vec<ValidationResult> {
        validation::validate_transaction(tx, lookup, flags)
    }

    pub fn decode_transaction(&self, bytes: &[u8]) -> Result<Transaction> {
        Ok(wire::decode_transaction(bytes)?)
    }

    pub fn encode_transaction(&self, tx: &Transaction) -> Vec<u8> {
        wire::encode_transaction(tx)
    }

    /// Parse the readable script notation
    pub fn parse_script(&self, text: &str) -> Result<Script> {
        Script::from_readable(text)
    }

    pub fn is_standard(&self, script: &Script) -> bool {
        script.is_standard()
    }
}
