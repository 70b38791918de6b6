//! Input validation against prior outputs
//!
//! ValidateInput: 𝒯𝒳 × ℕ × 𝒰𝒯𝒳𝒪 × ℱ → {valid, invalid(reason)}
//!
//! For transaction tx, input index i, the output it spends and flags f:
//! 1. i must index an input of tx
//! 2. VerifyScript(tx.inputs[i].scriptSig, output.scriptPubKey, f) with
//!    signatures checked against the legacy signature hash of (tx, i)
//! 3. Any failure, including an engine fault, is reported as invalid

use crate::constants::*;
use crate::error::{ConsensusError, ScriptError};
use crate::flags::RuleFlags;
use crate::redeem::is_pay_to_script_hash;
use crate::script::{verify_script, SignatureChecker};
use crate::sighash::signature_hash;
use crate::signature::{self, parse_public_key};
use crate::types::*;
use crate::wire::decode_transaction;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error};

/// Everything one input validation needs
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub tx: &'a Transaction,
    pub input_index: usize,
    pub prior_output: &'a TransactionOutput,
    pub flags: RuleFlags,
}

/// A script validation engine
pub trait ScriptEngine: Send + Sync {
    fn verify(&self, ctx: &ExecutionContext<'_>) -> Result<(), ScriptError>;
}

/// The stack interpreter
#[derive(Debug, Default, Clone, Copy)]
pub struct InterpreterEngine;

impl ScriptEngine for InterpreterEngine {
    fn verify(&self, ctx: &ExecutionContext<'_>) -> Result<(), ScriptError> {
        let input = ctx
            .tx
            .inputs()
            .get(ctx.input_index)
            .ok_or(ScriptError::InputIndexOutOfRange)?;
        let checker = TransactionSignatureChecker::new(ctx.tx, ctx.input_index);
        verify_script(
            input.script_sig.as_bytes(),
            ctx.prior_output.script_pubkey.as_bytes(),
            ctx.flags,
            &checker,
        )
    }
}

/// Checks signatures and lock times against one input of a transaction
#[derive(Debug, Clone, Copy)]
pub struct TransactionSignatureChecker<'a> {
    tx: &'a Transaction,
    input_index: usize,
}

impl<'a> TransactionSignatureChecker<'a> {
    pub fn new(tx: &'a Transaction, input_index: usize) -> Self {
        TransactionSignatureChecker { tx, input_index }
    }

    fn input(&self) -> Option<&'a TransactionInput> {
        self.tx.inputs().get(self.input_index)
    }
}

impl SignatureChecker for TransactionSignatureChecker<'_> {
    fn check_sig(
        &self,
        sig: &[u8],
        pubkey: &[u8],
        script_code: &[u8],
        flags: RuleFlags,
    ) -> Result<bool, ScriptError> {
        // An unparseable key fails the check before any hashing, so it never
        // surfaces a SIGHASH_SINGLE range error
        if parse_public_key(pubkey).is_none() {
            return Ok(false);
        }
        let Some(&hash_type) = sig.last() else {
            return Ok(false);
        };
        let digest = signature_hash(self.tx, self.input_index, script_code, hash_type as u32)?;
        signature::verify(sig, pubkey, &digest, flags)
    }

    fn check_lock_time(&self, lock_time: i64) -> bool {
        let tx_lock_time = self.tx.lock_time() as i64;
        let threshold = LOCKTIME_THRESHOLD as i64;

        // Heights and timestamps don't compare
        if (tx_lock_time < threshold) != (lock_time < threshold) {
            return false;
        }
        if lock_time > tx_lock_time {
            return false;
        }
        // A final input makes the transaction lock time irrelevant
        match self.input() {
            Some(input) => input.sequence != SEQUENCE_FINAL,
            None => false,
        }
    }

    fn check_sequence(&self, sequence: i64) -> bool {
        let Some(input) = self.input() else {
            return false;
        };
        // Relative lock times only apply from version 2 on
        if (self.tx.version() as u32) < 2 {
            return false;
        }
        let tx_sequence = input.sequence as i64;
        if tx_sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG as i64 != 0 {
            return false;
        }

        let mask = (SEQUENCE_LOCKTIME_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK) as i64;
        let type_flag = SEQUENCE_LOCKTIME_TYPE_FLAG as i64;
        let tx_masked = tx_sequence & mask;
        let masked = sequence & mask;
        if (tx_masked < type_flag) != (masked < type_flag) {
            return false;
        }
        masked <= tx_masked
    }
}

/// Validate one input with the interpreter
pub fn validate(
    tx: &Transaction,
    input_index: usize,
    prior_output: &TransactionOutput,
    flags: RuleFlags,
) -> ValidationResult {
    validate_with(&InterpreterEngine, tx, input_index, prior_output, flags)
}

/// Validate one input with the given engine
pub fn validate_with(
    engine: &dyn ScriptEngine,
    tx: &Transaction,
    input_index: usize,
    prior_output: &TransactionOutput,
    flags: RuleFlags,
) -> ValidationResult {
    let result = if input_index >= tx.inputs().len() {
        Err(ScriptError::InputIndexOutOfRange)
    } else {
        let ctx = ExecutionContext {
            tx,
            input_index,
            prior_output,
            flags,
        };
        catch_unwind(AssertUnwindSafe(|| engine.verify(&ctx))).unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!(txid = %tx.txid(), input_index, panic = %message, "script engine panicked");
            Err(ScriptError::Internal(message))
        })
    };

    if let Err(reason) = &result {
        debug!(txid = %tx.txid(), input_index, %reason, "input rejected");
    }
    ValidationResult::from(result)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Decode a wire-format transaction and validate one of its inputs
pub fn validate_wire(
    bytes: &[u8],
    input_index: usize,
    prior_output: &TransactionOutput,
    flags: RuleFlags,
) -> Result<ValidationResult, ConsensusError> {
    let tx = decode_transaction(bytes)?;
    Ok(validate(&tx, input_index, prior_output, flags))
}

/// Resolves outpoints to the outputs they reference
pub trait PrevoutLookup {
    fn prior_output(&self, outpoint: &OutPoint) -> Option<&TransactionOutput>;
}

impl PrevoutLookup for HashMap<OutPoint, TransactionOutput> {
    fn prior_output(&self, outpoint: &OutPoint) -> Option<&TransactionOutput> {
        self.get(outpoint)
    }
}

impl PrevoutLookup for HashMap<Txid, Transaction> {
    fn prior_output(&self, outpoint: &OutPoint) -> Option<&TransactionOutput> {
        self.get(&outpoint.txid)?
            .outputs()
            .get(outpoint.index as usize)
    }
}

/// Validate every input of `tx`, in order.
///
/// Coinbase inputs have nothing to spend and are always valid.
pub fn validate_transaction<L: PrevoutLookup + ?Sized>(
    tx: &Transaction,
    lookup: &L,
    flags: RuleFlags,
) -> Vec<ValidationResult> {
    tx.inputs()
        .iter()
        .enumerate()
        .map(|(index, input)| {
            if input.previous_output.is_null() {
                return ValidationResult::Valid;
            }
            match lookup.prior_output(&input.previous_output) {
                Some(prior_output) => validate(tx, index, prior_output, flags),
                None => {
                    debug!(txid = %tx.txid(), input_index = index, outpoint = ?input.previous_output, "prior output not found");
                    ValidationResult::Invalid(ScriptError::MissingPrevout)
                }
            }
        })
        .collect()
}

/// Whether `input` spends a pay-to-script-hash output
pub fn spends_pay_to_script_hash<L: PrevoutLookup + ?Sized>(
    input: &TransactionInput,
    lookup: &L,
) -> bool {
    if input.previous_output.is_null() {
        return false;
    }
    lookup
        .prior_output(&input.previous_output)
        .map_or(false, |out| is_pay_to_script_hash(out.script_pubkey.as_bytes()))
}
