//! Legacy signature hash.
//!
//! SignatureHash: 𝒯𝒳 × ℕ × 𝕊 × ℕ → ℍ
//!
//! The digest commits to a modified copy of the spending transaction:
//! 1. every scriptSig is emptied except the signed input's, which becomes
//!    the script code with its OP_CODESEPARATORs removed
//! 2. NONE drops all outputs, SINGLE keeps outputs up to the signed index
//!    (earlier ones blanked) and both zero the other inputs' sequences
//! 3. ANYONECANPAY keeps only the signed input
//! 4. the 4-byte hash type is appended and the result double-SHA256ed
//!
//! The copy is never built; the serializer streams the modified fields.

use crate::constants::*;
use crate::error::ScriptError;
use crate::opcodes::OP_CODESEPARATOR;
use crate::reader::get_op;
use crate::types::{sha256d, Hash, Transaction};
use crate::wire::{write_compact_size, Encodable};

/// Hash type byte carried at the end of a signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SighashType(u32);

impl SighashType {
    pub fn from_u32(hash_type: u32) -> Self {
        SighashType(hash_type)
    }

    pub fn to_u32(self) -> u32 {
        self.0
    }

    pub fn base(self) -> u32 {
        self.0 & SIGHASH_BASE_MASK
    }

    pub fn is_none(self) -> bool {
        self.base() == SIGHASH_NONE
    }

    pub fn is_single(self) -> bool {
        self.base() == SIGHASH_SINGLE
    }

    pub fn anyone_can_pay(self) -> bool {
        self.0 & SIGHASH_ANYONECANPAY != 0
    }
}

/// Compute the digest a signature for `input_index` commits to.
///
/// SIGHASH_SINGLE without a matching output is an error rather than a
/// digest.
pub fn signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    hash_type: u32,
) -> Result<Hash, ScriptError> {
    let inputs = tx.inputs();
    let outputs = tx.outputs();
    if input_index >= inputs.len() {
        return Err(ScriptError::InputIndexOutOfRange);
    }
    let sighash = SighashType::from_u32(hash_type);
    if sighash.is_single() && input_index >= outputs.len() {
        return Err(ScriptError::SighashSingleOutOfRange);
    }

    let mut buf = Vec::with_capacity(128 + script_code.len() + 64 * inputs.len());
    buf.extend_from_slice(&tx.version().to_le_bytes());

    let signed_inputs: Vec<usize> = if sighash.anyone_can_pay() {
        vec![input_index]
    } else {
        (0..inputs.len()).collect()
    };
    write_compact_size(&mut buf, signed_inputs.len() as u64);
    for idx in signed_inputs {
        let input = &inputs[idx];
        input.previous_output.consensus_encode(&mut buf);
        if idx == input_index {
            serialize_script_code(&mut buf, script_code);
        } else {
            write_compact_size(&mut buf, 0);
        }
        let sequence = if idx != input_index && (sighash.is_none() || sighash.is_single()) {
            0
        } else {
            input.sequence
        };
        buf.extend_from_slice(&sequence.to_le_bytes());
    }

    let output_count = if sighash.is_none() {
        0
    } else if sighash.is_single() {
        input_index + 1
    } else {
        outputs.len()
    };
    write_compact_size(&mut buf, output_count as u64);
    for (idx, output) in outputs.iter().enumerate().take(output_count) {
        if sighash.is_single() && idx != input_index {
            buf.extend_from_slice(&(-1i64).to_le_bytes());
            write_compact_size(&mut buf, 0);
        } else {
            output.consensus_encode(&mut buf);
        }
    }

    buf.extend_from_slice(&tx.lock_time().to_le_bytes());
    buf.extend_from_slice(&hash_type.to_le_bytes());
    Ok(sha256d(&buf))
}

/// Write the script code with every OP_CODESEPARATOR removed
fn serialize_script_code(out: &mut Vec<u8>, script_code: &[u8]) {
    let mut separators = 0;
    let mut pc = 0;
    while let Some(ins) = get_op(script_code, &mut pc) {
        if ins.opcode == OP_CODESEPARATOR {
            separators += 1;
        }
    }
    write_compact_size(out, (script_code.len() - separators) as u64);

    let mut pc = 0;
    let mut begin = 0;
    while let Some(ins) = get_op(script_code, &mut pc) {
        if ins.opcode == OP_CODESEPARATOR {
            out.extend_from_slice(&script_code[begin..pc - 1]);
            begin = pc;
        }
    }
    if begin != script_code.len() {
        out.extend_from_slice(&script_code[begin..pc]);
    }
}
