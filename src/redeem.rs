//! Script templates, multisig evaluation and P2SH redemption

use crate::constants::{
    MAX_OP_RETURN_RELAY, MAX_PUBKEYS_PER_MULTISIG, MAX_NUM_SIZE, MAX_SCRIPT_OPS,
    MAX_STANDARD_MULTISIG_KEYS,
};
use crate::error::ScriptError;
use crate::flags::RuleFlags;
use crate::opcodes::*;
use crate::reader::{find_and_delete, get_op, is_push_only, parse_script, push_data_bytes};
use crate::script::{cast_to_bool, decode_num, eval_script, stack_top, SignatureChecker};
use crate::signature::{check_pubkey_encoding, check_signature_encoding, is_valid_pubkey_size};
use crate::types::ByteString;
use tracing::trace;

/// `HASH160 <20 bytes> EQUAL`
pub fn is_pay_to_script_hash(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL
}

/// `DUP HASH160 <20 bytes> EQUALVERIFY CHECKSIG`
pub fn is_pay_to_pubkey_hash(script: &[u8]) -> bool {
    script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 0x14
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
}

/// `<key> CHECKSIG` with a key whose size matches its header byte
pub fn is_pay_to_pubkey(script: &[u8]) -> bool {
    let key_len = match script.len() {
        35 => 33,
        67 => 65,
        _ => return false,
    };
    script[0] as usize == key_len
        && script[key_len + 1] == OP_CHECKSIG
        && is_valid_pubkey_size(&script[1..=key_len])
}

/// `RETURN` followed only by pushes, within the relay size
pub fn is_null_data(script: &[u8]) -> bool {
    script.len() <= MAX_OP_RETURN_RELAY
        && script.first() == Some(&OP_RETURN)
        && is_push_only(&script[1..])
}

/// Required and total key counts with the keys of a bare multisig template
fn match_multisig(script: &[u8]) -> Option<(usize, Vec<&[u8]>)> {
    let ins = parse_script(script).ok()?;
    let (first, rest) = ins.split_first()?;
    let (last, rest) = rest.split_last()?;
    let (total, keys) = rest.split_last()?;
    if last.opcode != OP_CHECKMULTISIG {
        return None;
    }
    let required = match first.opcode {
        OP_1..=OP_16 => small_int_value(first.opcode)? as usize,
        _ => return None,
    };
    let total = match total.opcode {
        OP_1..=OP_16 => small_int_value(total.opcode)? as usize,
        _ => return None,
    };
    let keys: Vec<&[u8]> = keys
        .iter()
        .map(|k| k.push.filter(|data| data.len() == 33 || data.len() == 65))
        .collect::<Option<_>>()?;
    if keys.len() != total || required > total || total > MAX_PUBKEYS_PER_MULTISIG {
        return None;
    }
    Some((required, keys))
}

/// `OP_m <key>{n} OP_n CHECKMULTISIG` with 33- or 65-byte keys and `1 ≤ m ≤ n`
pub fn is_multisig(script: &[u8]) -> bool {
    match_multisig(script).is_some()
}

/// Whether a locking script matches a relay template
pub fn is_standard(script: &[u8]) -> bool {
    if is_pay_to_pubkey_hash(script)
        || is_pay_to_script_hash(script)
        || is_pay_to_pubkey(script)
        || is_null_data(script)
    {
        return true;
    }
    match match_multisig(script) {
        Some((_, keys)) => {
            keys.len() <= MAX_STANDARD_MULTISIG_KEYS
                && keys.iter().all(|key| is_valid_pubkey_size(key))
        }
        None => false,
    }
}

/// Count signature operations.
///
/// With `accurate`, a CHECKMULTISIG preceded by OP_1..OP_16 counts that
/// many keys; otherwise it counts the maximum of 20.
pub fn sig_op_count(script: &[u8], accurate: bool) -> usize {
    let mut count = 0;
    let mut last_opcode = OP_INVALIDOPCODE;
    let mut pc = 0;
    while let Some(ins) = get_op(script, &mut pc) {
        match ins.opcode {
            OP_CHECKSIG | OP_CHECKSIGVERIFY => count += 1,
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                count += match last_opcode {
                    OP_1..=OP_16 if accurate => (last_opcode - OP_1 + 1) as usize,
                    _ => MAX_PUBKEYS_PER_MULTISIG,
                };
            }
            _ => {}
        }
        last_opcode = ins.opcode;
    }
    count
}

/// Accurate signature operations of the redeem script revealed by `script_sig`
pub fn p2sh_sig_op_count(script_sig: &[u8], script_pubkey: &[u8]) -> usize {
    if !is_pay_to_script_hash(script_pubkey) {
        return sig_op_count(script_pubkey, true);
    }
    let mut redeem: &[u8] = &[];
    let mut pc = 0;
    while pc < script_sig.len() {
        match get_op(script_sig, &mut pc) {
            Some(ins) if ins.opcode <= OP_16 => redeem = ins.push.unwrap_or_default(),
            _ => return 0,
        }
    }
    sig_op_count(redeem, true)
}

/// Run CHECKMULTISIG on `stack`.
///
/// Consumes the key count, keys, signature count, signatures and the extra
/// dummy item, returning whether enough signatures matched. Signatures are
/// tried against keys from the top of the stack down, so they must appear
/// in key order.
pub fn check_multisig(
    stack: &mut Vec<ByteString>,
    script_code: &[u8],
    op_count: &mut usize,
    flags: RuleFlags,
    checker: &dyn SignatureChecker,
) -> Result<bool, ScriptError> {
    let minimal = flags.contains(RuleFlags::MINIMALDATA);

    let mut i = 1;
    let keys_count = decode_num(stack_top(stack, i)?, minimal, MAX_NUM_SIZE)?;
    if keys_count < 0 || keys_count > MAX_PUBKEYS_PER_MULTISIG as i64 {
        return Err(ScriptError::PubkeyCount);
    }
    let mut keys_count = keys_count as usize;
    *op_count += keys_count;
    if *op_count > MAX_SCRIPT_OPS {
        return Err(ScriptError::OpCount);
    }
    i += 1;
    let mut ikey = i;
    // Depth of the last key, for NULLFAIL during cleanup
    let mut ikey2 = keys_count + 2;
    i += keys_count;

    let sigs_count = decode_num(stack_top(stack, i)?, minimal, MAX_NUM_SIZE)?;
    if sigs_count < 0 || sigs_count > keys_count as i64 {
        return Err(ScriptError::SigCount);
    }
    let mut sigs_count = sigs_count as usize;
    i += 1;
    let mut isig = i;
    i += sigs_count;
    if stack.len() < i {
        return Err(ScriptError::InvalidStackOperation);
    }

    // Signatures can't sign themselves
    let mut code = script_code.to_vec();
    for k in 0..sigs_count {
        let sig = stack_top(stack, isig + k)?;
        let (cleaned, found) = find_and_delete(&code, &push_data_bytes(sig));
        if found > 0 && flags.contains(RuleFlags::CONST_SCRIPTCODE) {
            return Err(ScriptError::SigFindAndDelete);
        }
        code = cleaned;
    }

    let mut success = true;
    while success && sigs_count > 0 {
        let sig = stack_top(stack, isig)?;
        let pubkey = stack_top(stack, ikey)?;
        check_signature_encoding(sig, flags)?;
        check_pubkey_encoding(pubkey, flags)?;
        if checker.check_sig(sig, pubkey, &code, flags)? {
            isig += 1;
            sigs_count -= 1;
        }
        ikey += 1;
        keys_count -= 1;
        // More signatures left than keys means failure
        if sigs_count > keys_count {
            success = false;
        }
    }

    // Pop everything but the dummy
    while i > 1 {
        i -= 1;
        if !success
            && flags.contains(RuleFlags::NULLFAIL)
            && ikey2 == 0
            && !stack_top(stack, 1)?.is_empty()
        {
            return Err(ScriptError::NullFail);
        }
        ikey2 = ikey2.saturating_sub(1);
        stack.pop();
    }

    // Historical off-by-one: one extra item is consumed
    let dummy = stack.pop().ok_or(ScriptError::InvalidStackOperation)?;
    if flags.contains(RuleFlags::NULLDUMMY) && !dummy.is_empty() {
        return Err(ScriptError::SigNullDummy);
    }
    Ok(success)
}

/// Evaluate the redeem script of a P2SH spend.
///
/// `stack` is the image left by the scriptSig; its top item is the
/// serialized redeem script. Returns the stack after the redeem script ran.
pub fn evaluate_p2sh(
    script_sig: &[u8],
    stack: Vec<ByteString>,
    flags: RuleFlags,
    checker: &dyn SignatureChecker,
) -> Result<Vec<ByteString>, ScriptError> {
    if !is_push_only(script_sig) {
        return Err(ScriptError::SigPushOnly);
    }
    let mut stack = stack;
    let redeem_script = stack.pop().ok_or(ScriptError::InvalidStackOperation)?;
    trace!(
        redeem_len = redeem_script.len(),
        redeem_sigops = sig_op_count(&redeem_script, true),
        "evaluating P2SH redeem script"
    );

    eval_script(&mut stack, &redeem_script, flags, checker)?;
    match stack.last() {
        Some(top) if cast_to_bool(top) => Ok(stack),
        _ => Err(ScriptError::EvalFalse),
    }
}
