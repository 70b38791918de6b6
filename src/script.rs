//! Script execution engine
//!
//! EvalScript: 𝒮𝒞 × 𝒮𝒯 × ℱ → 𝒮𝒯 ∪ {error}
//!
//! Scripts run on a stack machine with an alt stack and a condition stack:
//! 1. Reject scripts over 10 000 bytes
//! 2. For each instruction, whether or not its branch executes:
//!    - pushes over 520 bytes, more than 201 non-push opcodes and disabled
//!      opcodes fail the script
//! 3. Executed pushes go on the stack; executed opcodes and all of
//!    IF/NOTIF/ELSE/ENDIF go through the opcode switch
//! 4. |stack| + |altstack| ≤ 1000 after every instruction
//! 5. Every IF must be closed by the end of the script

use crate::constants::*;
use crate::error::ScriptError;
use crate::flags::RuleFlags;
use crate::opcodes::*;
use crate::reader::{find_and_delete, get_op, push_data_bytes};
use crate::redeem;
use crate::signature::{check_pubkey_encoding, check_signature_encoding};
use crate::types::ByteString;
use bitcoin_hashes::{sha1, sha256d, Hash as _};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Transaction-side checks the interpreter delegates
pub trait SignatureChecker {
    /// Verify `sig` (hash type byte included) for `pubkey` over `script_code`.
    ///
    /// Encoding rules have already been applied by the caller.
    fn check_sig(
        &self,
        sig: &[u8],
        pubkey: &[u8],
        script_code: &[u8],
        flags: RuleFlags,
    ) -> Result<bool, ScriptError>;

    fn check_lock_time(&self, _lock_time: i64) -> bool {
        false
    }

    fn check_sequence(&self, _sequence: i64) -> bool {
        false
    }
}

/// Checker with no transaction: every signature and lock time fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSignatureChecker;

impl SignatureChecker for NoSignatureChecker {
    fn check_sig(&self, _: &[u8], _: &[u8], _: &[u8], _: RuleFlags) -> Result<bool, ScriptError> {
        Ok(false)
    }
}

/// Minimal little-endian sign-magnitude encoding
pub fn encode_num(n: i64) -> ByteString {
    if n == 0 {
        return Vec::new();
    }
    let negative = n < 0;
    let mut abs = n.unsigned_abs();
    let mut out = Vec::with_capacity(9);
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    // The sign lives in the high bit of the last byte
    let last = out.len() - 1;
    if out[last] & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        out[last] |= 0x80;
    }
    out
}

/// Decode a numeric operand of at most `max_size` bytes
pub fn decode_num(data: &[u8], require_minimal: bool, max_size: usize) -> Result<i64, ScriptError> {
    if data.len() > max_size || data.len() > 8 {
        return Err(ScriptError::NumberOverflow);
    }
    let Some((&last, rest)) = data.split_last() else {
        return Ok(0);
    };
    if require_minimal && last & 0x7f == 0 {
        // A trailing sign byte is only allowed when the byte before it needs its high bit
        match rest.last() {
            Some(&prev) if prev & 0x80 != 0 => {}
            _ => return Err(ScriptError::NonMinimalNumber),
        }
    }
    let mut result: i64 = 0;
    for (i, byte) in data.iter().enumerate() {
        result |= (*byte as i64) << (8 * i);
    }
    if last & 0x80 != 0 {
        let mask = !(0x80i64 << (8 * (data.len() - 1)));
        Ok(-(result & mask))
    } else {
        Ok(result)
    }
}

/// False for empty and all-zero items, including negative zero
pub fn cast_to_bool(data: &[u8]) -> bool {
    for (i, byte) in data.iter().enumerate() {
        if *byte != 0 {
            return !(i == data.len() - 1 && *byte == 0x80);
        }
    }
    false
}

/// Whether `data` was pushed with the shortest possible opcode
pub fn check_minimal_push(data: &[u8], opcode: u8) -> bool {
    match data.len() {
        0 => opcode == OP_0,
        1 if (1..=16).contains(&data[0]) => false,
        1 if data[0] == 0x81 => false,
        len if len < OP_PUSHDATA1 as usize => opcode as usize == len,
        len if len <= 0xff => opcode == OP_PUSHDATA1,
        len if len <= 0xffff => opcode == OP_PUSHDATA2,
        _ => true,
    }
}

pub(crate) fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    Ripemd160::digest(sha).into()
}

/// Item `depth` places from the top (1 is the top)
pub(crate) fn stack_top(stack: &[ByteString], depth: usize) -> Result<&ByteString, ScriptError> {
    if depth == 0 || depth > stack.len() {
        return Err(ScriptError::InvalidStackOperation);
    }
    Ok(&stack[stack.len() - depth])
}

pub(crate) fn pop(stack: &mut Vec<ByteString>) -> Result<ByteString, ScriptError> {
    stack.pop().ok_or(ScriptError::InvalidStackOperation)
}

fn require(stack: &[ByteString], n: usize) -> Result<(), ScriptError> {
    if stack.len() < n {
        return Err(ScriptError::InvalidStackOperation);
    }
    Ok(())
}

pub(crate) fn push_bool(stack: &mut Vec<ByteString>, value: bool) {
    stack.push(if value { vec![1] } else { Vec::new() });
}

/// Execute `script` on `stack`
pub fn eval_script(
    stack: &mut Vec<ByteString>,
    script: &[u8],
    flags: RuleFlags,
    checker: &dyn SignatureChecker,
) -> Result<(), ScriptError> {
    if script.len() > MAX_SCRIPT_SIZE {
        return Err(ScriptError::ScriptSize);
    }
    Interpreter {
        script,
        flags,
        checker,
        stack,
        altstack: Vec::new(),
        exec_stack: Vec::new(),
        code_start: 0,
        op_count: 0,
    }
    .run()
}

struct Interpreter<'a> {
    script: &'a [u8],
    flags: RuleFlags,
    checker: &'a dyn SignatureChecker,
    stack: &'a mut Vec<ByteString>,
    altstack: Vec<ByteString>,
    exec_stack: Vec<bool>,
    /// Start of the script code hashed by signature checks
    code_start: usize,
    op_count: usize,
}

impl<'a> Interpreter<'a> {
    fn run(&mut self) -> Result<(), ScriptError> {
        let mut pc = 0;
        while pc < self.script.len() {
            let executing = !self.exec_stack.contains(&false);
            let ins = get_op(self.script, &mut pc).ok_or(ScriptError::BadOpcode)?;
            let opcode = ins.opcode;

            if ins.push.map_or(false, |data| data.len() > MAX_SCRIPT_ELEMENT_SIZE) {
                return Err(ScriptError::PushSize);
            }
            if opcode > OP_16 {
                self.op_count += 1;
                if self.op_count > MAX_SCRIPT_OPS {
                    return Err(ScriptError::OpCount);
                }
            }
            if is_disabled(opcode) {
                return Err(ScriptError::DisabledOpcode);
            }
            if opcode == OP_CODESEPARATOR && self.flags.contains(RuleFlags::CONST_SCRIPTCODE) {
                return Err(ScriptError::OpCodeSeparator);
            }

            if executing && opcode <= OP_PUSHDATA4 {
                let data = ins.push.unwrap_or_default();
                if self.flags.contains(RuleFlags::MINIMALDATA) && !check_minimal_push(data, opcode) {
                    return Err(ScriptError::MinimalData);
                }
                self.stack.push(data.to_vec());
            } else if executing || (OP_IF..=OP_ENDIF).contains(&opcode) {
                self.step(opcode, pc, executing)?;
            }

            if self.stack.len() + self.altstack.len() > MAX_STACK_SIZE {
                return Err(ScriptError::StackSize);
            }
        }
        if !self.exec_stack.is_empty() {
            return Err(ScriptError::UnbalancedConditional);
        }
        Ok(())
    }

    fn num(&self, depth: usize) -> Result<i64, ScriptError> {
        decode_num(
            stack_top(&self.stack[..], depth)?,
            self.flags.contains(RuleFlags::MINIMALDATA),
            MAX_NUM_SIZE,
        )
    }

    fn discourage_nop(&self) -> Result<(), ScriptError> {
        if self.flags.contains(RuleFlags::DISCOURAGE_UPGRADABLE_NOPS) {
            return Err(ScriptError::DiscourageUpgradableNops);
        }
        Ok(())
    }

    fn step(&mut self, opcode: u8, pc: usize, executing: bool) -> Result<(), ScriptError> {
        let stack = &mut *self.stack;
        match opcode {
            OP_1NEGATE | OP_1..=OP_16 => {
                let n = small_int_value(opcode).unwrap_or_default();
                stack.push(encode_num(n));
            }

            // Control
            OP_NOP => {}
            OP_NOP1 | OP_NOP4..=OP_NOP10 => self.discourage_nop()?,
            OP_CHECKLOCKTIMEVERIFY => {
                if !self.flags.contains(RuleFlags::CHECKLOCKTIMEVERIFY) {
                    return self.discourage_nop();
                }
                let lock_time = decode_num(
                    stack_top(stack, 1)?,
                    self.flags.contains(RuleFlags::MINIMALDATA),
                    MAX_LOCKTIME_NUM_SIZE,
                )?;
                if lock_time < 0 {
                    return Err(ScriptError::NegativeLockTime);
                }
                if !self.checker.check_lock_time(lock_time) {
                    return Err(ScriptError::UnsatisfiedLockTime);
                }
            }
            OP_CHECKSEQUENCEVERIFY => {
                if !self.flags.contains(RuleFlags::CHECKSEQUENCEVERIFY) {
                    return self.discourage_nop();
                }
                let sequence = decode_num(
                    stack_top(stack, 1)?,
                    self.flags.contains(RuleFlags::MINIMALDATA),
                    MAX_LOCKTIME_NUM_SIZE,
                )?;
                if sequence < 0 {
                    return Err(ScriptError::NegativeLockTime);
                }
                // Disabled relative lock times behave as a NOP
                if sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG as i64 == 0
                    && !self.checker.check_sequence(sequence)
                {
                    return Err(ScriptError::UnsatisfiedLockTime);
                }
            }
            OP_IF | OP_NOTIF => {
                let mut value = false;
                if executing {
                    let top = stack.pop().ok_or(ScriptError::UnbalancedConditional)?;
                    value = cast_to_bool(&top);
                    if opcode == OP_NOTIF {
                        value = !value;
                    }
                }
                self.exec_stack.push(value);
            }
            OP_ELSE => {
                let top = self
                    .exec_stack
                    .last_mut()
                    .ok_or(ScriptError::UnbalancedConditional)?;
                *top = !*top;
            }
            OP_ENDIF => {
                self.exec_stack
                    .pop()
                    .ok_or(ScriptError::UnbalancedConditional)?;
            }
            OP_VERIFY => {
                if !cast_to_bool(stack_top(stack, 1)?) {
                    return Err(ScriptError::Verify);
                }
                stack.pop();
            }
            OP_RETURN => return Err(ScriptError::OpReturn),

            // Stack
            OP_TOALTSTACK => {
                let item = pop(stack)?;
                self.altstack.push(item);
            }
            OP_FROMALTSTACK => {
                let item = self
                    .altstack
                    .pop()
                    .ok_or(ScriptError::InvalidAltstackOperation)?;
                stack.push(item);
            }
            OP_2DROP => {
                require(stack, 2)?;
                stack.truncate(stack.len() - 2);
            }
            OP_2DUP => {
                require(stack, 2)?;
                let len = stack.len();
                stack.extend_from_within(len - 2..);
            }
            OP_3DUP => {
                require(stack, 3)?;
                let len = stack.len();
                stack.extend_from_within(len - 3..);
            }
            OP_2OVER => {
                require(stack, 4)?;
                let len = stack.len();
                stack.extend_from_within(len - 4..len - 2);
            }
            OP_2ROT => {
                require(stack, 6)?;
                let len = stack.len();
                let moved: Vec<ByteString> = stack.drain(len - 6..len - 4).collect();
                stack.extend(moved);
            }
            OP_2SWAP => {
                require(stack, 4)?;
                let len = stack.len();
                stack.swap(len - 4, len - 2);
                stack.swap(len - 3, len - 1);
            }
            OP_IFDUP => {
                let top = stack_top(stack, 1)?;
                if cast_to_bool(top) {
                    let copy = top.clone();
                    stack.push(copy);
                }
            }
            OP_DEPTH => {
                let depth = encode_num(stack.len() as i64);
                stack.push(depth);
            }
            OP_DROP => {
                pop(stack)?;
            }
            OP_DUP => {
                let copy = stack_top(stack, 1)?.clone();
                stack.push(copy);
            }
            OP_NIP => {
                require(stack, 2)?;
                let len = stack.len();
                stack.remove(len - 2);
            }
            OP_OVER => {
                let copy = stack_top(stack, 2)?.clone();
                stack.push(copy);
            }
            OP_PICK | OP_ROLL => {
                require(stack, 2)?;
                let n = self.num(1)?;
                let stack = &mut *self.stack;
                stack.pop();
                if n < 0 || n as usize >= stack.len() {
                    return Err(ScriptError::InvalidStackOperation);
                }
                let index = stack.len() - 1 - n as usize;
                let item = if opcode == OP_ROLL {
                    stack.remove(index)
                } else {
                    stack[index].clone()
                };
                stack.push(item);
            }
            OP_ROT => {
                require(stack, 3)?;
                let len = stack.len();
                stack.swap(len - 3, len - 2);
                stack.swap(len - 2, len - 1);
            }
            OP_SWAP => {
                require(stack, 2)?;
                let len = stack.len();
                stack.swap(len - 2, len - 1);
            }
            OP_TUCK => {
                require(stack, 2)?;
                let top = stack[stack.len() - 1].clone();
                let len = stack.len();
                stack.insert(len - 2, top);
            }
            OP_SIZE => {
                let size = encode_num(stack_top(stack, 1)?.len() as i64);
                stack.push(size);
            }

            // Bitwise
            OP_EQUAL | OP_EQUALVERIFY => {
                require(stack, 2)?;
                let equal = stack_top(stack, 2)? == stack_top(stack, 1)?;
                stack.truncate(stack.len() - 2);
                push_bool(stack, equal);
                if opcode == OP_EQUALVERIFY {
                    if !equal {
                        return Err(ScriptError::EqualVerify);
                    }
                    stack.pop();
                }
            }

            // Numeric
            OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
                let n = self.num(1)?;
                let result = match opcode {
                    OP_1ADD => n + 1,
                    OP_1SUB => n - 1,
                    OP_NEGATE => -n,
                    OP_ABS => n.abs(),
                    OP_NOT => (n == 0) as i64,
                    _ => (n != 0) as i64,
                };
                let stack = &mut *self.stack;
                stack.pop();
                stack.push(encode_num(result));
            }
            OP_ADD | OP_SUB | OP_BOOLAND | OP_BOOLOR | OP_NUMEQUAL | OP_NUMEQUALVERIFY
            | OP_NUMNOTEQUAL | OP_LESSTHAN | OP_GREATERTHAN | OP_LESSTHANOREQUAL
            | OP_GREATERTHANOREQUAL | OP_MIN | OP_MAX => {
                require(stack, 2)?;
                let a = self.num(2)?;
                let b = self.num(1)?;
                let result = match opcode {
                    OP_ADD => a + b,
                    OP_SUB => a - b,
                    OP_BOOLAND => (a != 0 && b != 0) as i64,
                    OP_BOOLOR => (a != 0 || b != 0) as i64,
                    OP_NUMEQUAL | OP_NUMEQUALVERIFY => (a == b) as i64,
                    OP_NUMNOTEQUAL => (a != b) as i64,
                    OP_LESSTHAN => (a < b) as i64,
                    OP_GREATERTHAN => (a > b) as i64,
                    OP_LESSTHANOREQUAL => (a <= b) as i64,
                    OP_GREATERTHANOREQUAL => (a >= b) as i64,
                    OP_MIN => a.min(b),
                    _ => a.max(b),
                };
                let stack = &mut *self.stack;
                stack.truncate(stack.len() - 2);
                stack.push(encode_num(result));
                if opcode == OP_NUMEQUALVERIFY {
                    if result == 0 {
                        return Err(ScriptError::NumEqualVerify);
                    }
                    stack.pop();
                }
            }
            OP_WITHIN => {
                require(stack, 3)?;
                let x = self.num(3)?;
                let min = self.num(2)?;
                let max = self.num(1)?;
                let stack = &mut *self.stack;
                stack.truncate(stack.len() - 3);
                push_bool(stack, min <= x && x < max);
            }

            // Crypto
            OP_RIPEMD160 | OP_SHA1 | OP_SHA256 | OP_HASH160 | OP_HASH256 => {
                let item = pop(stack)?;
                let digest = match opcode {
                    OP_RIPEMD160 => Ripemd160::digest(&item).to_vec(),
                    OP_SHA1 => sha1::Hash::hash(&item).into_inner().to_vec(),
                    OP_SHA256 => Sha256::digest(&item).to_vec(),
                    OP_HASH160 => hash160(&item).to_vec(),
                    _ => sha256d::Hash::hash(&item).into_inner().to_vec(),
                };
                stack.push(digest);
            }
            OP_CODESEPARATOR => self.code_start = pc,
            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                let success = self.check_sig()?;
                let stack = &mut *self.stack;
                push_bool(stack, success);
                if opcode == OP_CHECKSIGVERIFY {
                    if !success {
                        return Err(ScriptError::CheckSigVerify);
                    }
                    stack.pop();
                }
            }
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                let script_code = &self.script[self.code_start..];
                let success = redeem::check_multisig(
                    self.stack,
                    script_code,
                    &mut self.op_count,
                    self.flags,
                    self.checker,
                )?;
                push_bool(self.stack, success);
                if opcode == OP_CHECKMULTISIGVERIFY {
                    if !success {
                        return Err(ScriptError::CheckMultiSigVerify);
                    }
                    self.stack.pop();
                }
            }

            // OP_RESERVED, OP_VER, OP_VERIF, OP_VERNOTIF, OP_RESERVED1/2 and undefined opcodes
            _ => return Err(ScriptError::BadOpcode),
        }
        Ok(())
    }

    /// Pops the pubkey and signature, leaving the result for the caller to push
    fn check_sig(&mut self) -> Result<bool, ScriptError> {
        require(&self.stack[..], 2)?;
        let sig = stack_top(&self.stack[..], 2)?.clone();
        let pubkey = stack_top(&self.stack[..], 1)?.clone();

        // A signature can't sign itself
        let (script_code, found) =
            find_and_delete(&self.script[self.code_start..], &push_data_bytes(&sig));
        if found > 0 && self.flags.contains(RuleFlags::CONST_SCRIPTCODE) {
            return Err(ScriptError::SigFindAndDelete);
        }

        check_signature_encoding(&sig, self.flags)?;
        check_pubkey_encoding(&pubkey, self.flags)?;
        let success = self
            .checker
            .check_sig(&sig, &pubkey, &script_code, self.flags)?;
        if !success && self.flags.contains(RuleFlags::NULLFAIL) && !sig.is_empty() {
            return Err(ScriptError::NullFail);
        }

        let len = self.stack.len();
        self.stack.truncate(len - 2);
        Ok(success)
    }
}

/// VerifyScript: 𝒮𝒞 × 𝒮𝒞 × ℱ → {ok, error}
///
/// 1. Run scriptSig on an empty stack
/// 2. Run scriptPubKey on the result; the top item must be true
/// 3. For P2SH outputs, run the serialized redeem script from the scriptSig
/// 4. Under CLEANSTACK exactly one item may remain
pub fn verify_script(
    script_sig: &[u8],
    script_pubkey: &[u8],
    flags: RuleFlags,
    checker: &dyn SignatureChecker,
) -> Result<(), ScriptError> {
    if flags.contains(RuleFlags::SIGPUSHONLY) && !crate::reader::is_push_only(script_sig) {
        return Err(ScriptError::SigPushOnly);
    }
    if flags.contains(RuleFlags::CLEANSTACK) && !flags.contains(RuleFlags::P2SH) {
        return Err(ScriptError::UnsupportedFlags(
            "CLEANSTACK requires P2SH".to_string(),
        ));
    }

    let mut stack = Vec::new();
    eval_script(&mut stack, script_sig, flags, checker)?;
    let after_sig = if flags.contains(RuleFlags::P2SH) {
        Some(stack.clone())
    } else {
        None
    };

    eval_script(&mut stack, script_pubkey, flags, checker)?;
    match stack.last() {
        Some(top) if cast_to_bool(top) => {}
        _ => return Err(ScriptError::EvalFalse),
    }

    if let Some(after_sig) = after_sig {
        if redeem::is_pay_to_script_hash(script_pubkey) {
            stack = redeem::evaluate_p2sh(script_sig, after_sig, flags, checker)?;
        }
    }

    if flags.contains(RuleFlags::CLEANSTACK) && stack.len() != 1 {
        return Err(ScriptError::CleanStack);
    }
    Ok(())
}
