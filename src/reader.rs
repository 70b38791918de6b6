//! Script bytes, instruction parsing and the readable notation.
//!
//! The readable notation is a whitespace separated list of tokens:
//!
//! | token                         | meaning                                            |
//! |-------------------------------|----------------------------------------------------|
//! | `-1`, `0` … `16`              | `OP_1NEGATE`, `OP_0`, `OP_1` … `OP_16`             |
//! | other decimal integers        | push of the script-number encoding                 |
//! | `OP_DUP`, `dup`, `NOP2` …     | opcode mnemonic, `OP_` prefix optional             |
//! | `ab01`, `0x0a`                | data push using the shortest length opcode         |
//! | `PUSHDATA1:ab01`              | data push with an explicit length opcode           |
//!
//! Rendering picks the explicit `PUSHDATAn:` form exactly when the script
//! used a longer length prefix than necessary, so scripts survive a trip
//! through text unchanged.

use crate::error::{ConsensusError, Result, ScriptError};
use crate::opcodes::*;
use crate::redeem;
use crate::script::encode_num;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One parsed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    pub opcode: u8,
    /// Pushed bytes, present for every opcode up to `OP_PUSHDATA4`
    pub push: Option<&'a [u8]>,
}

/// Read the operation at `*pc` and advance past it.
///
/// Returns `None` at the end of the script or on a truncated push. On a
/// truncated push `*pc` is left wherever reading stopped, which matters
/// to the signature-hash script code serialization.
pub fn get_op<'a>(script: &'a [u8], pc: &mut usize) -> Option<Instruction<'a>> {
    let end = script.len();
    if *pc >= end {
        return None;
    }
    let opcode = script[*pc];
    *pc += 1;
    if opcode > OP_PUSHDATA4 {
        return Some(Instruction { opcode, push: None });
    }

    let size = match opcode {
        OP_PUSHDATA1 => {
            if end - *pc < 1 {
                return None;
            }
            let n = script[*pc] as usize;
            *pc += 1;
            n
        }
        OP_PUSHDATA2 => {
            if end - *pc < 2 {
                return None;
            }
            let n = u16::from_le_bytes([script[*pc], script[*pc + 1]]) as usize;
            *pc += 2;
            n
        }
        OP_PUSHDATA4 => {
            if end - *pc < 4 {
                return None;
            }
            let n = u32::from_le_bytes([
                script[*pc],
                script[*pc + 1],
                script[*pc + 2],
                script[*pc + 3],
            ]) as usize;
            *pc += 4;
            n
        }
        n => n as usize,
    };
    if end - *pc < size {
        return None;
    }
    let data = &script[*pc..*pc + size];
    *pc += size;
    Some(Instruction {
        opcode,
        push: Some(data),
    })
}

/// Iterator over the instructions of a script
pub struct Instructions<'a> {
    script: &'a [u8],
    pc: usize,
    failed: bool,
}

impl<'a> Instructions<'a> {
    /// Byte offset of the next instruction
    pub fn position(&self) -> usize {
        self.pc
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = std::result::Result<Instruction<'a>, ScriptError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pc >= self.script.len() {
            return None;
        }
        match get_op(self.script, &mut self.pc) {
            Some(ins) => Some(Ok(ins)),
            None => {
                self.failed = true;
                Some(Err(ScriptError::BadOpcode))
            }
        }
    }
}

/// Parse script bytes into instructions
pub fn parse_script(bytes: &[u8]) -> std::result::Result<Vec<Instruction<'_>>, ScriptError> {
    Instructions {
        script: bytes,
        pc: 0,
        failed: false,
    }
    .collect()
}

/// Length opcode a data push of `len` bytes uses by default
pub fn canonical_push_opcode(len: usize) -> u8 {
    if len < OP_PUSHDATA1 as usize {
        len as u8
    } else if len <= 0xff {
        OP_PUSHDATA1
    } else if len <= 0xffff {
        OP_PUSHDATA2
    } else {
        OP_PUSHDATA4
    }
}

fn write_push(out: &mut Vec<u8>, opcode: u8, data: &[u8]) {
    out.push(opcode);
    match opcode {
        OP_PUSHDATA1 => out.push(data.len() as u8),
        OP_PUSHDATA2 => out.extend_from_slice(&(data.len() as u16).to_le_bytes()),
        OP_PUSHDATA4 => out.extend_from_slice(&(data.len() as u32).to_le_bytes()),
        _ => {}
    }
    out.extend_from_slice(data);
}

/// Encode `data` as a single push with the shortest length prefix
pub fn push_data_bytes(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 5);
    write_push(&mut out, canonical_push_opcode(data.len()), data);
    out
}

/// Remove every occurrence of `pattern` that starts on an instruction boundary.
///
/// Returns the remaining bytes and the number of occurrences removed.
pub fn find_and_delete(script: &[u8], pattern: &[u8]) -> (Vec<u8>, usize) {
    if pattern.is_empty() {
        return (script.to_vec(), 0);
    }
    let mut found = 0;
    let mut result = Vec::with_capacity(script.len());
    let mut pc = 0;
    let mut pc2 = 0;
    loop {
        result.extend_from_slice(&script[pc2..pc]);
        while script.len() - pc >= pattern.len() && script[pc..].starts_with(pattern) {
            pc += pattern.len();
            found += 1;
        }
        pc2 = pc;
        if get_op(script, &mut pc).is_none() {
            break;
        }
    }
    if found == 0 {
        return (script.to_vec(), 0);
    }
    result.extend_from_slice(&script[pc2..]);
    (result, found)
}

/// True when every instruction is a push (`OP_RESERVED` counts as one)
pub fn is_push_only(bytes: &[u8]) -> bool {
    let mut pc = 0;
    while pc < bytes.len() {
        match get_op(bytes, &mut pc) {
            Some(ins) if ins.opcode <= OP_16 => {}
            _ => return false,
        }
    }
    true
}

/// An immutable script
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Script(Vec<u8>);

impl Script {
    pub fn new() -> Self {
        Script(Vec::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn instructions(&self) -> Instructions<'_> {
        Instructions {
            script: &self.0,
            pc: 0,
            failed: false,
        }
    }

    pub fn is_push_only(&self) -> bool {
        is_push_only(&self.0)
    }

    pub fn is_pay_to_script_hash(&self) -> bool {
        redeem::is_pay_to_script_hash(&self.0)
    }

    pub fn is_multisig(&self) -> bool {
        redeem::is_multisig(&self.0)
    }

    pub fn is_standard(&self) -> bool {
        redeem::is_standard(&self.0)
    }

    pub fn sig_op_count(&self, accurate: bool) -> usize {
        redeem::sig_op_count(&self.0, accurate)
    }

    /// Build a script from the readable notation
    pub fn from_readable(text: &str) -> Result<Script> {
        let mut out = Vec::new();
        for token in text.split_whitespace() {
            parse_token(token, &mut out)?;
        }
        Ok(Script(out))
    }

    /// Render the script in the readable notation.
    ///
    /// A script whose last push runs past the end has no readable form, since
    /// `from_readable` could not reproduce its bytes. Such scripts are still
    /// valid output scripts and fail only when executed, so callers that just
    /// want to display one should fall back to hex on `Err`.
    pub fn to_readable(&self) -> Result<String> {
        let mut tokens = Vec::new();
        let mut iter = self.instructions();
        loop {
            let start = iter.position();
            match iter.next() {
                None => break,
                Some(Ok(ins)) => tokens.push(render_instruction(&ins)),
                Some(Err(_)) => {
                    return Err(ConsensusError::ScriptSyntax(format!(
                        "truncated push at byte {}",
                        start
                    )))
                }
            }
        }
        Ok(tokens.join(" "))
    }
}

fn render_instruction(ins: &Instruction<'_>) -> String {
    if let Some(n) = small_int_value(ins.opcode) {
        return n.to_string();
    }
    match ins.push {
        Some(data) if canonical_push_opcode(data.len()) == ins.opcode => render_hex(data),
        Some(data) => format!("{}:{}", &opcode_name(ins.opcode)[3..], hex::encode(data)),
        None => opcode_name(ins.opcode),
    }
}

fn render_hex(data: &[u8]) -> String {
    let encoded = hex::encode(data);
    if encoded.bytes().all(|b| b.is_ascii_digit()) {
        format!("0x{}", encoded)
    } else {
        encoded
    }
}

fn syntax_error(token: &str, why: &str) -> ConsensusError {
    ConsensusError::ScriptSyntax(format!("{}: {}", token, why))
}

fn decode_hex_token(token: &str, hex_part: &str) -> Result<Vec<u8>> {
    hex::decode(hex_part).map_err(|e| syntax_error(token, &e.to_string()))
}

fn parse_token(token: &str, out: &mut Vec<u8>) -> Result<()> {
    let is_decimal = {
        let digits = token.strip_prefix('-').unwrap_or(token);
        !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
    };
    if is_decimal {
        let n: i64 = token
            .parse()
            .map_err(|_| syntax_error(token, "integer out of range"))?;
        match small_int_opcode(n) {
            Some(op) => out.push(op),
            None => {
                let data = encode_num(n);
                write_push(out, canonical_push_opcode(data.len()), &data);
            }
        }
        return Ok(());
    }

    if let Some(hex_part) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        let data = decode_hex_token(token, hex_part)?;
        write_push(out, canonical_push_opcode(data.len()), &data);
        return Ok(());
    }

    if let Some((prefix, hex_part)) = token.split_once(':') {
        let opcode = match opcode_from_name(prefix) {
            Some(op @ (OP_PUSHDATA1 | OP_PUSHDATA2 | OP_PUSHDATA4)) => op,
            _ => return Err(syntax_error(token, "unknown length prefix")),
        };
        let data = decode_hex_token(token, hex_part)?;
        let limit = match opcode {
            OP_PUSHDATA1 => 0xff,
            OP_PUSHDATA2 => 0xffff,
            _ => u32::MAX as usize,
        };
        if data.len() > limit {
            return Err(syntax_error(token, "data too long for length prefix"));
        }
        write_push(out, opcode, &data);
        return Ok(());
    }

    if let Some(op) = small_int_mnemonic(token).or_else(|| opcode_from_name(token)) {
        out.push(op);
        return Ok(());
    }

    if token.len() % 2 == 0 && token.bytes().all(|b| b.is_ascii_hexdigit()) {
        let data = decode_hex_token(token, token)?;
        write_push(out, canonical_push_opcode(data.len()), &data);
        return Ok(());
    }

    Err(syntax_error(token, "unrecognised token"))
}

/// `OP_0`..`OP_16` and `OP_1NEGATE` spelled as mnemonics
fn small_int_mnemonic(token: &str) -> Option<u8> {
    let upper = token.to_ascii_uppercase();
    let rest = upper.strip_prefix("OP_")?;
    if rest == "1NEGATE" {
        return Some(OP_1NEGATE);
    }
    let n: i64 = rest.parse().ok()?;
    if (0..=16).contains(&n) {
        small_int_opcode(n)
    } else {
        None
    }
}

impl From<Vec<u8>> for Script {
    fn from(bytes: Vec<u8>) -> Self {
        Script(bytes)
    }
}

impl From<&[u8]> for Script {
    fn from(bytes: &[u8]) -> Self {
        Script(bytes.to_vec())
    }
}

impl AsRef<[u8]> for Script {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_readable() {
            Ok(text) => write!(f, "Script({})", text),
            Err(_) => write!(f, "Script(0x{})", hex::encode(&self.0)),
        }
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_readable() {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "[malformed] {}", hex::encode(&self.0)),
        }
    }
}

impl Serialize for Script {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Script {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map(Script).map_err(serde::de::Error::custom)
    }
}

/// Incremental script construction
#[derive(Debug, Default)]
pub struct ScriptBuilder(Vec<u8>);

impl ScriptBuilder {
    pub fn new() -> Self {
        ScriptBuilder(Vec::new())
    }

    pub fn push_opcode(mut self, opcode: u8) -> Self {
        self.0.push(opcode);
        self
    }

    /// Push data with the shortest length prefix
    pub fn push_slice(mut self, data: &[u8]) -> Self {
        write_push(&mut self.0, canonical_push_opcode(data.len()), data);
        self
    }

    /// Push an integer, using the small-integer opcodes where possible
    pub fn push_int(self, n: i64) -> Self {
        match small_int_opcode(n) {
            Some(op) => self.push_opcode(op),
            None => self.push_slice(&encode_num(n)),
        }
    }

    pub fn into_script(self) -> Script {
        Script(self.0)
    }
}
