//! Consensus-critical serialization of transactions.
//!
//! Layout: `version:i32le | count | inputs | count | outputs | lock_time:u32le`,
//! input = `txid[32] | index:u32le | script | sequence:u32le`,
//! output = `value:i64le | script`, where counts and script lengths are
//! compact-size integers that must use their shortest form.

use crate::constants::{MAX_SIZE, MIN_INPUT_SIZE, MIN_OUTPUT_SIZE};
use crate::error::WireFormatError;
use crate::reader::Script;
use crate::types::*;

pub type Result<T> = std::result::Result<T, WireFormatError>;

pub trait Encodable {
    fn consensus_encode(&self, out: &mut Vec<u8>);

    fn consensus_encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.consensus_encode(&mut buf);
        buf
    }
}

pub trait Decodable: Sized {
    fn consensus_decode(reader: &mut WireReader<'_>) -> Result<Self>;
}

/// Bounds-checked cursor over wire bytes
#[derive(Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        WireReader { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(WireFormatError::UnexpectedEnd {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.read_bytes(N)?);
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Read a compact size, rejecting encodings longer than necessary
    pub fn read_compact_size(&mut self) -> Result<u64> {
        let n = match self.read_u8()? {
            0xfd => {
                let n = self.read_u16()? as u64;
                if n < 0xfd {
                    return Err(WireFormatError::NonMinimalVarInt(n));
                }
                n
            }
            0xfe => {
                let n = self.read_u32()? as u64;
                if n <= 0xffff {
                    return Err(WireFormatError::NonMinimalVarInt(n));
                }
                n
            }
            0xff => {
                let n = self.read_u64()?;
                if n <= 0xffff_ffff {
                    return Err(WireFormatError::NonMinimalVarInt(n));
                }
                n
            }
            n => n as u64,
        };
        Ok(n)
    }

    /// Read an element count whose elements occupy at least `min_item_size` bytes each
    pub fn read_count(&mut self, min_item_size: usize) -> Result<usize> {
        let n = self.read_compact_size()?;
        if n > MAX_SIZE {
            return Err(WireFormatError::OversizedCount(n));
        }
        let n = n as usize;
        let needed = n.saturating_mul(min_item_size);
        if needed > self.remaining() {
            return Err(WireFormatError::UnexpectedEnd {
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(n)
    }

    /// Fail unless every byte was consumed
    pub fn finish(self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(WireFormatError::TrailingBytes(n)),
        }
    }
}

pub fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        out.push(n as u8);
    } else if n <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&n.to_le_bytes());
    }
}

/// Write a compact-size length followed by the bytes
pub fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

impl Encodable for Txid {
    fn consensus_encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

impl Decodable for Txid {
    fn consensus_decode(reader: &mut WireReader<'_>) -> Result<Self> {
        Ok(Txid(reader.read_array()?))
    }
}

impl Encodable for OutPoint {
    fn consensus_encode(&self, out: &mut Vec<u8>) {
        self.txid.consensus_encode(out);
        out.extend_from_slice(&self.index.to_le_bytes());
    }
}

impl Decodable for OutPoint {
    fn consensus_decode(reader: &mut WireReader<'_>) -> Result<Self> {
        Ok(OutPoint {
            txid: Txid::consensus_decode(reader)?,
            index: reader.read_u32()?,
        })
    }
}

impl Encodable for Script {
    fn consensus_encode(&self, out: &mut Vec<u8>) {
        write_var_bytes(out, self.as_bytes());
    }
}

impl Decodable for Script {
    fn consensus_decode(reader: &mut WireReader<'_>) -> Result<Self> {
        let len = reader.read_count(1)?;
        Ok(Script::from(reader.read_bytes(len)?.to_vec()))
    }
}

impl Encodable for TransactionInput {
    fn consensus_encode(&self, out: &mut Vec<u8>) {
        self.previous_output.consensus_encode(out);
        self.script_sig.consensus_encode(out);
        out.extend_from_slice(&self.sequence.to_le_bytes());
    }
}

impl Decodable for TransactionInput {
    fn consensus_decode(reader: &mut WireReader<'_>) -> Result<Self> {
        Ok(TransactionInput {
            previous_output: OutPoint::consensus_decode(reader)?,
            script_sig: Script::consensus_decode(reader)?,
            sequence: reader.read_u32()?,
        })
    }
}

impl Encodable for TransactionOutput {
    fn consensus_encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        self.script_pubkey.consensus_encode(out);
    }
}

impl Decodable for TransactionOutput {
    fn consensus_decode(reader: &mut WireReader<'_>) -> Result<Self> {
        Ok(TransactionOutput {
            value: reader.read_i64()?,
            script_pubkey: Script::consensus_decode(reader)?,
        })
    }
}

impl Encodable for TransactionBody {
    fn consensus_encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        write_compact_size(out, self.inputs.len() as u64);
        for input in &self.inputs {
            input.consensus_encode(out);
        }
        write_compact_size(out, self.outputs.len() as u64);
        for output in &self.outputs {
            output.consensus_encode(out);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
    }
}

impl Decodable for TransactionBody {
    fn consensus_decode(reader: &mut WireReader<'_>) -> Result<Self> {
        let version = reader.read_i32()?;

        let input_count = reader.read_count(MIN_INPUT_SIZE)?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(TransactionInput::consensus_decode(reader)?);
        }

        let output_count = reader.read_count(MIN_OUTPUT_SIZE)?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(TransactionOutput::consensus_decode(reader)?);
        }

        let lock_time = reader.read_u32()?;
        Ok(TransactionBody {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }
}

impl Encodable for Transaction {
    fn consensus_encode(&self, out: &mut Vec<u8>) {
        self.body().consensus_encode(out);
    }
}

pub(crate) fn encode_body(body: &TransactionBody) -> Vec<u8> {
    body.consensus_encode_to_vec()
}

/// Serialize a transaction to its wire form
pub fn encode_transaction(tx: &Transaction) -> Vec<u8> {
    tx.consensus_encode_to_vec()
}

/// Deserialize a transaction, requiring every byte to be consumed
pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction> {
    let mut reader = WireReader::new(bytes);
    let body = TransactionBody::consensus_decode(&mut reader)?;
    reader.finish()?;
    Ok(Transaction::from(body))
}

/// Deserialize a transaction from a hex dump
pub fn decode_transaction_hex(hex_str: &str) -> Result<Transaction> {
    let bytes = hex::decode(hex_str.trim())?;
    decode_transaction(&bytes)
}
