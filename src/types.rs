//! Core transaction types for script validation

use crate::error::{ConsensusError, ScriptError};
use crate::reader::Script;
use crate::wire;
use bitcoin_hashes::{sha256d, Hash as BitcoinHash};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Hash type: 256-bit hash in internal byte order
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// Double SHA256
pub fn sha256d(data: &[u8]) -> Hash {
    sha256d::Hash::hash(data).into_inner()
}

/// Transaction identifier.
///
/// Stored in wire order (the raw double-SHA256 output). `Display` and
/// `FromStr` use the conventional reversed hex form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Txid(pub Hash);

impl Txid {
    /// The all-zero id used by coinbase outpoints
    pub const NULL: Txid = Txid([0u8; 32]);

    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.write_str(&hex::encode(reversed))
    }
}

impl fmt::Debug for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txid({})", self)
    }
}

impl FromStr for Txid {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| ConsensusError::InvalidTxid(format!("{}: {}", s, e)))?;
        bytes.reverse();
        Ok(Txid(bytes))
    }
}

impl Serialize for Txid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Txid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Reference to an output of a prior transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Txid,
    pub index: u32,
}

impl OutPoint {
    pub fn new(txid: Txid, index: u32) -> Self {
        OutPoint { txid, index }
    }

    /// The outpoint carried by coinbase inputs
    pub fn null() -> Self {
        OutPoint {
            txid: Txid::NULL,
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.txid.is_null() && self.index == u32::MAX
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub previous_output: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: i64,
    pub script_pubkey: Script,
}

impl TransactionOutput {
    pub fn new(value: i64, script_pubkey: Script) -> Self {
        TransactionOutput {
            value,
            script_pubkey,
        }
    }
}

/// The fields of a transaction without its cached identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBody {
    pub version: i32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
}

/// An immutable transaction.
///
/// The identifier is computed once, from the canonical encoding, when the
/// value is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TransactionBody", into = "TransactionBody")]
pub struct Transaction {
    body: TransactionBody,
    txid: Txid,
}

impl Transaction {
    pub fn new(
        version: i32,
        inputs: Vec<TransactionInput>,
        outputs: Vec<TransactionOutput>,
        lock_time: u32,
    ) -> Self {
        Transaction::from(TransactionBody {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    pub fn txid(&self) -> Txid {
        self.txid
    }

    pub fn version(&self) -> i32 {
        self.body.version
    }

    pub fn inputs(&self) -> &[TransactionInput] {
        &self.body.inputs
    }

    pub fn outputs(&self) -> &[TransactionOutput] {
        &self.body.outputs
    }

    pub fn lock_time(&self) -> u32 {
        self.body.lock_time
    }

    pub fn body(&self) -> &TransactionBody {
        &self.body
    }

    pub fn is_coinbase(&self) -> bool {
        self.body.inputs.len() == 1 && self.body.inputs[0].previous_output.is_null()
    }
}

impl From<TransactionBody> for Transaction {
    fn from(body: TransactionBody) -> Self {
        let txid = Txid(sha256d(&wire::encode_body(&body)));
        Transaction { body, txid }
    }
}

impl From<Transaction> for TransactionBody {
    fn from(tx: Transaction) -> Self {
        tx.body
    }
}

/// Outcome of validating one input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationResult {
    Valid,
    Invalid(ScriptError),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn failure(&self) -> Option<&ScriptError> {
        match self {
            ValidationResult::Valid => None,
            ValidationResult::Invalid(reason) => Some(reason),
        }
    }
}

impl From<std::result::Result<(), ScriptError>> for ValidationResult {
    fn from(result: std::result::Result<(), ScriptError>) -> Self {
        match result {
            Ok(()) => ValidationResult::Valid,
            Err(reason) => ValidationResult::Invalid(reason),
        }
    }
}
