//! Script consensus limits and encoding constants

/// Maximum script length in bytes
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum size of a single pushed stack element
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum combined size of the main and alt stacks during execution
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum number of non-push operations per script
pub const MAX_SCRIPT_OPS: usize = 201;

/// Maximum number of public keys in a CHECKMULTISIG
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// Maximum byte width of a numeric operand
pub const MAX_NUM_SIZE: usize = 4;

/// Numeric operand width accepted by CHECKLOCKTIMEVERIFY and CHECKSEQUENCEVERIFY
pub const MAX_LOCKTIME_NUM_SIZE: usize = 5;

/// Largest count or length accepted by the wire decoder
pub const MAX_SIZE: u64 = 0x0200_0000;

/// Serialized size of an input with an empty script (outpoint, length byte, sequence)
pub const MIN_INPUT_SIZE: usize = 32 + 4 + 1 + 4;

/// Serialized size of an output with an empty script (value, length byte)
pub const MIN_OUTPUT_SIZE: usize = 8 + 1;

/// Largest null-data output considered standard
pub const MAX_OP_RETURN_RELAY: usize = 83;

/// Largest bare multisig key count considered standard
pub const MAX_STANDARD_MULTISIG_KEYS: usize = 3;

/// Lock time threshold: lock times below this are block heights
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Sequence number of a final input
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Relative lock-time disable bit (BIP68)
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;

/// Relative lock-time unit bit: set means 512-second units
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;

/// Relative lock-time value mask
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_ffff;

/// Sighash modes
pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_NONE: u32 = 0x02;
pub const SIGHASH_SINGLE: u32 = 0x03;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

/// Mask selecting the base sighash mode
pub const SIGHASH_BASE_MASK: u32 = 0x1f;
