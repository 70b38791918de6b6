//! Signature and public key encoding rules and ECDSA verification

use crate::error::ScriptError;
use crate::flags::RuleFlags;
use crate::types::Hash;
use crate::constants::{SIGHASH_ALL, SIGHASH_ANYONECANPAY, SIGHASH_SINGLE};
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, VerifyOnly};
use std::sync::OnceLock;

fn secp() -> &'static Secp256k1<VerifyOnly> {
    static CONTEXT: OnceLock<Secp256k1<VerifyOnly>> = OnceLock::new();
    CONTEXT.get_or_init(Secp256k1::verification_only)
}

/// Strict DER check (BIP66) of a signature that still carries its hash type byte.
///
/// Format: `0x30 [total-length] 0x02 [R-length] [R] 0x02 [S-length] [S] [sighash]`
pub fn is_valid_signature_encoding(sig: &[u8]) -> bool {
    // Minimum and maximum size constraints
    if sig.len() < 9 || sig.len() > 73 {
        return false;
    }
    // A signature is of type 0x30 (compound) covering everything but the hash type
    if sig[0] != 0x30 || sig[1] as usize != sig.len() - 3 {
        return false;
    }

    let len_r = sig[3] as usize;
    if 5 + len_r >= sig.len() {
        return false;
    }
    let len_s = sig[5 + len_r] as usize;
    if len_r + len_s + 7 != sig.len() {
        return false;
    }

    // R: integer marker, non-empty, not negative, no needless padding
    if sig[2] != 0x02 || len_r == 0 || sig[4] & 0x80 != 0 {
        return false;
    }
    if len_r > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return false;
    }

    // S: same rules
    if sig[len_r + 4] != 0x02 || len_s == 0 || sig[len_r + 6] & 0x80 != 0 {
        return false;
    }
    if len_s > 1 && sig[len_r + 6] == 0x00 && sig[len_r + 7] & 0x80 == 0 {
        return false;
    }
    true
}

/// True when the S value of a hash-type-suffixed signature is in the lower half of the order
pub fn is_low_der_signature(sig: &[u8]) -> bool {
    let Some((_, der)) = sig.split_last() else {
        return false;
    };
    match Signature::from_der_lax(der) {
        Ok(parsed) => {
            let mut normalized = parsed;
            normalized.normalize_s();
            normalized == parsed
        }
        Err(_) => false,
    }
}

/// Hash type byte is ALL, NONE or SINGLE, optionally with ANYONECANPAY
pub fn is_defined_hashtype_signature(sig: &[u8]) -> bool {
    match sig.last() {
        Some(&last) => {
            let base = last as u32 & !SIGHASH_ANYONECANPAY;
            (SIGHASH_ALL..=SIGHASH_SINGLE).contains(&base)
        }
        None => false,
    }
}

/// 33-byte compressed (02/03) or 65-byte uncompressed (04) key
pub fn is_compressed_or_uncompressed_pubkey(pubkey: &[u8]) -> bool {
    match pubkey.first() {
        Some(0x04) => pubkey.len() == 65,
        Some(0x02) | Some(0x03) => pubkey.len() == 33,
        _ => false,
    }
}

/// Length implied by the key's header byte matches its actual length
pub fn is_valid_pubkey_size(pubkey: &[u8]) -> bool {
    match pubkey.first() {
        Some(0x02) | Some(0x03) => pubkey.len() == 33,
        Some(0x04) | Some(0x06) | Some(0x07) => pubkey.len() == 65,
        _ => false,
    }
}

/// Apply the signature encoding rules the flags ask for. An empty signature always passes.
pub fn check_signature_encoding(sig: &[u8], flags: RuleFlags) -> Result<(), ScriptError> {
    if sig.is_empty() {
        return Ok(());
    }
    let strict = RuleFlags::DERSIG
        .with(RuleFlags::LOW_S)
        .with(RuleFlags::STRICTENC);
    if flags.bits() & strict.bits() != 0 && !is_valid_signature_encoding(sig) {
        return Err(ScriptError::SigDer);
    }
    if flags.contains(RuleFlags::LOW_S) && !is_low_der_signature(sig) {
        return Err(ScriptError::SigHighS);
    }
    if flags.contains(RuleFlags::STRICTENC) && !is_defined_hashtype_signature(sig) {
        return Err(ScriptError::SigHashType);
    }
    Ok(())
}

pub fn check_pubkey_encoding(pubkey: &[u8], flags: RuleFlags) -> Result<(), ScriptError> {
    if flags.contains(RuleFlags::STRICTENC) && !is_compressed_or_uncompressed_pubkey(pubkey) {
        return Err(ScriptError::PubkeyType);
    }
    Ok(())
}

/// Parse a public key the way consensus does (hybrid keys included)
pub fn parse_public_key(pubkey: &[u8]) -> Option<PublicKey> {
    if !is_valid_pubkey_size(pubkey) {
        return None;
    }
    PublicKey::from_slice(pubkey).ok()
}

/// ECDSA check of a DER signature (hash type already removed).
///
/// Parsing is lax and S is normalized before verification.
pub fn verify_ecdsa(der: &[u8], pubkey: &[u8], digest: &Hash) -> bool {
    let Some(key) = parse_public_key(pubkey) else {
        return false;
    };
    if der.is_empty() {
        return false;
    }
    let Ok(mut sig) = Signature::from_der_lax(der) else {
        return false;
    };
    sig.normalize_s();
    let Ok(msg) = Message::from_digest_slice(digest) else {
        return false;
    };
    secp().verify_ecdsa(&msg, &sig, &key).is_ok()
}

/// Verify a hash-type-suffixed signature against `digest`.
///
/// Encoding violations the flags forbid are errors. Anything else that
/// cannot be parsed simply fails to verify.
pub fn verify(
    sig: &[u8],
    pubkey: &[u8],
    digest: &Hash,
    flags: RuleFlags,
) -> Result<bool, ScriptError> {
    check_signature_encoding(sig, flags)?;
    check_pubkey_encoding(pubkey, flags)?;
    let Some((_, der)) = sig.split_last() else {
        return Ok(false);
    };
    Ok(verify_ecdsa(der, pubkey, digest))
}
