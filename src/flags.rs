//! Script verification rule flags

use crate::error::ConsensusError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// Immutable set of enabled consensus rules.
///
/// Combining sets always yields a new value:
///
/// ```
/// use script_consensus::flags::RuleFlags;
///
/// let flags: RuleFlags = "P2SH,STRICTENC".parse().unwrap();
/// let strict = flags.with(RuleFlags::LOW_S);
/// assert!(strict.contains(RuleFlags::LOW_S));
/// assert!(!flags.contains(RuleFlags::LOW_S));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuleFlags(u32);

impl RuleFlags {
    /// Evaluate P2SH subscripts
    pub const P2SH: RuleFlags = RuleFlags(1 << 0);
    /// Strict signature and public key encodings
    pub const STRICTENC: RuleFlags = RuleFlags(1 << 1);
    /// Strict DER signatures (BIP66)
    pub const DERSIG: RuleFlags = RuleFlags(1 << 2);
    /// Signature S values must be in the lower half of the curve order
    pub const LOW_S: RuleFlags = RuleFlags(1 << 3);
    /// The extra CHECKMULTISIG argument must be empty
    pub const NULLDUMMY: RuleFlags = RuleFlags(1 << 4);
    /// scriptSig must be push-only
    pub const SIGPUSHONLY: RuleFlags = RuleFlags(1 << 5);
    /// Pushes and numbers must use their shortest encoding
    pub const MINIMALDATA: RuleFlags = RuleFlags(1 << 6);
    /// Reject the reserved NOP opcodes
    pub const DISCOURAGE_UPGRADABLE_NOPS: RuleFlags = RuleFlags(1 << 7);
    /// Exactly one stack element must remain
    pub const CLEANSTACK: RuleFlags = RuleFlags(1 << 8);
    /// Enforce OP_CHECKLOCKTIMEVERIFY (BIP65)
    pub const CHECKLOCKTIMEVERIFY: RuleFlags = RuleFlags(1 << 9);
    /// Enforce OP_CHECKSEQUENCEVERIFY (BIP112)
    pub const CHECKSEQUENCEVERIFY: RuleFlags = RuleFlags(1 << 10);
    /// Failed signature checks must use empty signatures
    pub const NULLFAIL: RuleFlags = RuleFlags(1 << 14);
    /// Reject OP_CODESEPARATOR and signatures found in the script code
    pub const CONST_SCRIPTCODE: RuleFlags = RuleFlags(1 << 16);

    const NAMED: [(&'static str, RuleFlags); 13] = [
        ("P2SH", RuleFlags::P2SH),
        ("STRICTENC", RuleFlags::STRICTENC),
        ("DERSIG", RuleFlags::DERSIG),
        ("LOW_S", RuleFlags::LOW_S),
        ("NULLDUMMY", RuleFlags::NULLDUMMY),
        ("SIGPUSHONLY", RuleFlags::SIGPUSHONLY),
        ("MINIMALDATA", RuleFlags::MINIMALDATA),
        ("DISCOURAGE_UPGRADABLE_NOPS", RuleFlags::DISCOURAGE_UPGRADABLE_NOPS),
        ("CLEANSTACK", RuleFlags::CLEANSTACK),
        ("CHECKLOCKTIMEVERIFY", RuleFlags::CHECKLOCKTIMEVERIFY),
        ("CHECKSEQUENCEVERIFY", RuleFlags::CHECKSEQUENCEVERIFY),
        ("NULLFAIL", RuleFlags::NULLFAIL),
        ("CONST_SCRIPTCODE", RuleFlags::CONST_SCRIPTCODE),
    ];

    pub const fn none() -> Self {
        RuleFlags(0)
    }

    /// Rules every validation gets unless the caller builds its own set
    pub const fn default_set() -> Self {
        RuleFlags(RuleFlags::P2SH.0 | RuleFlags::DERSIG.0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: RuleFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// A new set holding the rules of both
    #[must_use]
    pub const fn with(self, other: RuleFlags) -> Self {
        RuleFlags(self.0 | other.0)
    }

    /// A new set with the default rules added
    #[must_use]
    pub const fn with_defaults(self) -> Self {
        self.with(RuleFlags::default_set())
    }

    /// A new set without the given rules
    #[must_use]
    pub const fn without(self, other: RuleFlags) -> Self {
        RuleFlags(self.0 & !other.0)
    }
}

impl BitOr for RuleFlags {
    type Output = RuleFlags;

    fn bitor(self, rhs: RuleFlags) -> RuleFlags {
        self.with(rhs)
    }
}

impl FromStr for RuleFlags {
    type Err = ConsensusError;

    /// Parse `NONE`, `DEFAULT` or a comma/whitespace separated list of rule names
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = RuleFlags::none();
        for token in s.split(|c: char| c == ',' || c.is_whitespace()) {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let upper = token.to_ascii_uppercase();
            let parsed = match upper.as_str() {
                "NONE" => RuleFlags::none(),
                "DEFAULT" => RuleFlags::default_set(),
                name => RuleFlags::NAMED
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, f)| *f)
                    .ok_or_else(|| ConsensusError::InvalidFlags(token.to_string()))?,
            };
            flags = flags.with(parsed);
        }
        Ok(flags)
    }
}

impl fmt::Display for RuleFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let names: Vec<&str> = RuleFlags::NAMED
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect();
        f.write_str(&names.join(","))
    }
}

impl fmt::Debug for RuleFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleFlags({})", self)
    }
}

impl TryFrom<String> for RuleFlags {
    type Error = ConsensusError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RuleFlags> for String {
    fn from(flags: RuleFlags) -> String {
        flags.to_string()
    }
}
