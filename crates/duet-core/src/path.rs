//! Hardened/non-hardened derivation index representation.

use std::fmt;

use bitcoin::bip32::ChildNumber;
use serde::{Deserialize, Serialize};

/// Offset BIP-32 adds to hardened child indices at the wire level.
pub const HARDENED_OFFSET: u32 = 1 << 31;

/// One level of a BIP-44 derivation path.
///
/// The logical value is always stored un-offset; hardening is an explicit
/// flag so the 2^31 offset only ever appears in wire encodings. Invariant:
/// `value < 2^31`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivationIndex {
    value: u32,
    hardened: bool,
}

impl DerivationIndex {
    /// Non-hardened index from a raw path integer, stripping the hardened
    /// offset if present.
    pub fn normal(raw: u32) -> Self {
        Self {
            value: raw & !HARDENED_OFFSET,
            hardened: false,
        }
    }

    /// Hardened index from a raw path integer. Idempotent: values that
    /// already carry the offset are normalized first.
    pub fn hardened(raw: u32) -> Self {
        Self {
            value: raw & !HARDENED_OFFSET,
            hardened: true,
        }
    }

    /// The logical, un-offset index value.
    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn is_hardened(&self) -> bool {
        self.hardened
    }

    /// Wire-level encoding: the value with the hardened offset applied.
    pub fn raw(&self) -> u32 {
        if self.hardened {
            self.value | HARDENED_OFFSET
        } else {
            self.value
        }
    }

    /// The following sibling index, same hardened flag.
    pub fn next(&self) -> Self {
        if self.hardened {
            Self::hardened(self.value + 1)
        } else {
            Self::normal(self.value + 1)
        }
    }

    pub(crate) fn child_number(&self) -> ChildNumber {
        ChildNumber::from(self.raw())
    }
}

impl fmt::Display for DerivationIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, if self.hardened { "'" } else { "" })
    }
}
