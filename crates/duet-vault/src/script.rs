//! Leaf-script construction: the timelock fallback clause and the
//! inscription envelope.

use std::fmt;
use std::time::Duration;

use bitcoin::blockdata::constants::MAX_SCRIPT_ELEMENT_SIZE;
use bitcoin::key::TapTweak;
use bitcoin::opcodes::all::{
    OP_CHECKSIGVERIFY, OP_CSV, OP_ENDIF, OP_IF, OP_PUSHBYTES_0, OP_PUSHNUM_1, OP_PUSHNUM_NEG1,
};
use bitcoin::opcodes::Opcode;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{All, PublicKey, Secp256k1};
use bitcoin::{Address, Network, ScriptBuf, Sequence};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default fallback delay, roughly one year of blocks.
pub const DEFAULT_TIMELOCK_BLOCKS: u16 = 52_560;

#[derive(Error, Debug)]
pub enum TimelockError {
    #[error("timelock must be a positive block count, got {0}")]
    Invalid(u32),
}

/// Relative timelock in blocks (~10 minutes each) guarding the fallback
/// leaf. Height-based CSV values fit in 16 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timelock(u16);

impl Timelock {
    pub fn from_blocks(blocks: u16) -> Result<Self, TimelockError> {
        if blocks == 0 {
            return Err(TimelockError::Invalid(blocks as u32));
        }
        Ok(Self(blocks))
    }

    pub fn blocks(&self) -> u16 {
        self.0
    }

    /// Sequence value enforcing this delay (BIP-68 relative height lock).
    pub fn to_sequence(&self) -> Sequence {
        Sequence::from_height(self.0)
    }

    /// Rough wall-clock duration at one block per ten minutes.
    pub fn approximate_duration(&self) -> Duration {
        Duration::from_secs(self.0 as u64 * 600)
    }
}

impl Default for Timelock {
    fn default() -> Self {
        Self(DEFAULT_TIMELOCK_BLOCKS)
    }
}

impl fmt::Display for Timelock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} blocks (~{} days)", self.0, self.0 / 144)
    }
}

/// P2TR address for a key-path-only output: the key tweaked with an empty
/// script tree.
pub fn key_spend_address(
    secp: &Secp256k1<All>,
    public_key: &PublicKey,
    network: Network,
) -> Address {
    let (xonly, _parity) = public_key.x_only_public_key();
    Address::p2tr(secp, xonly, None, network)
}

/// Fallback leaf script: `<leaf key> OP_CHECKSIGVERIFY <blocks> OP_CSV`.
///
/// This is `and_v(v:pk(K),older(N))` with K being the empty-tweak taproot
/// output key of `primary`; the script-path signer applies the matching
/// tweak before signing.
pub fn timelock_leaf_script(
    secp: &Secp256k1<All>,
    timelock: Timelock,
    primary: &PublicKey,
) -> ScriptBuf {
    let (xonly, _parity) = primary.x_only_public_key();
    let (leaf_key, _parity) = xonly.tap_tweak(secp, None);
    let prefix = Builder::new()
        .push_slice(leaf_key.serialize())
        .push_opcode(OP_CHECKSIGVERIFY)
        .into_script();
    augment_with_timelock(timelock, prefix)
}

/// Append the `<blocks> OP_CSV` clause onto any prefix script.
pub fn augment_with_timelock(timelock: Timelock, prefix: ScriptBuf) -> ScriptBuf {
    let tail = Builder::new()
        .push_int(timelock.blocks() as i64)
        .push_opcode(OP_CSV)
        .into_script();
    let mut bytes = prefix.into_bytes();
    bytes.extend_from_slice(tail.as_bytes());
    ScriptBuf::from_bytes(bytes)
}

/// Wrap `data` in an inscription-style envelope:
/// `OP_FALSE OP_IF <data, split into pushes of at most 520 bytes> OP_ENDIF`.
///
/// Shares no state with the wallet signing path.
pub fn inscribe(data: &[u8]) -> ScriptBuf {
    let mut builder = Builder::new()
        .push_opcode(OP_PUSHBYTES_0) // OP_FALSE
        .push_opcode(OP_IF);
    for chunk in data.chunks(MAX_SCRIPT_ELEMENT_SIZE) {
        builder = push_minimal(builder, chunk);
    }
    builder.push_opcode(OP_ENDIF).into_script()
}

/// Minimal data push per standard script rules, including the canonical
/// single-byte opcodes for 0, 1..=16 and -1.
fn push_minimal(builder: Builder, data: &[u8]) -> Builder {
    match data {
        [] | [0x00] => builder.push_opcode(OP_PUSHBYTES_0),
        [n @ 1..=16] => builder.push_opcode(Opcode::from(OP_PUSHNUM_1.to_u8() + n - 1)),
        [0x81] => builder.push_opcode(OP_PUSHNUM_NEG1),
        bytes => {
            let buf = PushBytesBuf::try_from(bytes.to_vec())
                .expect("chunks are bounded by the max element size");
            builder.push_slice(buf)
        }
    }
}
