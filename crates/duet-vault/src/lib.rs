//! Duet vault
//!
//! Taproot construction and signing for the two-seed wallet.
//!
//! # Output Structure
//!
//! ```text
//! commitment   = SHA256(primary secret)
//! internal key = taptweak(companion key, commitment)
//! output key   = taptweak(internal key, merkle root)
//!   Key path:    hash-tweaked companion key       <- cooperative spend
//!   Script path: pk(primary) + older(timelock)    <- recovery after timelock
//! ```
//!
//! The key path needs the companion's private material plus knowledge of the
//! commitment hash, so spending normally requires both seeds. The single
//! fallback leaf lets the primary key alone reclaim funds once the relative
//! timelock has expired.

pub mod script;
pub mod signer;
pub mod taproot;

pub use script::{
    augment_with_timelock, inscribe, key_spend_address, timelock_leaf_script, Timelock,
    TimelockError, DEFAULT_TIMELOCK_BLOCKS,
};
pub use signer::{
    MemoryPrevouts, MemorySigner, PrevoutFetcher, SignError, SignTweak, Signer,
};
pub use taproot::{
    joint_address, joint_keypair, key_commitment, JointAddress, TaprootError, TapscriptBuilder,
    TapscriptLeafData,
};
