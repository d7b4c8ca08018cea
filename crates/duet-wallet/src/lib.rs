//! Duet wallet flows
//!
//! Ties the derivation core and the vault together: builds unsigned
//! transactions over caller-supplied UTXOs, regenerates the per-address
//! signing material, and produces fully signed cooperative or recovery
//! transactions.
//!
//! # Spend Paths
//!
//! - **Cooperative** (normal mode, both seeds): key-path spend with the
//!   hash-tweaked joint key, one signature per input.
//! - **Recovery** (primary seed + companion descriptor): script-path spend
//!   of the fallback leaf; valid only once every input's relative timelock
//!   has expired, which the flow encodes in the input sequence fields.
//!
//! All operations are synchronous, CPU-bound pure functions of their
//! inputs; retry and broadcast belong to the node-facing caller.

pub mod addresses;
pub mod builder;
pub mod resolver;
pub mod spend;

pub use addresses::generate_addresses;
pub use builder::{
    build_transaction, BuildError, PrevoutRecord, TransactionSummary, UnsignedTransaction, Utxo,
    DUST_LIMIT,
};
pub use resolver::{
    resolve_cooperative_keys, resolve_recovery_keys, CooperativeKeys, RecoveryKeys, SpendConfig,
    SCAN_BATCH,
};
pub use spend::{
    create_and_sign_recovery_transaction, create_and_sign_transaction, SignedTransaction,
    SpendError,
};
