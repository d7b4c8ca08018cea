//! Duet core
//!
//! Key derivation and wallet seams for the two-seed taproot wallet.
//!
//! A Duet wallet pairs a *primary* seed with a *companion* seed. The vault
//! crate combines one key from each side into a single taproot output:
//! cooperative spends use the key path, and a timelocked fallback leaf lets
//! the primary seed alone reclaim funds once the relative timelock expires.
//!
//! # Key Derivation
//!
//! Both sides derive along the conventional BIP-44 chain `44'/0'/0'/0/i`.
//! The companion side can be shared as a taproot descriptor string so a
//! recovery-mode wallet needs only its public keys.

pub mod bip44;
pub mod network;
pub mod path;
pub mod seed;
pub mod wallet;

pub use bip44::{DerivationError, DescriptorError, KeyChain};
pub use network::{parse_network, NetworkError};
pub use path::DerivationIndex;
pub use seed::{generate_mnemonic, parse_mnemonic, SeedError};
pub use wallet::{
    descriptor_for_mnemonic, RecoveryWallet, SoloWallet, Wallet, WalletError, WalletExport,
};
