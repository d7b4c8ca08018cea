//! Signing-key resolution.
//!
//! A built transaction only knows which *addresses* its inputs spend from.
//! The resolver walks the wallet's derivation sequence from index 0,
//! regenerating joint addresses in batches until every input address is
//! mapped to its signing material, or the scan bound is exhausted.

use std::collections::HashMap;

use bitcoin::secp256k1::{All, Keypair, Secp256k1, SecretKey};
use bitcoin::taproot::TapNodeHash;
use bitcoin::Network;
use log::debug;

use duet_core::{DerivationIndex, KeyChain, RecoveryWallet, Wallet};
use duet_vault::{joint_address, joint_keypair, TapscriptLeafData, Timelock};

use crate::builder::UnsignedTransaction;
use crate::spend::SpendError;

/// Addresses regenerated per scan round before re-checking coverage.
pub const SCAN_BATCH: u32 = 100;

/// Spend-time configuration threaded through address generation and
/// recovery construction.
#[derive(Debug, Clone, Copy)]
pub struct SpendConfig {
    /// Relative timelock baked into every generated address.
    pub timelock: Timelock,
    /// Upper bound on the resolver's address scan.
    pub scan_limit: u32,
}

impl Default for SpendConfig {
    fn default() -> Self {
        Self {
            timelock: Timelock::default(),
            scan_limit: 1000,
        }
    }
}

/// Key-path material for one address: the hash-tweaked joint keypair plus
/// the tree root the signer must tweak by.
#[derive(Clone)]
pub struct CooperativeKeys {
    pub keypair: Keypair,
    pub merkle_root: TapNodeHash,
}

/// Script-path material for one address: the raw primary key and the leaf
/// data captured at address-generation time.
#[derive(Clone)]
pub struct RecoveryKeys {
    pub secret: SecretKey,
    pub leaf: TapscriptLeafData,
}

/// Map every input address of `txinfo` to cooperative signing material.
/// Requires both seeds.
pub fn resolve_cooperative_keys(
    secp: &Secp256k1<All>,
    network: Network,
    wallet: &Wallet,
    txinfo: &UnsignedTransaction,
    config: &SpendConfig,
) -> Result<HashMap<String, CooperativeKeys>, SpendError> {
    let primary = KeyChain::from_mnemonic(secp, wallet.primary_mnemonic(), network, 0)?;
    let companion = KeyChain::from_mnemonic(secp, wallet.companion_mnemonic(), network, 0)?;
    let timelock = config.timelock;

    scan_for_keys(
        secp,
        txinfo,
        config.scan_limit,
        primary,
        companion,
        |first, second| {
            let primary_secret = first.secret_key()?;
            let companion_secret = second.secret_key()?;
            let joint = joint_address(
                secp,
                network,
                &second.public_key(secp),
                &primary_secret,
                timelock,
            )?;
            Ok((
                joint.address.to_string(),
                CooperativeKeys {
                    keypair: joint_keypair(secp, &companion_secret, &primary_secret),
                    merkle_root: joint.merkle_root,
                },
            ))
        },
    )
}

/// Map every input address of `txinfo` to recovery signing material.
/// Needs only the primary seed; the companion leg is re-derived from its
/// public descriptor.
pub fn resolve_recovery_keys(
    secp: &Secp256k1<All>,
    network: Network,
    wallet: &impl RecoveryWallet,
    txinfo: &UnsignedTransaction,
    config: &SpendConfig,
) -> Result<HashMap<String, RecoveryKeys>, SpendError> {
    let primary = KeyChain::from_mnemonic(secp, wallet.primary_mnemonic(), network, 0)?;
    let descriptor = wallet.companion_descriptor(secp, network)?;
    let companion =
        KeyChain::from_parent_descriptor(secp, &descriptor, DerivationIndex::normal(0))?;
    let timelock = config.timelock;

    scan_for_keys(
        secp,
        txinfo,
        config.scan_limit,
        primary,
        companion,
        |first, second| {
            let primary_secret = first.secret_key()?;
            let joint = joint_address(
                secp,
                network,
                &second.public_key(secp),
                &primary_secret,
                timelock,
            )?;
            Ok((
                joint.address.to_string(),
                RecoveryKeys {
                    secret: primary_secret,
                    leaf: joint.leaf,
                },
            ))
        },
    )
}

/// Batched scan over sibling pairs: derive, map, re-check coverage after
/// each batch, stop at the first batch that covers every input address.
fn scan_for_keys<T>(
    secp: &Secp256k1<All>,
    txinfo: &UnsignedTransaction,
    scan_limit: u32,
    mut first: KeyChain,
    mut second: KeyChain,
    mut derive: impl FnMut(&KeyChain, &KeyChain) -> Result<(String, T), SpendError>,
) -> Result<HashMap<String, T>, SpendError> {
    let needed: Vec<&str> = txinfo
        .prevouts()
        .map(|(_, record)| record.address.as_str())
        .collect();

    let mut mapping = HashMap::new();
    let mut scanned = 0u32;
    while scanned < scan_limit {
        let batch = SCAN_BATCH.min(scan_limit - scanned);
        for _ in 0..batch {
            let (address, keys) = derive(&first, &second)?;
            mapping.insert(address, keys);
            first = first.next_sibling(secp)?;
            second = second.next_sibling(secp)?;
        }
        scanned += batch;

        if needed.iter().all(|address| mapping.contains_key(*address)) {
            debug!(
                "resolved {} input addresses after scanning {} indices",
                needed.len(),
                scanned
            );
            return Ok(mapping);
        }
    }
    Err(SpendError::SigningKeyNotFound)
}
