//! Joint address-sequence generation.

use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::{Address, Network};

use duet_core::{DerivationIndex, KeyChain, RecoveryWallet};
use duet_vault::{joint_address, Timelock};

use crate::spend::SpendError;

/// Generate `count` consecutive joint addresses starting at `start_index`.
///
/// Works for both wallet modes: the primary leg derives from its mnemonic,
/// the companion leg from its public descriptor. The timelock is part of
/// the address commitment, so all participants must use the same value.
pub fn generate_addresses(
    secp: &Secp256k1<All>,
    network: Network,
    wallet: &impl RecoveryWallet,
    start_index: u32,
    count: u32,
    timelock: Timelock,
) -> Result<Vec<Address>, SpendError> {
    if count == 0 {
        return Err(SpendError::InvalidAddressCount(count));
    }

    let mut first = KeyChain::from_mnemonic(secp, wallet.primary_mnemonic(), network, start_index)?;
    let descriptor = wallet.companion_descriptor(secp, network)?;
    let mut second = KeyChain::from_parent_descriptor(
        secp,
        &descriptor,
        DerivationIndex::normal(start_index),
    )?;

    let mut addresses = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let primary_secret = first.secret_key()?;
        let joint = joint_address(
            secp,
            network,
            &second.public_key(secp),
            &primary_secret,
            timelock,
        )?;
        addresses.push(joint.address);
        first = first.next_sibling(secp)?;
        second = second.next_sibling(secp)?;
    }
    Ok(addresses)
}
