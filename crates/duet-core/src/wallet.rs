//! Wallet variants: full two-seed wallets and recovery-mode wallets.
//!
//! A wallet is a pure derivation source, not a balance tracker. The normal
//! variant holds both mnemonics; the recovery variant holds only the primary
//! mnemonic plus the companion side exported as a public descriptor.

use bip39::Mnemonic;
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::Network;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bip44::{DerivationError, KeyChain};
use crate::seed::{generate_mnemonic, SeedError};

#[derive(Error, Debug)]
pub enum WalletError {
    #[error(transparent)]
    Seed(#[from] SeedError),
    #[error(transparent)]
    Derivation(#[from] DerivationError),
}

/// Read access to the primary seed and the companion's public descriptor.
///
/// Both wallet variants implement this; address generation and
/// recovery-path signing need nothing more.
pub trait RecoveryWallet {
    fn primary_mnemonic(&self) -> &Mnemonic;

    /// The companion side as a parent-level taproot descriptor for `network`.
    fn companion_descriptor(
        &self,
        secp: &Secp256k1<All>,
        network: Network,
    ) -> Result<String, WalletError>;
}

/// Normal-mode wallet holding both seeds.
#[derive(Clone)]
pub struct Wallet {
    primary: Mnemonic,
    companion: Mnemonic,
}

impl Wallet {
    pub fn new(primary: Mnemonic, companion: Mnemonic) -> Self {
        Self { primary, companion }
    }

    /// Create a wallet with two freshly generated 24-word seeds.
    pub fn generate() -> Result<Self, WalletError> {
        Ok(Self::new(generate_mnemonic()?, generate_mnemonic()?))
    }

    pub fn companion_mnemonic(&self) -> &Mnemonic {
        &self.companion
    }

    /// Creation envelope: both phrases plus the companion descriptor the
    /// second party hands back for recovery-mode use.
    pub fn export(
        &self,
        secp: &Secp256k1<All>,
        network: Network,
    ) -> Result<WalletExport, WalletError> {
        Ok(WalletExport {
            first_mnemonic: self.primary.to_string(),
            second_mnemonic: self.companion.to_string(),
            second_descriptor: self.companion_descriptor(secp, network)?,
        })
    }
}

impl RecoveryWallet for Wallet {
    fn primary_mnemonic(&self) -> &Mnemonic {
        &self.primary
    }

    fn companion_descriptor(
        &self,
        secp: &Secp256k1<All>,
        network: Network,
    ) -> Result<String, WalletError> {
        descriptor_for_mnemonic(secp, network, &self.companion)
    }
}

/// Recovery-mode wallet: the primary seed plus the companion side as an
/// already-exported descriptor string.
#[derive(Clone)]
pub struct SoloWallet {
    primary: Mnemonic,
    companion_descriptor: String,
}

impl SoloWallet {
    pub fn new(primary: Mnemonic, companion_descriptor: impl Into<String>) -> Self {
        Self {
            primary,
            companion_descriptor: companion_descriptor.into(),
        }
    }
}

impl RecoveryWallet for SoloWallet {
    fn primary_mnemonic(&self) -> &Mnemonic {
        &self.primary
    }

    fn companion_descriptor(
        &self,
        _secp: &Secp256k1<All>,
        _network: Network,
    ) -> Result<String, WalletError> {
        Ok(self.companion_descriptor.clone())
    }
}

/// Parent-level taproot descriptor for the conventional chain of `mnemonic`.
pub fn descriptor_for_mnemonic(
    secp: &Secp256k1<All>,
    network: Network,
    mnemonic: &Mnemonic,
) -> Result<String, WalletError> {
    let chain = KeyChain::from_mnemonic(secp, mnemonic, network, 0)?;
    Ok(chain.to_parent_descriptor(secp, ""))
}

/// Wallet-creation envelope crossing the adapter boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletExport {
    pub first_mnemonic: String,
    pub second_mnemonic: String,
    pub second_descriptor: String,
}
