//! BIP-44 key chains and taproot descriptor import/export.
//!
//! A [`KeyChain`] is the five-level derivation
//! `purpose/coin/account/change/index` from one master key, kept immutable
//! once built. The change-level key is retained so walking an address
//! sequence ([`KeyChain::next_sibling`]) never touches the master again.
//!
//! The companion side of a wallet travels as a checksum-less taproot
//! descriptor:
//!
//! ```text
//! tr([<fingerprint>/<purpose>/<coin>/<account>/<change>]<xpub>)
//! ```
//!
//! where hardened legs carry a trailing `'`. Import re-derives child keys
//! from the embedded public key only, so no private material crosses the
//! boundary.

use std::fmt;
use std::str::FromStr;

use bip39::Mnemonic;
use bitcoin::bip32::{Fingerprint, Xpriv, Xpub};
use bitcoin::secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use bitcoin::Network;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::path::DerivationIndex;

#[derive(Error, Debug)]
pub enum DerivationError {
    #[error("child derivation failed at {level}: {source}")]
    Child {
        level: &'static str,
        source: bitcoin::bip32::Error,
    },
    #[error("invalid master seed: {0}")]
    Seed(bitcoin::bip32::Error),
    #[error("chain holds no private material")]
    PrivateKeyUnavailable,
}

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("expected descriptor prefix 'tr([' but was {0}")]
    BadPrefix(String),
    #[error("descriptor is truncated: {0}")]
    Truncated(String),
    #[error("expected derivations up through the bip-44 change level but was {0}")]
    BadPathSegments(String),
    #[error("could not parse {level} path segment {segment}")]
    BadPathValue {
        level: &'static str,
        segment: String,
    },
    #[error("invalid descriptor fingerprint {0}")]
    BadFingerprint(String),
    #[error("invalid extended public key: {0}")]
    BadKey(bitcoin::bip32::Error),
    #[error(transparent)]
    Derivation(#[from] DerivationError),
}

/// Extended key that may or may not carry private material.
///
/// Chains built from a master private key keep [`Xpriv`]s; chains imported
/// from a descriptor only ever hold [`Xpub`]s and refuse private-key access.
#[derive(Clone, Debug)]
enum ChainKey {
    Private(Xpriv),
    Public(Xpub),
}

impl ChainKey {
    fn derive(
        &self,
        secp: &Secp256k1<All>,
        index: DerivationIndex,
        level: &'static str,
    ) -> Result<ChainKey, DerivationError> {
        let child = index.child_number();
        match self {
            ChainKey::Private(xpriv) => xpriv
                .derive_priv(secp, &[child])
                .map(ChainKey::Private)
                .map_err(|source| DerivationError::Child { level, source }),
            ChainKey::Public(xpub) => xpub
                .derive_pub(secp, &[child])
                .map(ChainKey::Public)
                .map_err(|source| DerivationError::Child { level, source }),
        }
    }

    fn public_key(&self, secp: &Secp256k1<All>) -> PublicKey {
        match self {
            ChainKey::Private(xpriv) => Xpub::from_priv(secp, xpriv).public_key,
            ChainKey::Public(xpub) => xpub.public_key,
        }
    }

    fn secret_key(&self) -> Result<SecretKey, DerivationError> {
        match self {
            ChainKey::Private(xpriv) => Ok(xpriv.private_key),
            ChainKey::Public(_) => Err(DerivationError::PrivateKeyUnavailable),
        }
    }

    fn to_xpub(&self, secp: &Secp256k1<All>) -> Xpub {
        match self {
            ChainKey::Private(xpriv) => Xpub::from_priv(secp, xpriv),
            ChainKey::Public(xpub) => *xpub,
        }
    }
}

/// A five-level BIP-44 key chain plus the master fingerprint it came from.
#[derive(Clone, Debug)]
pub struct KeyChain {
    change_key: ChainKey,
    index_key: ChainKey,
    fingerprint: Fingerprint,
    purpose: DerivationIndex,
    coin: DerivationIndex,
    account: DerivationIndex,
    change: DerivationIndex,
    index: DerivationIndex,
}

impl KeyChain {
    /// Derive the full chain `master -> purpose -> coin -> account -> change
    /// -> index`. Any failed child derivation aborts immediately.
    pub fn from_master(
        secp: &Secp256k1<All>,
        master: &Xpriv,
        purpose: DerivationIndex,
        coin: DerivationIndex,
        account: DerivationIndex,
        change: DerivationIndex,
        index: DerivationIndex,
    ) -> Result<Self, DerivationError> {
        let fingerprint = master.fingerprint(secp);

        let root = ChainKey::Private(*master);
        let purpose_key = root.derive(secp, purpose, "purpose")?;
        let coin_key = purpose_key.derive(secp, coin, "coin")?;
        let account_key = coin_key.derive(secp, account, "account")?;
        let change_key = account_key.derive(secp, change, "change")?;
        let index_key = change_key.derive(secp, index, "index")?;

        Ok(Self {
            change_key,
            index_key,
            fingerprint,
            purpose,
            coin,
            account,
            change,
            index,
        })
    }

    /// Conventional wallet chain `44'/0'/0'/0/index` for a mnemonic.
    ///
    /// The BIP-32 master seed is the mnemonic's raw entropy rather than the
    /// BIP-39 PBKDF2 seed; every wallet participant must share this
    /// convention or derived addresses will not line up.
    pub fn from_mnemonic(
        secp: &Secp256k1<All>,
        mnemonic: &Mnemonic,
        network: Network,
        index: u32,
    ) -> Result<Self, DerivationError> {
        let entropy = Zeroizing::new(mnemonic.to_entropy());
        let master = Xpriv::new_master(network, &entropy).map_err(DerivationError::Seed)?;
        Self::from_master(
            secp,
            &master,
            DerivationIndex::hardened(44),
            DerivationIndex::hardened(0),
            DerivationIndex::hardened(0),
            DerivationIndex::normal(0),
            DerivationIndex::normal(index),
        )
    }

    /// Import the change-level public key and derivation metadata from a
    /// parent descriptor, then derive `index` from it (public-only).
    pub fn from_parent_descriptor(
        secp: &Secp256k1<All>,
        descriptor: &str,
        index: DerivationIndex,
    ) -> Result<Self, DescriptorError> {
        let rest = descriptor
            .strip_prefix("tr([")
            .ok_or_else(|| DescriptorError::BadPrefix(descriptor.to_string()))?;
        let (origin, key_part) = rest
            .split_once(']')
            .ok_or_else(|| DescriptorError::Truncated(descriptor.to_string()))?;
        let (fingerprint_hex, path) = origin
            .split_once('/')
            .ok_or_else(|| DescriptorError::BadPathSegments(origin.to_string()))?;

        let fingerprint = Fingerprint::from_str(fingerprint_hex)
            .map_err(|_| DescriptorError::BadFingerprint(fingerprint_hex.to_string()))?;

        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() != 4 {
            return Err(DescriptorError::BadPathSegments(path.to_string()));
        }
        let purpose = parse_path_segment(segments[0], "purpose")?;
        let coin = parse_path_segment(segments[1], "coin")?;
        let account = parse_path_segment(segments[2], "account")?;
        let change = parse_path_segment(segments[3], "change")?;

        let key_str = key_part
            .strip_suffix(')')
            .ok_or_else(|| DescriptorError::Truncated(descriptor.to_string()))?;
        let xpub = Xpub::from_str(key_str).map_err(DescriptorError::BadKey)?;

        let change_key = ChainKey::Public(xpub);
        let index_key = change_key.derive(secp, index, "index")?;

        Ok(Self {
            change_key,
            index_key,
            fingerprint,
            purpose,
            coin,
            account,
            change,
            index,
        })
    }

    /// A new chain at `index + 1`, re-derived from the stored change-level
    /// key. The hardened flag of the index leg is preserved.
    pub fn next_sibling(&self, secp: &Secp256k1<All>) -> Result<Self, DerivationError> {
        let sibling = self.index.next();
        let index_key = self.change_key.derive(secp, sibling, "index")?;
        Ok(Self {
            change_key: self.change_key.clone(),
            index_key,
            fingerprint: self.fingerprint,
            purpose: self.purpose,
            coin: self.coin,
            account: self.account,
            change: self.change,
            index: sibling,
        })
    }

    pub fn public_key(&self, secp: &Secp256k1<All>) -> PublicKey {
        self.index_key.public_key(secp)
    }

    /// Private key at the index level; fails for descriptor-imported chains.
    pub fn secret_key(&self) -> Result<SecretKey, DerivationError> {
        self.index_key.secret_key()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn index(&self) -> DerivationIndex {
        self.index
    }

    /// Derivation path string including the index leg, e.g. `44'/0'/0'/0/7`.
    pub fn derivation_path(&self) -> String {
        format!("{}/{}", self.parent_derivation_path(), self.index)
    }

    /// Derivation path string up through the change leg.
    pub fn parent_derivation_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.purpose, self.coin, self.account, self.change
        )
    }

    /// Checksum-less taproot descriptor for the change level: the parent of
    /// the whole address sequence. Round-trips through
    /// [`KeyChain::from_parent_descriptor`].
    pub fn to_parent_descriptor(&self, secp: &Secp256k1<All>, suffix: &str) -> String {
        format!(
            "tr([{}/{}]{}{})",
            self.fingerprint,
            self.parent_derivation_path(),
            self.change_key.to_xpub(secp),
            normalize_suffix(suffix),
        )
    }

    /// Checksum-less taproot descriptor for this exact index.
    pub fn to_descriptor(&self, secp: &Secp256k1<All>, suffix: &str) -> String {
        format!(
            "tr([{}/{}]{}{})",
            self.fingerprint,
            self.derivation_path(),
            self.index_key.to_xpub(secp),
            normalize_suffix(suffix),
        )
    }
}

impl fmt::Display for KeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.fingerprint, self.derivation_path())
    }
}

fn normalize_suffix(suffix: &str) -> String {
    if suffix.is_empty() || suffix.starts_with('/') {
        suffix.to_string()
    } else {
        format!("/{suffix}")
    }
}

fn parse_path_segment(
    segment: &str,
    level: &'static str,
) -> Result<DerivationIndex, DescriptorError> {
    let (digits, hardened) = match segment.strip_suffix('\'') {
        Some(stripped) => (stripped, true),
        None => (segment, false),
    };
    let value: u32 = digits.parse().map_err(|_| DescriptorError::BadPathValue {
        level,
        segment: segment.to_string(),
    })?;
    Ok(if hardened {
        DerivationIndex::hardened(value)
    } else {
        DerivationIndex::normal(value)
    })
}
