//! Key-path and script-path signing.
//!
//! The [`Signer`] trait covers the two taproot spend paths; [`MemorySigner`]
//! is the in-memory reference implementation holding one raw private key.
//! Hardware-backed implementations can slot in behind the same trait
//! without touching callers.

use std::collections::HashMap;

use bitcoin::hashes::Hash;
use bitcoin::key::TapTweak;
use bitcoin::secp256k1::{All, Keypair, Message, Secp256k1, SecretKey};
use bitcoin::sighash::{Prevouts, SighashCache};
use bitcoin::taproot::{self, TapNodeHash};
use bitcoin::{OutPoint, TapSighashType, Transaction, TxOut, Witness};
use thiserror::Error;

use crate::taproot::TapscriptLeafData;

#[derive(Error, Debug)]
pub enum SignError {
    #[error("no previous output for outpoint {0}")]
    MissingPrevout(OutPoint),
    #[error("sighash computation failed: {0}")]
    Sighash(#[from] bitcoin::sighash::TaprootError),
}

/// Resolves previous outputs referenced by a transaction's inputs.
///
/// The BIP-341 sighash commits to every spent output, so the fetcher must
/// resolve all of them, not just the input being signed.
pub trait PrevoutFetcher {
    fn fetch(&self, outpoint: &OutPoint) -> Option<&TxOut>;
}

/// In-memory outpoint-to-output map.
#[derive(Debug, Clone, Default)]
pub struct MemoryPrevouts(HashMap<OutPoint, TxOut>);

impl MemoryPrevouts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, outpoint: OutPoint, output: TxOut) {
        self.0.insert(outpoint, output);
    }
}

impl FromIterator<(OutPoint, TxOut)> for MemoryPrevouts {
    fn from_iter<I: IntoIterator<Item = (OutPoint, TxOut)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl PrevoutFetcher for MemoryPrevouts {
    fn fetch(&self, outpoint: &OutPoint) -> Option<&TxOut> {
        self.0.get(outpoint)
    }
}

/// Which taproot tweak to apply to the raw private key before signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignTweak {
    /// Sign with the key as-is.
    Bare,
    /// Empty-tree tweak: key-path spend of an output with no scripts, or a
    /// tapscript leaf keyed by the empty-tweak output key.
    NoScript,
    /// Tweak by an explicit tree root.
    Script(TapNodeHash),
}

impl SignTweak {
    pub fn apply(&self, secp: &Secp256k1<All>, keypair: &Keypair) -> Keypair {
        match self {
            SignTweak::Bare => *keypair,
            SignTweak::NoScript => keypair.tap_tweak(secp, None).to_inner(),
            SignTweak::Script(root) => keypair.tap_tweak(secp, Some(*root)).to_inner(),
        }
    }
}

/// Produces taproot witnesses for the two spend paths.
pub trait Signer {
    /// Key-path witness for the input at `input_index`: a single schnorr
    /// signature. The sighash-type byte is appended only when the type is
    /// not the implicit default.
    fn taproot_sign(
        &self,
        fetcher: &dyn PrevoutFetcher,
        tx: &Transaction,
        sighash_type: TapSighashType,
        input_index: usize,
        merkle_root: Option<TapNodeHash>,
    ) -> Result<Witness, SignError>;

    /// Script-path witness for one tapscript leaf: always exactly
    /// `[signature, leaf script, control block]`.
    fn tapscript_sign(
        &self,
        fetcher: &dyn PrevoutFetcher,
        tx: &Transaction,
        sighash_type: TapSighashType,
        input_index: usize,
        leaf: &TapscriptLeafData,
    ) -> Result<Witness, SignError>;
}

/// Signer holding one raw private key in memory.
pub struct MemorySigner {
    keypair: Keypair,
}

impl MemorySigner {
    pub fn new(secret: SecretKey) -> Self {
        let secp = Secp256k1::new();
        Self {
            keypair: Keypair::from_secret_key(&secp, &secret),
        }
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self { keypair }
    }
}

impl Signer for MemorySigner {
    fn taproot_sign(
        &self,
        fetcher: &dyn PrevoutFetcher,
        tx: &Transaction,
        sighash_type: TapSighashType,
        input_index: usize,
        merkle_root: Option<TapNodeHash>,
    ) -> Result<Witness, SignError> {
        let secp = Secp256k1::new();
        let prevouts = collect_prevouts(fetcher, tx)?;
        let mut cache = SighashCache::new(tx);
        let sighash = cache.taproot_key_spend_signature_hash(
            input_index,
            &Prevouts::All(&prevouts),
            sighash_type,
        )?;

        let tweak = match merkle_root {
            None => SignTweak::NoScript,
            Some(root) => SignTweak::Script(root),
        };
        let keypair = tweak.apply(&secp, &self.keypair);
        let signature = secp.sign_schnorr(&Message::from_digest(sighash.to_byte_array()), &keypair);

        let signature = taproot::Signature {
            signature,
            sighash_type,
        };
        Ok(Witness::from_slice(&[signature.to_vec()]))
    }

    fn tapscript_sign(
        &self,
        fetcher: &dyn PrevoutFetcher,
        tx: &Transaction,
        sighash_type: TapSighashType,
        input_index: usize,
        leaf: &TapscriptLeafData,
    ) -> Result<Witness, SignError> {
        let secp = Secp256k1::new();
        let prevouts = collect_prevouts(fetcher, tx)?;
        let mut cache = SighashCache::new(tx);
        let sighash = cache.taproot_script_spend_signature_hash(
            input_index,
            &Prevouts::All(&prevouts),
            leaf.leaf_hash,
            sighash_type,
        )?;

        // the leaf script commits to the empty-tweak output key of this key
        let keypair = SignTweak::NoScript.apply(&secp, &self.keypair);
        let signature = secp.sign_schnorr(&Message::from_digest(sighash.to_byte_array()), &keypair);

        let signature = taproot::Signature {
            signature,
            sighash_type,
        };
        Ok(Witness::from_slice(&[
            signature.to_vec(),
            leaf.leaf_script.to_bytes(),
            leaf.control_block.serialize(),
        ]))
    }
}

fn collect_prevouts(
    fetcher: &dyn PrevoutFetcher,
    tx: &Transaction,
) -> Result<Vec<TxOut>, SignError> {
    tx.input
        .iter()
        .map(|txin| {
            fetcher
                .fetch(&txin.previous_output)
                .cloned()
                .ok_or(SignError::MissingPrevout(txin.previous_output))
        })
        .collect()
}
