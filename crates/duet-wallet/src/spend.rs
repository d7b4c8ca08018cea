//! Cooperative and recovery spend flows: build, resolve, sign, serialize.

use bitcoin::consensus::encode::serialize_hex;
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::{Address, Amount, Network, OutPoint, TapSighashType, Transaction, TxOut, Witness};
use log::debug;
use thiserror::Error;

use duet_core::{DerivationError, DescriptorError, RecoveryWallet, Wallet, WalletError};
use duet_vault::{MemoryPrevouts, MemorySigner, SignError, Signer, TaprootError};

use crate::builder::{build_transaction, BuildError, UnsignedTransaction, Utxo};
use crate::resolver::{resolve_cooperative_keys, resolve_recovery_keys, SpendConfig};

#[derive(Error, Debug)]
pub enum SpendError {
    #[error("invalid amount of addresses {0}; must be greater than 0")]
    InvalidAddressCount(u32),
    #[error("failed to find signing keys for input addresses")]
    SigningKeyNotFound,
    #[error("no outpoint record for input {0}")]
    MissingOutpointRecord(OutPoint),
    #[error("no signing key for input {outpoint} @ {address}")]
    MissingSigningKey {
        outpoint: OutPoint,
        address: String,
    },
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Derivation(#[from] DerivationError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Taproot(#[from] TaprootError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Sign(#[from] SignError),
}

/// A fully signed transaction ready for broadcast by the node-facing
/// caller.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub tx: Transaction,
    pub hex: String,
}

/// Build and key-path sign a cooperative transaction. Requires both seeds.
#[allow(clippy::too_many_arguments)]
pub fn create_and_sign_transaction(
    secp: &Secp256k1<All>,
    network: Network,
    wallet: &Wallet,
    utxos: &[Utxo],
    change_address: &Address,
    destination: &Address,
    amount: i64,
    fee_rate: f64,
    config: &SpendConfig,
) -> Result<SignedTransaction, SpendError> {
    let info = build_transaction(utxos, change_address, destination, amount, fee_rate)?;
    let mut tx = info.tx.clone();

    let keys = resolve_cooperative_keys(secp, network, wallet, &info, config)?;
    let fetcher = prevout_fetcher(&info)?;

    let mut witnesses: Vec<Witness> = Vec::with_capacity(tx.input.len());
    for (index, txin) in tx.input.iter().enumerate() {
        let record = info
            .prevout(&txin.previous_output)
            .ok_or(SpendError::MissingOutpointRecord(txin.previous_output))?;
        let input_keys = keys
            .get(&record.address)
            .ok_or_else(|| SpendError::MissingSigningKey {
                outpoint: txin.previous_output,
                address: record.address.clone(),
            })?;

        let signer = MemorySigner::from_keypair(input_keys.keypair);
        let witness = signer.taproot_sign(
            &fetcher,
            &tx,
            TapSighashType::Default,
            index,
            Some(input_keys.merkle_root),
        )?;
        witnesses.push(witness);
    }
    for (txin, witness) in tx.input.iter_mut().zip(witnesses) {
        txin.witness = witness;
    }

    debug!("signed cooperative transaction with {} inputs", tx.input.len());
    Ok(SignedTransaction {
        hex: serialize_hex(&tx),
        tx,
    })
}

/// Build and script-path sign a recovery transaction. Needs only the
/// primary seed plus the companion descriptor; every input's sequence is
/// forced to the configured relative timelock before the sighash commits
/// to it, so the transaction is valid only once each spent output has aged
/// past the delay.
#[allow(clippy::too_many_arguments)]
pub fn create_and_sign_recovery_transaction(
    secp: &Secp256k1<All>,
    network: Network,
    wallet: &impl RecoveryWallet,
    utxos: &[Utxo],
    change_address: &Address,
    destination: &Address,
    amount: i64,
    fee_rate: f64,
    config: &SpendConfig,
) -> Result<SignedTransaction, SpendError> {
    let info = build_transaction(utxos, change_address, destination, amount, fee_rate)?;
    let mut tx = info.tx.clone();
    for txin in &mut tx.input {
        txin.sequence = config.timelock.to_sequence();
    }

    let keys = resolve_recovery_keys(secp, network, wallet, &info, config)?;
    let fetcher = prevout_fetcher(&info)?;

    let mut witnesses: Vec<Witness> = Vec::with_capacity(tx.input.len());
    for (index, txin) in tx.input.iter().enumerate() {
        let record = info
            .prevout(&txin.previous_output)
            .ok_or(SpendError::MissingOutpointRecord(txin.previous_output))?;
        let input_keys = keys
            .get(&record.address)
            .ok_or_else(|| SpendError::MissingSigningKey {
                outpoint: txin.previous_output,
                address: record.address.clone(),
            })?;

        let signer = MemorySigner::new(input_keys.secret);
        let witness = signer.tapscript_sign(
            &fetcher,
            &tx,
            TapSighashType::Default,
            index,
            &input_keys.leaf,
        )?;
        witnesses.push(witness);
    }
    for (txin, witness) in tx.input.iter_mut().zip(witnesses) {
        txin.witness = witness;
    }

    debug!("signed recovery transaction with {} inputs", tx.input.len());
    Ok(SignedTransaction {
        hex: serialize_hex(&tx),
        tx,
    })
}

/// Fetcher over the outputs the built transaction spends; the sighash needs
/// every one of them resolved.
fn prevout_fetcher(info: &UnsignedTransaction) -> Result<MemoryPrevouts, SpendError> {
    info.tx
        .input
        .iter()
        .map(|txin| {
            let record = info
                .prevout(&txin.previous_output)
                .ok_or(SpendError::MissingOutpointRecord(txin.previous_output))?;
            Ok((
                txin.previous_output,
                TxOut {
                    value: Amount::from_sat(record.amount as u64),
                    script_pubkey: record.script.clone(),
                },
            ))
        })
        .collect()
}
