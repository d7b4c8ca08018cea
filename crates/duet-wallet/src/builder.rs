//! Transaction construction: first-fit coin selection, one-shot fee
//! estimation, and dust remediation.

use std::collections::{HashMap, VecDeque};

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest change output worth creating for a P2TR script, in sats.
pub const DUST_LIMIT: i64 = 330;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("invalid fee rate {0}; must be greater than zero")]
    InvalidFeeRate(f64),
    #[error("invalid amount {0}; must not be negative")]
    InvalidAmount(i64),
    #[error("insufficient funds; need {need} have {have}")]
    InsufficientFunds { need: i64, have: i64 },
    #[error("insufficient funds to account for fees; need {need} have {have} remaining")]
    InsufficientFundsForFees { need: i64, have: i64 },
    #[error("invalid locking script hex: {0}")]
    BadScriptHex(#[from] hex::FromHexError),
}

/// Caller-supplied unspent output. Read-only to the builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
    /// Address the output pays to; the resolver maps it back to keys.
    pub from_address: String,
    pub outpoint: OutPoint,
    /// Value in sats.
    pub amount: i64,
    /// Hex-encoded locking script of the output.
    pub script: String,
}

impl Utxo {
    pub fn locking_script(&self) -> Result<ScriptBuf, BuildError> {
        Ok(ScriptBuf::from_bytes(hex::decode(&self.script)?))
    }
}

/// Previous-output data retained per input for signing-key lookup.
#[derive(Debug, Clone)]
pub struct PrevoutRecord {
    pub address: String,
    pub amount: i64,
    pub script: ScriptBuf,
}

/// A built but unsigned transaction plus the bookkeeping the signing flows
/// need later.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    pub hex: String,
    pub tx: Transaction,
    /// Sum of all selected inputs, in sats.
    pub input_total: i64,
    pub fee: i64,
    pub change: i64,
    prevouts: HashMap<OutPoint, PrevoutRecord>,
}

impl UnsignedTransaction {
    /// True iff a change output exists and is at or below the dust limit.
    pub fn is_change_dust(&self) -> bool {
        self.change > 0 && self.change <= DUST_LIMIT
    }

    pub fn prevout(&self, outpoint: &OutPoint) -> Option<&PrevoutRecord> {
        self.prevouts.get(outpoint)
    }

    pub fn prevouts(&self) -> impl Iterator<Item = (&OutPoint, &PrevoutRecord)> {
        self.prevouts.iter()
    }

    /// Envelope crossing the adapter boundary.
    pub fn summary(&self) -> TransactionSummary {
        TransactionSummary {
            hex: self.hex.clone(),
            total_input: self.input_total,
            amount: self.input_total - self.fee - self.change,
            fees: self.fee,
            change: self.change,
            change_is_dust: self.is_change_dust(),
        }
    }
}

/// Transaction-build envelope crossing the adapter boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub hex: String,
    pub total_input: i64,
    pub amount: i64,
    pub fees: i64,
    pub change: i64,
    pub change_is_dust: bool,
}

/// Build an unsigned version-2 transaction over `utxos`.
///
/// UTXOs are consumed first-fit in input order until the running sum covers
/// `amount`; an `amount` of zero means spend everything minus fees. The fee
/// is `ceil(fee_rate * vsize)` estimated once from the provisional
/// transaction with 64-byte placeholder witnesses — inputs pulled later for
/// fee shortfall or dust remediation do not re-price it. Actual signed
/// witness sizes can differ slightly; the estimate is deliberately not
/// reconciled afterwards.
///
/// Change at or below [`DUST_LIMIT`] triggers pulling further inputs until
/// it clears the limit or the UTXO list runs dry; a still-dusty remainder is
/// reported through [`UnsignedTransaction::is_change_dust`], never failed.
pub fn build_transaction(
    utxos: &[Utxo],
    change_address: &Address,
    destination: &Address,
    amount: i64,
    fee_rate: f64,
) -> Result<UnsignedTransaction, BuildError> {
    if fee_rate <= 0.0 {
        return Err(BuildError::InvalidFeeRate(fee_rate));
    }
    if amount < 0 {
        return Err(BuildError::InvalidAmount(amount));
    }
    let spend_all = amount == 0;

    // First-fit, order-preserving split into matched and unmatched.
    let mut matched: Vec<&Utxo> = Vec::new();
    let mut unmatched: VecDeque<&Utxo> = VecDeque::new();
    let mut matched_total: i64 = 0;
    let mut unmatched_total: i64 = 0;
    for utxo in utxos {
        if !spend_all && matched_total >= amount {
            unmatched_total += utxo.amount;
            unmatched.push_back(utxo);
        } else {
            matched_total += utxo.amount;
            matched.push(utxo);
        }
    }
    if matched_total < amount {
        return Err(BuildError::InsufficientFunds {
            need: amount,
            have: matched_total,
        });
    }

    let mut prevouts = HashMap::new();
    let mut tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: Vec::with_capacity(matched.len()),
        output: vec![TxOut {
            value: Amount::from_sat(amount as u64),
            script_pubkey: destination.script_pubkey(),
        }],
    };
    for utxo in &matched {
        tx.input.push(placeholder_input(utxo.outpoint));
        record_prevout(&mut prevouts, utxo)?;
    }

    // One-shot estimate over the provisional shape (matched inputs, single
    // destination output, placeholder witnesses).
    let fee = (fee_rate * tx.vsize() as f64).ceil() as i64;

    let mut change = matched_total - amount;
    if spend_all {
        change = 0;
        if fee > matched_total {
            return Err(BuildError::InsufficientFundsForFees {
                need: fee,
                have: matched_total,
            });
        }
        tx.output[0].value = Amount::from_sat((matched_total - fee) as u64);
    } else if fee > change {
        let shortfall = fee - change;
        if shortfall > unmatched_total {
            return Err(BuildError::InsufficientFundsForFees {
                need: shortfall,
                have: unmatched_total,
            });
        }
        let mut pulled: i64 = 0;
        while let Some(utxo) = unmatched.pop_front() {
            pulled += utxo.amount;
            matched_total += utxo.amount;
            unmatched_total -= utxo.amount;
            tx.input.push(placeholder_input(utxo.outpoint));
            record_prevout(&mut prevouts, utxo)?;
            if pulled >= shortfall {
                break;
            }
        }
        change = pulled - shortfall;
    } else {
        change -= fee;
    }

    if change > 0 {
        // Change under the dust limit: pull whole inputs to lift it over,
        // stopping when the list runs dry. The remainder may still be dust.
        while change <= DUST_LIMIT && unmatched_total > 0 {
            let utxo = unmatched
                .pop_front()
                .expect("unmatched_total tracks the queue");
            change += utxo.amount;
            matched_total += utxo.amount;
            unmatched_total -= utxo.amount;
            tx.input.push(TxIn {
                previous_output: utxo.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ZERO,
                witness: Witness::new(),
            });
            record_prevout(&mut prevouts, utxo)?;
        }
        tx.output.push(TxOut {
            value: Amount::from_sat(change as u64),
            script_pubkey: change_address.script_pubkey(),
        });
    }

    debug!(
        "built transaction: {} inputs, {} outputs, input total {}, fee {}, change {}",
        tx.input.len(),
        tx.output.len(),
        matched_total,
        fee,
        change
    );

    Ok(UnsignedTransaction {
        hex: serialize_hex(&tx),
        tx,
        input_total: matched_total,
        fee,
        change,
        prevouts,
    })
}

/// Input with a 64-byte placeholder witness so weight estimation sees a
/// key-path spend shape.
fn placeholder_input(outpoint: OutPoint) -> TxIn {
    TxIn {
        previous_output: outpoint,
        script_sig: ScriptBuf::new(),
        sequence: Sequence::ZERO,
        witness: Witness::from_slice(&[vec![0u8; 64]]),
    }
}

fn record_prevout(
    prevouts: &mut HashMap<OutPoint, PrevoutRecord>,
    utxo: &Utxo,
) -> Result<(), BuildError> {
    prevouts.insert(
        utxo.outpoint,
        PrevoutRecord {
            address: utxo.from_address.clone(),
            amount: utxo.amount,
            script: utxo.locking_script()?,
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use bitcoin::{Network, Txid};
    use std::str::FromStr;

    // The expected fee values assume P2TR-sized destination and change
    // outputs, so both point at a taproot address.
    const ADDR: &str = "bcrt1pkm32th8q6qhhnx5l5qmf7v3s29fsdsytl5h69c05chgz9mf4yl2qwnyzzk";

    fn addr() -> Address {
        Address::from_str(ADDR)
            .unwrap()
            .require_network(Network::Regtest)
            .unwrap()
    }

    fn utxo(vout: u32, amount: i64) -> Utxo {
        Utxo {
            from_address: String::new(),
            outpoint: OutPoint {
                txid: Txid::from_byte_array([0x7A; 32]),
                vout,
            },
            amount,
            script: String::new(),
        }
    }

    #[test]
    fn rejects_non_positive_fee_rate() {
        let err = build_transaction(&[], &addr(), &addr(), 101, -1.0).unwrap_err();
        assert!(matches!(err, BuildError::InvalidFeeRate(_)));
        let err = build_transaction(&[], &addr(), &addr(), 101, 0.0).unwrap_err();
        assert!(matches!(err, BuildError::InvalidFeeRate(_)));
    }

    #[test]
    fn rejects_negative_amount() {
        let err = build_transaction(&[utxo(0, 1000)], &addr(), &addr(), -5, 1.0).unwrap_err();
        assert!(matches!(err, BuildError::InvalidAmount(-5)));
    }

    #[test]
    fn insufficient_funds_before_fees() {
        let err = build_transaction(&[utxo(0, 100)], &addr(), &addr(), 101, 1.0).unwrap_err();
        assert!(matches!(
            err,
            BuildError::InsufficientFunds {
                need: 101,
                have: 100
            }
        ));
    }

    #[test]
    fn insufficient_funds_once_fees_included() {
        // 1-in/1-out fee is 111; change of 10 leaves a shortfall of 101
        let err = build_transaction(&[utxo(0, 100)], &addr(), &addr(), 90, 1.0).unwrap_err();
        assert!(matches!(
            err,
            BuildError::InsufficientFundsForFees { need: 101, have: 0 }
        ));
    }

    #[test]
    fn fee_pull_adds_second_input_and_change() {
        let utxos = vec![utxo(0, 100), utxo(1, 1000)];
        let tx = build_transaction(&utxos, &addr(), &addr(), 100, 1.0).unwrap();
        assert_eq!(tx.tx.input.len(), 2);
        assert_eq!(tx.tx.output.len(), 2);
        assert_eq!(tx.input_total, 1100);
        assert_eq!(tx.fee, 111);
        assert_eq!(tx.change, 889);
        assert!(!tx.is_change_dust());
        assert!(!tx.hex.is_empty());
    }

    #[test]
    fn first_fit_exact_match_leaves_no_change() {
        // 211 covers amount 100 plus the 111-sat fee exactly
        let utxos = vec![utxo(0, 211), utxo(1, 1000)];
        let tx = build_transaction(&utxos, &addr(), &addr(), 100, 1.0).unwrap();
        assert_eq!(tx.tx.input.len(), 1);
        assert_eq!(tx.tx.output.len(), 1);
        assert_eq!(tx.input_total, 211);
        assert_eq!(tx.fee, 111);
        assert_eq!(tx.change, 0);
        assert!(!tx.is_change_dust());
    }

    #[test]
    fn spend_all_consumes_every_input() {
        let utxos = vec![utxo(0, 211), utxo(1, 1000)];
        let tx = build_transaction(&utxos, &addr(), &addr(), 0, 1.0).unwrap();
        assert_eq!(tx.tx.input.len(), 2);
        assert_eq!(tx.tx.output.len(), 1);
        assert_eq!(tx.input_total, 1211);
        assert_eq!(tx.fee, 169);
        assert_eq!(tx.change, 0);
        assert_eq!(tx.tx.output[0].value.to_sat(), 1211 - 169);

        let single = build_transaction(&[utxo(1, 1000)], &addr(), &addr(), 0, 1.0).unwrap();
        assert_eq!(single.tx.input.len(), 1);
        assert_eq!(single.tx.output.len(), 1);
        assert_eq!(single.input_total, 1000);
        assert_eq!(single.fee, 111);
        assert_eq!(single.change, 0);
    }

    #[test]
    fn change_exactly_at_dust_limit() {
        let utxos = vec![utxo(0, 100), utxo(1, 1000)];
        let tx = build_transaction(&utxos, &addr(), &addr(), 601, 1.0).unwrap();
        assert_eq!(tx.tx.input.len(), 2);
        assert_eq!(tx.tx.output.len(), 2);
        assert_eq!(tx.input_total, 1100);
        assert_eq!(tx.fee, 169);
        assert_eq!(tx.change, 330);
        assert!(tx.is_change_dust());
    }

    #[test]
    fn change_below_dust_limit_without_spare_inputs() {
        let utxos = vec![utxo(0, 100), utxo(1, 1000)];
        let tx = build_transaction(&utxos, &addr(), &addr(), 700, 1.0).unwrap();
        assert_eq!(tx.tx.input.len(), 2);
        assert_eq!(tx.tx.output.len(), 2);
        assert_eq!(tx.input_total, 1100);
        assert_eq!(tx.fee, 169);
        assert_eq!(tx.change, 231);
        assert!(tx.is_change_dust());
    }

    #[test]
    fn one_spare_input_lifts_change_over_dust() {
        let utxos = vec![utxo(0, 100), utxo(1, 1000), utxo(2, 400)];
        let tx = build_transaction(&utxos, &addr(), &addr(), 700, 1.0).unwrap();
        assert_eq!(tx.tx.input.len(), 3);
        assert_eq!(tx.tx.output.len(), 2);
        assert_eq!(tx.input_total, 1500);
        assert_eq!(tx.fee, 169);
        assert_eq!(tx.change, 631);
        assert!(!tx.is_change_dust());
    }

    #[test]
    fn several_spare_inputs_pulled_until_clear_of_dust() {
        let utxos = vec![utxo(0, 100), utxo(1, 1000), utxo(2, 200), utxo(3, 200)];
        let tx = build_transaction(&utxos, &addr(), &addr(), 850, 1.0).unwrap();
        assert_eq!(tx.tx.input.len(), 4);
        assert_eq!(tx.tx.output.len(), 2);
        assert_eq!(tx.input_total, 1500);
        assert_eq!(tx.fee, 169);
        assert_eq!(tx.change, 481);
        assert!(!tx.is_change_dust());
    }

    #[test]
    fn change_may_remain_dust_when_inputs_run_dry() {
        let utxos = vec![utxo(0, 100), utxo(1, 1000), utxo(2, 20), utxo(3, 20)];
        let tx = build_transaction(&utxos, &addr(), &addr(), 850, 1.0).unwrap();
        assert_eq!(tx.tx.input.len(), 4);
        assert_eq!(tx.tx.output.len(), 2);
        assert_eq!(tx.input_total, 1140);
        assert_eq!(tx.fee, 169);
        assert_eq!(tx.change, 121);
        assert!(tx.is_change_dust());
    }

    #[test]
    fn dust_predicate_boundaries() {
        let mut tx = build_transaction(&[utxo(0, 1000)], &addr(), &addr(), 0, 1.0).unwrap();
        tx.change = 0;
        assert!(!tx.is_change_dust());
        tx.change = 1;
        assert!(tx.is_change_dust());
        tx.change = DUST_LIMIT;
        assert!(tx.is_change_dust());
        tx.change = DUST_LIMIT + 1;
        assert!(!tx.is_change_dust());
    }

    #[test]
    fn retains_prevout_records_for_every_input() {
        let mut utxos = vec![utxo(0, 100), utxo(1, 1000)];
        utxos[0].from_address = "addr-a".into();
        utxos[1].from_address = "addr-b".into();
        let tx = build_transaction(&utxos, &addr(), &addr(), 100, 1.0).unwrap();

        for txin in &tx.tx.input {
            let record = tx.prevout(&txin.previous_output).unwrap();
            assert!(!record.address.is_empty());
        }
        assert_eq!(tx.prevouts().count(), 2);
    }

    #[test]
    fn serialized_tx_is_version_2_locktime_0() {
        let tx = build_transaction(&[utxo(0, 1000)], &addr(), &addr(), 0, 1.0).unwrap();
        assert_eq!(tx.tx.version, Version::TWO);
        assert_eq!(tx.tx.lock_time, LockTime::ZERO);
        assert_eq!(tx.hex, serialize_hex(&tx.tx));
    }

    #[test]
    fn summary_envelope_serializes_camel_case() {
        let utxos = vec![utxo(0, 100), utxo(1, 1000)];
        let tx = build_transaction(&utxos, &addr(), &addr(), 100, 1.0).unwrap();
        let summary = tx.summary();
        assert_eq!(summary.amount, 100);
        assert_eq!(summary.total_input, 1100);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["totalInput"].as_i64().unwrap(), 1100);
        assert_eq!(json["fees"].as_i64().unwrap(), 111);
        assert_eq!(json["change"].as_i64().unwrap(), 889);
        assert!(!json["changeIsDust"].as_bool().unwrap());
    }

    #[test]
    fn bad_script_hex_is_rejected() {
        let mut bad = utxo(0, 1000);
        bad.script = "zz".into();
        let err = build_transaction(&[bad], &addr(), &addr(), 0, 1.0).unwrap_err();
        assert!(matches!(err, BuildError::BadScriptHex(_)));
    }
}
