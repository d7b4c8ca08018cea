//! Taproot tweak pipeline and tapscript tree assembly.
//!
//! Per address index, the two wallet legs are combined as:
//!
//! 1. `commitment = SHA256(primary secret bytes)`
//! 2. the companion key is taproot-tweaked with the commitment, producing
//!    the joint key-path key;
//! 3. the single fallback leaf (`pk(primary)` + `older(timelock)`) is
//!    assembled into a tree whose root tweaks the step-2 key into the final
//!    output key.
//!
//! Both wallet modes hash the primary *private* bytes: the primary seed is
//! known even in recovery mode, while the companion side may be public-only.

use bitcoin::hashes::{sha256, Hash};
use bitcoin::key::TapTweak;
use bitcoin::secp256k1::{All, Keypair, PublicKey, Secp256k1, SecretKey};
use bitcoin::taproot::{
    ControlBlock, LeafVersion, TapLeafHash, TapNodeHash, TaprootBuilder, TaprootSpendInfo,
};
use bitcoin::{Address, Network, ScriptBuf, XOnlyPublicKey};
use thiserror::Error;

use crate::script::{timelock_leaf_script, Timelock};

#[derive(Error, Debug)]
pub enum TaprootError {
    #[error("tapscript tree has no leaves")]
    EmptyTree,
    #[error("no leaf at index {0}")]
    LeafIndex(usize),
    #[error("taproot tree construction failed: {0}")]
    TreeBuild(String),
    #[error("control block not found for leaf {0}")]
    ControlBlock(usize),
}

/// Everything captured at address-generation time that a script-path spend
/// of one leaf needs later. Recovery signing must reuse these bytes
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapscriptLeafData {
    pub leaf_hash: TapLeafHash,
    pub leaf_script: ScriptBuf,
    pub control_block: ControlBlock,
    pub merkle_root: TapNodeHash,
}

/// Ordered leaf scripts plus the internal key they commit to.
///
/// Leaves keep insertion order; a single leaf sits at depth 0 and larger
/// sets form a left-leaning tree with earlier leaves at shallower depth.
#[derive(Debug, Clone)]
pub struct TapscriptBuilder {
    internal_key: XOnlyPublicKey,
    leaves: Vec<ScriptBuf>,
}

impl TapscriptBuilder {
    pub fn new(internal_key: XOnlyPublicKey) -> Self {
        Self {
            internal_key,
            leaves: Vec::new(),
        }
    }

    pub fn push_leaf(mut self, script: ScriptBuf) -> Self {
        self.leaves.push(script);
        self
    }

    pub fn internal_key(&self) -> XOnlyPublicKey {
        self.internal_key
    }

    pub fn leaves(&self) -> &[ScriptBuf] {
        &self.leaves
    }

    fn spend_info(&self, secp: &Secp256k1<All>) -> Result<TaprootSpendInfo, TaprootError> {
        if self.leaves.is_empty() {
            return Err(TaprootError::EmptyTree);
        }
        let mut builder = TaprootBuilder::new();
        let depths = leaf_depths(self.leaves.len());
        for (depth, script) in depths.into_iter().zip(&self.leaves) {
            builder = builder
                .add_leaf(depth, script.clone())
                .map_err(|e| TaprootError::TreeBuild(e.to_string()))?;
        }
        builder
            .finalize(secp, self.internal_key)
            .map_err(|_| TaprootError::TreeBuild("taproot finalize failed".into()))
    }

    /// Assemble the tree and encode the tweaked output key as a witness-v1
    /// (bech32m) address.
    pub fn address(&self, secp: &Secp256k1<All>, network: Network) -> Result<Address, TaprootError> {
        let info = self.spend_info(secp)?;
        Ok(Address::p2tr(
            secp,
            self.internal_key,
            info.merkle_root(),
            network,
        ))
    }

    pub fn merkle_root(&self, secp: &Secp256k1<All>) -> Result<TapNodeHash, TaprootError> {
        self.spend_info(secp)?
            .merkle_root()
            .ok_or(TaprootError::EmptyTree)
    }

    /// Control-block material for a script-path spend of leaf `index`.
    pub fn to_sign(
        &self,
        secp: &Secp256k1<All>,
        index: usize,
    ) -> Result<TapscriptLeafData, TaprootError> {
        let script = self
            .leaves
            .get(index)
            .ok_or(TaprootError::LeafIndex(index))?
            .clone();
        let info = self.spend_info(secp)?;
        let control_block = info
            .control_block(&(script.clone(), LeafVersion::TapScript))
            .ok_or(TaprootError::ControlBlock(index))?;
        let merkle_root = info.merkle_root().ok_or(TaprootError::EmptyTree)?;
        Ok(TapscriptLeafData {
            leaf_hash: TapLeafHash::from_script(&script, LeafVersion::TapScript),
            leaf_script: script,
            control_block,
            merkle_root,
        })
    }
}

/// Depths for `n` insertion-ordered leaves forming a valid binary tree.
///
/// Left-leaning: the first leaf takes one side of the root and the rest
/// share the other side recursively, so earlier leaves get cheaper proofs.
fn leaf_depths(n: usize) -> Vec<u8> {
    match n {
        1 => vec![0],
        2 => vec![1, 1],
        _ => {
            let mut depths = vec![1u8];
            depths.extend(leaf_depths(n - 1).into_iter().map(|d| d + 1));
            depths
        }
    }
}

/// Taproot tweak committing the companion key to the primary secret:
/// SHA256 over the 32 secret-key bytes.
pub fn key_commitment(primary: &SecretKey) -> TapNodeHash {
    let digest = sha256::Hash::hash(&primary.secret_bytes());
    TapNodeHash::from_byte_array(digest.to_byte_array())
}

/// A derived joint address plus the material captured at generation time.
#[derive(Debug, Clone)]
pub struct JointAddress {
    pub address: Address,
    /// Hash-tweaked companion key the tree root is committed to.
    pub internal_key: XOnlyPublicKey,
    pub merkle_root: TapNodeHash,
    /// Fallback-leaf data for a later script-path spend.
    pub leaf: TapscriptLeafData,
}

/// Derive the joint address for one index pair. Only the companion's public
/// key is needed, so this works in recovery mode.
pub fn joint_address(
    secp: &Secp256k1<All>,
    network: Network,
    companion: &PublicKey,
    primary: &SecretKey,
    timelock: Timelock,
) -> Result<JointAddress, TaprootError> {
    let commitment = key_commitment(primary);
    let (companion_xonly, _parity) = companion.x_only_public_key();
    let (tweaked, _parity) = companion_xonly.tap_tweak(secp, Some(commitment));
    let internal_key = tweaked.to_x_only_public_key();

    let primary_pub = PublicKey::from_secret_key(secp, primary);
    let leaf_script = timelock_leaf_script(secp, timelock, &primary_pub);

    let builder = TapscriptBuilder::new(internal_key).push_leaf(leaf_script);
    let address = builder.address(secp, network)?;
    let leaf = builder.to_sign(secp, 0)?;

    Ok(JointAddress {
        address,
        internal_key,
        merkle_root: leaf.merkle_root,
        leaf,
    })
}

/// Hash-tweaked companion keypair: the cooperative key-path signing key
/// before the final tree-root tweak is applied by the signer.
pub fn joint_keypair(
    secp: &Secp256k1<All>,
    companion: &SecretKey,
    primary: &SecretKey,
) -> Keypair {
    let commitment = key_commitment(primary);
    let keypair = Keypair::from_secret_key(secp, companion);
    keypair.tap_tweak(secp, Some(commitment)).to_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::key::TweakedPublicKey;
    use rand::RngCore;

    fn random_secret() -> SecretKey {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        SecretKey::from_slice(&bytes).unwrap()
    }

    fn test_joint(secp: &Secp256k1<All>) -> (SecretKey, SecretKey, JointAddress) {
        let primary = random_secret();
        let companion = random_secret();
        let companion_pub = PublicKey::from_secret_key(secp, &companion);
        let joint = joint_address(
            secp,
            Network::Regtest,
            &companion_pub,
            &primary,
            Timelock::from_blocks(10).unwrap(),
        )
        .unwrap();
        (primary, companion, joint)
    }

    #[test]
    fn joint_address_is_deterministic() {
        let secp = Secp256k1::new();
        let primary = random_secret();
        let companion = PublicKey::from_secret_key(&secp, &random_secret());
        let timelock = Timelock::from_blocks(10).unwrap();

        let a = joint_address(&secp, Network::Regtest, &companion, &primary, timelock).unwrap();
        let b = joint_address(&secp, Network::Regtest, &companion, &primary, timelock).unwrap();
        assert_eq!(a.address, b.address);
        assert_eq!(a.leaf, b.leaf);
    }

    #[test]
    fn different_timelocks_produce_different_addresses() {
        let secp = Secp256k1::new();
        let primary = random_secret();
        let companion = PublicKey::from_secret_key(&secp, &random_secret());

        let a = joint_address(
            &secp,
            Network::Regtest,
            &companion,
            &primary,
            Timelock::from_blocks(10).unwrap(),
        )
        .unwrap();
        let b = joint_address(
            &secp,
            Network::Regtest,
            &companion,
            &primary,
            Timelock::from_blocks(11).unwrap(),
        )
        .unwrap();
        assert_ne!(a.address, b.address);
    }

    #[test]
    fn joint_keypair_matches_internal_key() {
        let secp = Secp256k1::new();
        let (primary, companion, joint) = test_joint(&secp);

        // private-side tweak must land on the public-side internal key
        let keypair = joint_keypair(&secp, &companion, &primary);
        assert_eq!(keypair.x_only_public_key().0, joint.internal_key);
    }

    #[test]
    fn address_commits_internal_key_to_tree_root() {
        let secp = Secp256k1::new();
        let (_, _, joint) = test_joint(&secp);

        let rebuilt = Address::p2tr(
            &secp,
            joint.internal_key,
            Some(joint.merkle_root),
            Network::Regtest,
        );
        assert_eq!(joint.address, rebuilt);

        // output key differs from internal key once the tree is committed
        let (output_key, _) = joint.internal_key.tap_tweak(&secp, Some(joint.merkle_root));
        assert_ne!(output_key.to_x_only_public_key(), joint.internal_key);
        assert_eq!(
            joint.address,
            Address::p2tr_tweaked(output_key, Network::Regtest)
        );
    }

    #[test]
    fn control_block_verifies_against_output_key() {
        let secp = Secp256k1::new();
        let (_, _, joint) = test_joint(&secp);

        let (output_key, _) = joint.internal_key.tap_tweak(&secp, Some(joint.merkle_root));
        assert!(joint.leaf.control_block.verify_taproot_commitment(
            &secp,
            output_key.to_x_only_public_key(),
            &joint.leaf.leaf_script,
        ));
    }

    #[test]
    fn single_leaf_root_is_leaf_hash() {
        let secp = Secp256k1::new();
        let (_, _, joint) = test_joint(&secp);
        assert_eq!(
            joint.merkle_root,
            TapNodeHash::from(joint.leaf.leaf_hash),
            "single-leaf tree root must equal the leaf hash"
        );
    }

    #[test]
    fn builder_rejects_empty_tree_and_bad_leaf_index() {
        let secp = Secp256k1::new();
        let internal = PublicKey::from_secret_key(&secp, &random_secret())
            .x_only_public_key()
            .0;

        let empty = TapscriptBuilder::new(internal);
        assert!(matches!(
            empty.address(&secp, Network::Regtest),
            Err(TaprootError::EmptyTree)
        ));

        let one = TapscriptBuilder::new(internal)
            .push_leaf(ScriptBuf::from_bytes(vec![0x51]));
        assert!(matches!(
            one.to_sign(&secp, 1),
            Err(TaprootError::LeafIndex(1))
        ));
    }

    #[test]
    fn multi_leaf_trees_are_left_leaning() {
        assert_eq!(leaf_depths(1), vec![0]);
        assert_eq!(leaf_depths(2), vec![1, 1]);
        assert_eq!(leaf_depths(3), vec![1, 2, 2]);
        assert_eq!(leaf_depths(4), vec![1, 2, 3, 3]);

        let secp = Secp256k1::new();
        let internal = PublicKey::from_secret_key(&secp, &random_secret())
            .x_only_public_key()
            .0;
        // three distinct one-opcode leaves still form a valid tree
        let builder = TapscriptBuilder::new(internal)
            .push_leaf(ScriptBuf::from_bytes(vec![0x51]))
            .push_leaf(ScriptBuf::from_bytes(vec![0x52]))
            .push_leaf(ScriptBuf::from_bytes(vec![0x53]));
        let address = builder.address(&secp, Network::Regtest).unwrap();
        assert!(address.to_string().starts_with("bcrt1p"));

        for index in 0..3 {
            let leaf = builder.to_sign(&secp, index).unwrap();
            let (output_key, _) = internal.tap_tweak(&secp, Some(leaf.merkle_root));
            assert!(leaf.control_block.verify_taproot_commitment(
                &secp,
                output_key.to_x_only_public_key(),
                &leaf.leaf_script,
            ));
        }
    }

    #[test]
    fn commitment_is_sha256_of_secret_bytes() {
        let secret = SecretKey::from_slice(&[0x11; 32]).unwrap();
        let commitment = key_commitment(&secret);
        let expected = sha256::Hash::hash(&[0x11; 32]);
        assert_eq!(commitment.to_byte_array(), expected.to_byte_array());
    }

    #[test]
    fn tweaked_public_key_roundtrip() {
        // joint_address drops parity when reusing the tweaked key as the
        // next internal key; the dangerous_assume path must agree.
        let secp = Secp256k1::new();
        let (_, _, joint) = test_joint(&secp);
        let assumed = TweakedPublicKey::dangerous_assume_tweaked(joint.internal_key);
        assert_eq!(assumed.serialize(), joint.internal_key.serialize());
    }
}
