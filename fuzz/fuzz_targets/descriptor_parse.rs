#![no_main]

use duet_core::{DerivationIndex, KeyChain};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // from_parent_descriptor must never panic — always Ok or Err.
    if let Ok(s) = std::str::from_utf8(data) {
        let secp = bitcoin::secp256k1::Secp256k1::new();
        let _ = KeyChain::from_parent_descriptor(&secp, s, DerivationIndex::normal(0));

        // prepend the expected prefix to exercise the deeper parsing paths
        let prefixed = format!("tr([{}", s);
        let _ = KeyChain::from_parent_descriptor(&secp, &prefixed, DerivationIndex::normal(0));
    }
});
