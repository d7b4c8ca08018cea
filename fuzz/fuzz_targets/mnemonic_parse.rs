#![no_main]

use duet_core::{parse_mnemonic, parse_network};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // both parsers must reject arbitrary input without panicking
        let _ = parse_mnemonic(s);
        let _ = parse_network(s);
    }
});
