#![no_main]

use duet_vault::inscribe;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // the envelope must hold for arbitrary payloads: OP_FALSE OP_IF ... OP_ENDIF
    let script = inscribe(data);
    let bytes = script.as_bytes();
    assert_eq!(bytes[0], 0x00, "OP_FALSE");
    assert_eq!(bytes[1], 0x63, "OP_IF");
    assert_eq!(bytes[bytes.len() - 1], 0x68, "OP_ENDIF");
});
