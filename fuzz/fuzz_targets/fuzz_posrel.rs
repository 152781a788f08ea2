#![no_main]

use libfuzzer_sys::fuzz_target;
use trindex::index::posrel::{PosrelBits, PosrelWriter};

fuzz_target!(|runs: Vec<(Vec<u8>, u8)>| {
    let mut writer = PosrelWriter::new(Vec::new());
    let mut expected = Vec::new();

    for (bytes, len) in &runs {
        let n = (*len as usize).min(bytes.len() * 8);
        writer.write(bytes, n).unwrap();
        expected.extend(PosrelBits::new(bytes).iter(n));
    }

    let out = writer.into_inner().unwrap();
    let bits = PosrelBits::new(&out);
    assert_eq!(out.len(), PosrelBits::bytes_for(expected.len()));
    assert!(bits.iter(expected.len()).eq(expected.iter().copied()));
});
