#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use trindex::index::pfor;

#[derive(Arbitrary, Debug)]
enum Input<'a> {
    /// Decoding arbitrary bytes must fail cleanly, never panic
    Decode { count: u32, data: &'a [u8] },
    /// Encoded values must decode to themselves
    Roundtrip { values: Vec<u32> },
}

fuzz_target!(|input: Input| {
    match input {
        Input::Decode { count, data } => {
            let _ = pfor::decode_to_vec(data, count as usize);
        }
        Input::Roundtrip { values } => {
            let buf = pfor::encode_to_vec(&values);
            let (decoded, used) = pfor::decode_to_vec(&buf, values.len()).unwrap();
            assert_eq!(decoded, values);
            assert_eq!(used, buf.len());
        }
    }
});
