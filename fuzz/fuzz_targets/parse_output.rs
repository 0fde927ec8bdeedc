#![no_main]

use libfuzzer_sys::fuzz_target;
use model_ensemble::parse_model_output;

fuzz_target!(|data: &[u8]| {
    if let Ok(raw) = std::str::from_utf8(data) {
        let parsed = parse_model_output(raw);
        // No span means the fallback, which keeps the raw text.
        if !raw.contains('{') {
            assert_eq!(parsed.label, "unknown");
            assert_eq!(parsed.rationale, raw);
        }
        assert_eq!(parse_model_output(raw), parsed);
    }
});
