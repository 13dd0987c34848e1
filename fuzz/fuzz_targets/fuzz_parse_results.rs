#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bodies must be rejected, never panic
    if let Ok(results) = elcom_tariffs::sparql::parse_results(data) {
        for row in &results.bindings {
            for var in &results.vars {
                let _ = row.uri(var);
                let _ = row.text(var);
            }
        }
    }
});
