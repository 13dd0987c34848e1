#![no_main]
use elcom_tariffs::PriceKind;
use elcom_tariffs::mapper::units::{normalize, parse_unit};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (&str, f64)| {
    let (unit, value) = input;
    let hint = parse_unit(Some(unit));
    for kind in PriceKind::ALL {
        if let Some((v, _)) = normalize(kind, value, hint) {
            assert!(v.is_finite() && v >= 0.0);
        }
    }
});
