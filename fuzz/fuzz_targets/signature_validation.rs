#![no_main]

//! Fuzz target for Survey Monkey signature validation.
//!
//! Splits the input into payload, api key, secret and claimed signature and
//! checks that validation never panics and only accepts the signature it
//! computes itself.

use libfuzzer_sys::fuzz_target;
use surveyhook_api::crypto::{compute_signature, validate_signature};

fuzz_target!(|data: &[u8]| {
    let mut parts = data.splitn(4, |byte| *byte == 0);
    let payload = parts.next().unwrap_or_default();
    let api_key = String::from_utf8_lossy(parts.next().unwrap_or_default());
    let secret = String::from_utf8_lossy(parts.next().unwrap_or_default());
    let claimed = String::from_utf8_lossy(parts.next().unwrap_or_default());

    let result = validate_signature(payload, &api_key, &secret, &claimed);

    if result.is_valid {
        let expected = compute_signature(payload, &api_key, &secret).unwrap();
        assert_eq!(expected, claimed);
    } else {
        assert!(result.error_message.is_some());
    }

    if !api_key.is_empty() && !secret.is_empty() {
        let signature = compute_signature(payload, &api_key, &secret).unwrap();
        assert!(validate_signature(payload, &api_key, &secret, &signature).is_valid);
    }
});
