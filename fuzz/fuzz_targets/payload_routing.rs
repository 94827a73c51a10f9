#![no_main]

//! Fuzz target for event type extraction from arbitrary JSON.
//!
//! Any byte string that parses as JSON must yield either no type or a
//! non-empty type other than `0`, and its mapping key must not contain dots.

use libfuzzer_sys::fuzz_target;
use surveyhook_core::{DeliveryId, DeliveryRecord};
use surveyhook_dispatch::{sanitize_event_type, HandlerMapping};

fuzz_target!(|data: &[u8]| {
    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    let record =
        DeliveryRecord::new(DeliveryId(1), "survey-monkey", payload).with_body(data.to_vec());

    for key in ["event_type", "meta.event_type", "a.b.c"] {
        if let Some(event_type) = record.event_type(key) {
            assert!(!event_type.is_empty() && event_type != "0");

            let event_type = event_type.as_str();
            let sanitised = sanitize_event_type(event_type);
            assert!(!sanitised.contains('.'));

            let mut mapping = HandlerMapping::new();
            mapping.insert(sanitised, "handler");
            assert_eq!(mapping.handler_for(event_type), Some("handler"));
        }
    }
});
