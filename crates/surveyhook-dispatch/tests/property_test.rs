//! Property tests for event type to handler resolution.

use proptest::prelude::*;
use surveyhook_dispatch::{sanitize_event_type, HandlerMapping};

proptest! {
    #[test]
    fn sanitised_keys_never_contain_dots(event_type in "[a-z._]{0,40}") {
        let key = sanitize_event_type(&event_type);

        prop_assert!(!key.contains('.'));
        prop_assert_eq!(key.len(), event_type.len());
    }

    #[test]
    fn dotted_and_underscored_types_resolve_alike(
        parts in prop::collection::vec("[a-z]{1,10}", 1..5),
    ) {
        let dotted = parts.join(".");
        let underscored = parts.join("_");

        let mut mapping = HandlerMapping::new();
        mapping.insert(underscored.clone(), "handler");

        prop_assert_eq!(mapping.handler_for(&dotted), Some("handler"));
        prop_assert_eq!(mapping.handler_for(&underscored), Some("handler"));
    }

    #[test]
    fn unmapped_types_resolve_to_nothing(event_type in "[a-z.]{1,20}") {
        let mapping = HandlerMapping::new();

        prop_assert_eq!(mapping.handler_for(&event_type), None);
    }
}
