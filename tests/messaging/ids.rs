use proptest::prelude::*;
use std::collections::HashSet;
use tome_core::messaging::ids;

proptest! {
    #[test]
    fn test_generated_ids_are_unique(count in 1usize..200) {
        let generated: HashSet<String> = (0..count).map(|_| ids::generate_message_id()).collect();
        prop_assert_eq!(generated.len(), count);
    }

    #[test]
    fn test_generated_ids_keep_their_prefix(prefix in "[a-z]{1,12}") {
        let id = ids::generate_id(&prefix);
        let expected = format!("{prefix}_");
        prop_assert!(id.starts_with(&expected));
        prop_assert_eq!(id.split('_').count(), 3);
    }
}

#[test]
fn test_id_kinds_are_distinguishable() {
    assert!(ids::generate_trace_id().starts_with("trace_"));
    assert!(ids::generate_span_id().starts_with("span_"));
    assert!(ids::generate_connection_id().starts_with("connection_"));
}
