// crates/tracehub-core/src/json.rs
// ============================================================================
// Module: TraceHub Nested JSON Access
// Description: Dotted-path lookups into a `serde_json::Value` context.
// Purpose: Back the policy engine's `field: "signals.financial_risk"` style
//          condition paths without pulling in a full JSONPath engine.
// Dependencies: serde_json
// ============================================================================

use serde_json::Value;

/// Resolves a dotted path (`"a.b.c"`) against a JSON object, failing closed
/// (returning `None`) on any missing key or non-object intermediate node,
/// rather than raising an error.
#[must_use]
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(root, |node, segment| node.as_object()?.get(segment))
}

#[cfg(test)]
mod tests {
    use super::get_path;
    use serde_json::json;

    #[test]
    fn resolves_nested_field() {
        let ctx = json!({"signals": {"financial_risk": 0.9}});
        assert_eq!(get_path(&ctx, "signals.financial_risk"), Some(&json!(0.9)));
    }

    #[test]
    fn missing_path_is_none() {
        let ctx = json!({"signals": {}});
        assert_eq!(get_path(&ctx, "signals.missing"), None);
        assert_eq!(get_path(&ctx, "signals.missing.deeper"), None);
    }

    #[test]
    fn non_object_intermediate_is_none() {
        let ctx = json!({"signals": 1});
        assert_eq!(get_path(&ctx, "signals.financial_risk"), None);
    }
}
