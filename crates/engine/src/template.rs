//! Template resolution — substitutes `{{nodeId.path}}` references in node
//! configuration using the outputs of previously-executed nodes.
//!
//! The resolver is pure: it rebuilds arrays and objects structurally and
//! never mutates its input. Unresolvable references are left verbatim so a
//! misconfigured node fails visibly at the consuming handler rather than
//! silently receiving an empty string.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::models::Context;

static TEMPLATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").unwrap());

/// Resolve every `{{…}}` reference in `value` against `context`.
pub fn resolve(value: &Value, context: &Context) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_str(s, context)),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, context)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve(v, context)))
                .collect(),
        ),
        // Non-string scalars pass through unchanged.
        other => other.clone(),
    }
}

fn resolve_str(s: &str, context: &Context) -> String {
    TEMPLATE_RE
        .replace_all(s, |caps: &Captures<'_>| {
            match lookup(context, caps[1].trim()) {
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
                // Leave the literal `{{…}}` in place.
                None => caps[0].to_owned(),
            }
        })
        .into_owned()
}

/// Walk a dot-separated path: the first segment names a node, the rest
/// descend into that node's output by key (or index, for arrays).
fn lookup<'a>(context: &'a Context, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = context.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Context {
        let mut ctx = Context::new();
        ctx.insert("fetch".into(), json!({ "v": 6, "name": "ada", "tags": ["x", "y"] }));
        ctx.insert(
            "query".into(),
            json!({ "rows": [{ "id": 1 }], "meta": { "count": 1 } }),
        );
        ctx
    }

    #[test]
    fn string_leaf_resolves_by_path() {
        let resolved = resolve(&json!("hello {{fetch.name}}"), &ctx());
        assert_eq!(resolved, json!("hello ada"));
    }

    #[test]
    fn non_string_values_substitute_their_json() {
        let resolved = resolve(&json!("count={{query.meta.count}}"), &ctx());
        assert_eq!(resolved, json!("count=1"));

        let resolved = resolve(&json!("rows: {{query.rows}}"), &ctx());
        assert_eq!(resolved, json!("rows: [{\"id\":1}]"));
    }

    #[test]
    fn multiple_references_in_one_string() {
        let resolved = resolve(&json!("https://example.test/{{fetch.v}}/{{query.meta.count}}"), &ctx());
        assert_eq!(resolved, json!("https://example.test/6/1"));
    }

    #[test]
    fn unresolvable_reference_is_left_verbatim() {
        let resolved = resolve(&json!("{{missing.path}} and {{fetch.nope}}"), &ctx());
        assert_eq!(resolved, json!("{{missing.path}} and {{fetch.nope}}"));
    }

    #[test]
    fn descending_through_non_object_fails_softly() {
        // `fetch.v` is a number; descending further cannot succeed.
        let resolved = resolve(&json!("{{fetch.v.deeper}}"), &ctx());
        assert_eq!(resolved, json!("{{fetch.v.deeper}}"));
    }

    #[test]
    fn arrays_support_index_segments() {
        let resolved = resolve(&json!("{{fetch.tags.1}}"), &ctx());
        assert_eq!(resolved, json!("y"));
        let resolved = resolve(&json!("{{query.rows.0.id}}"), &ctx());
        assert_eq!(resolved, json!("1"));
    }

    #[test]
    fn containers_are_rebuilt_and_scalars_pass_through() {
        let input = json!({
            "url": "https://example.test/{{fetch.v}}",
            "retries": 3,
            "flags": [true, "{{fetch.name}}"],
        });
        let resolved = resolve(&input, &ctx());
        assert_eq!(
            resolved,
            json!({
                "url": "https://example.test/6",
                "retries": 3,
                "flags": [true, "ada"],
            })
        );
        // Input untouched.
        assert_eq!(input["url"], "https://example.test/{{fetch.v}}");
    }

    #[test]
    fn resolution_is_idempotent_on_resolved_values() {
        let context = ctx();
        let once = resolve(&json!({ "u": "a {{fetch.v}} b", "n": 1 }), &context);
        let twice = resolve(&once, &context);
        assert_eq!(once, twice);
    }
}
