//! Dot-addressed access to JSON documents.
//!
//! Paths are dot-separated keys (`user.address.city`). On reads, a segment
//! may carry an index suffix (`items[2].sku`) to step into an array. Writes
//! treat `name[N]` as a plain key.
//!
//! None of these functions fail: unresolvable paths read as absent and
//! writes that cannot land are dropped.

use serde_json::{Map, Value};

/// A JSON object at the root of a payload.
pub type Document = Map<String, Value>;

fn segments(path: &str) -> Option<Vec<&str>> {
    if path.is_empty() {
        return None;
    }
    Some(path.split('.').collect())
}

fn parse_index(segment: &str) -> Option<(&str, usize)> {
    let open = segment.find('[')?;
    let index = segment[open + 1..].strip_suffix(']')?.parse().ok()?;
    Some((&segment[..open], index))
}

fn lookup<'a>(doc: &'a Document, segments: &[&str]) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let value = match parse_index(first) {
        Some((key, index)) => doc.get(key)?.as_array()?.get(index)?,
        None => doc.get(*first)?,
    };
    if rest.is_empty() {
        Some(value)
    } else {
        lookup(value.as_object()?, rest)
    }
}

fn parent_mut<'a>(doc: &'a mut Document, parents: &[&str]) -> Option<&'a mut Document> {
    let mut current = doc;
    for segment in parents {
        current = current.get_mut(*segment)?.as_object_mut()?;
    }
    Some(current)
}

/// Reads the value at `path`.
///
/// ```
/// use serde_json::json;
/// use wrench_core::json_path;
///
/// let doc = json!({"items": [{"sku": "a"}, {"sku": "b"}]});
/// let doc = doc.as_object().unwrap();
///
/// assert_eq!(json_path::get(doc, "items[1].sku"), Some(&json!("b")));
/// assert_eq!(json_path::get(doc, "items[9].sku"), None);
/// ```
pub fn get<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    lookup(doc, &segments(path)?)
}

/// Reads the value at `path` and removes it from its parent map.
///
/// Values reached through an array index are returned but not removed.
pub fn take(doc: &mut Document, path: &str) -> Option<Value> {
    let segments = segments(path)?;
    if segments.iter().any(|s| parse_index(s).is_some()) {
        return lookup(doc, &segments).cloned();
    }
    let (last, parents) = segments.split_last()?;
    parent_mut(doc, parents)?.remove(*last)
}

/// Writes `value` at `path` without creating intermediates.
///
/// Returns `false` when an intermediate is missing or is not an object, in
/// which case the document is left untouched.
pub fn set(doc: &mut Document, path: &str, value: Value) -> bool {
    let Some(segments) = segments(path) else {
        return false;
    };
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };
    match parent_mut(doc, parents) {
        Some(parent) => {
            parent.insert((*last).to_string(), value);
            true
        }
        None => false,
    }
}

/// Writes `value` at `path`, creating intermediate objects as needed.
///
/// Intermediates that exist but are not objects are replaced.
pub fn create_property(doc: &mut Document, path: &str, value: Value) {
    let Some(segments) = segments(path) else {
        return;
    };
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = doc;
    for segment in parents {
        let entry = current
            .entry(*segment)
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert((*last).to_string(), value);
}

/// Deletes the value at `path`, returning it if it existed.
pub fn remove(doc: &mut Document, path: &str) -> Option<Value> {
    let segments = segments(path)?;
    let (last, parents) = segments.split_last()?;
    parent_mut(doc, parents)?.remove(*last)
}

/// Moves the value at `old` to `new`. Returns `false` when `old` is absent.
pub fn rename(doc: &mut Document, old: &str, new: &str) -> bool {
    match take(doc, old) {
        Some(value) => {
            create_property(doc, new, value);
            true
        }
        None => false,
    }
}

/// Copies the value at `src` to `dst`. Returns `false` when `src` is absent.
pub fn duplicate(doc: &mut Document, src: &str, dst: &str) -> bool {
    match get(doc, src).cloned() {
        Some(value) => {
            create_property(doc, dst, value);
            true
        }
        None => false,
    }
}

/// Applies `old:new` renames in order. Entries without `:` are skipped.
pub fn rename_properties<S: AsRef<str>>(doc: &mut Document, entries: &[S]) {
    for entry in entries {
        if let Some((old, new)) = entry.as_ref().split_once(':') {
            rename(doc, old, new);
        }
    }
}

/// Applies `src:dst` copies in order. Entries without `:` are skipped.
pub fn duplicate_properties<S: AsRef<str>>(doc: &mut Document, entries: &[S]) {
    for entry in entries {
        if let Some((src, dst)) = entry.as_ref().split_once(':') {
            duplicate(doc, src, dst);
        }
    }
}

/// Deletes every listed path.
pub fn remove_properties<S: AsRef<str>>(doc: &mut Document, paths: &[S]) {
    for path in paths {
        remove(doc, path.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_get_nested() {
        let d = doc(json!({"a": {"b": {"c": 1}}}));
        assert_eq!(get(&d, "a.b.c"), Some(&json!(1)));
        assert_eq!(get(&d, "a.b"), Some(&json!({"c": 1})));
        assert_eq!(get(&d, "a.x.c"), None);
        assert_eq!(get(&d, ""), None);
    }

    #[test]
    fn test_get_through_scalar_is_absent() {
        let d = doc(json!({"a": "text"}));
        assert_eq!(get(&d, "a.b"), None);
    }

    #[test]
    fn test_get_array_index() {
        let d = doc(json!({"items": [{"sku": "a"}, {"sku": "b"}], "tags": ["x", "y"]}));
        assert_eq!(get(&d, "items[0].sku"), Some(&json!("a")));
        assert_eq!(get(&d, "tags[1]"), Some(&json!("y")));
        assert_eq!(get(&d, "tags[2]"), None);
        assert_eq!(get(&d, "items[x].sku"), None);
    }

    #[test]
    fn test_get_deep_array_indexes() {
        let d = doc(json!({
            "orders": [
                {"lines": [{"sku": "a"}]},
                {"lines": [{"sku": "b"}, {"sku": "c", "meta": {"tags": ["t0", "t1"]}}]}
            ]
        }));
        assert_eq!(get(&d, "orders[1].lines[1].sku"), Some(&json!("c")));
        assert_eq!(get(&d, "orders[1].lines[1].meta.tags[1]"), Some(&json!("t1")));
        assert_eq!(get(&d, "orders[0].lines[1].sku"), None);
    }

    #[test]
    fn test_get_index_on_non_array_is_absent() {
        let d = doc(json!({"items": {"0": "x"}}));
        assert_eq!(get(&d, "items[0]"), None);
    }

    #[test]
    fn test_take_removes_terminal_key() {
        let mut d = doc(json!({"a": {"b": 1, "c": 2}}));
        assert_eq!(take(&mut d, "a.b"), Some(json!(1)));
        assert_eq!(Value::Object(d), json!({"a": {"c": 2}}));
    }

    #[test]
    fn test_take_through_index_does_not_delete() {
        let mut d = doc(json!({"items": [{"sku": "a"}]}));
        assert_eq!(take(&mut d, "items[0].sku"), Some(json!("a")));
        assert_eq!(Value::Object(d), json!({"items": [{"sku": "a"}]}));
    }

    #[test]
    fn test_set_existing_parent() {
        let mut d = doc(json!({"a": {"b": 1}}));
        assert!(set(&mut d, "a.b", json!(2)));
        assert!(set(&mut d, "a.c", json!(3)));
        assert_eq!(Value::Object(d), json!({"a": {"b": 2, "c": 3}}));
    }

    #[test]
    fn test_set_is_noop_when_intermediate_is_not_an_object() {
        let mut d = doc(json!({"a": "scalar"}));
        assert!(!set(&mut d, "a.b", json!(1)));
        assert_eq!(Value::Object(d), json!({"a": "scalar"}));
    }

    #[test]
    fn test_set_does_not_create_intermediates() {
        let mut d = doc(json!({}));
        assert!(!set(&mut d, "a.b", json!(1)));
        assert!(d.is_empty());
    }

    #[test]
    fn test_create_property_builds_intermediates() {
        let mut d = doc(json!({"a": "scalar"}));
        create_property(&mut d, "a.b.c", json!(true));
        create_property(&mut d, "x", json!(null));
        assert_eq!(Value::Object(d), json!({"a": {"b": {"c": true}}, "x": null}));
    }

    #[test]
    fn test_create_property_treats_index_as_key() {
        let mut d = doc(json!({}));
        create_property(&mut d, "items[0]", json!(1));
        assert_eq!(Value::Object(d), json!({"items[0]": 1}));
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut d = doc(json!({"a": 1}));
        assert_eq!(remove(&mut d, "b.c"), None);
        assert_eq!(remove(&mut d, "a.b"), None);
        assert_eq!(Value::Object(d), json!({"a": 1}));
    }

    #[test]
    fn test_rename_scenario() {
        let mut d = doc(json!({"user": {"name": "Ana"}}));
        rename_properties(&mut d, &["user.name:fullName"]);
        assert_eq!(Value::Object(d), json!({"user": {}, "fullName": "Ana"}));
    }

    #[test]
    fn test_rename_missing_source_is_noop() {
        let mut d = doc(json!({"a": 1}));
        assert!(!rename(&mut d, "missing", "b"));
        assert_eq!(Value::Object(d), json!({"a": 1}));
    }

    #[test]
    fn test_duplicate_copies() {
        let mut d = doc(json!({"a": {"b": [1, 2]}}));
        duplicate_properties(&mut d, &["a.b:copy.list", "missing:nowhere", "malformed"]);
        assert_eq!(
            Value::Object(d),
            json!({"a": {"b": [1, 2]}, "copy": {"list": [1, 2]}})
        );
    }

    #[test]
    fn test_remove_properties() {
        let mut d = doc(json!({"a": 1, "b": {"c": 2, "d": 3}}));
        remove_properties(&mut d, &["a", "b.c"]);
        assert_eq!(Value::Object(d), json!({"b": {"d": 3}}));
    }

    fn key() -> impl Strategy<Value = String> {
        "[a-z]{1,5}"
    }

    fn path() -> impl Strategy<Value = String> {
        prop::collection::vec(key(), 1..4).prop_map(|parts| parts.join("."))
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,8}".prop_map(Value::String),
        ]
    }

    fn document() -> impl Strategy<Value = Document> {
        prop::collection::vec((path(), leaf()), 0..6).prop_map(|entries| {
            let mut d = Document::new();
            for (p, v) in entries {
                create_property(&mut d, &p, v);
            }
            d
        })
    }

    fn is_prefix(a: &str, b: &str) -> bool {
        a == b || b.starts_with(&format!("{a}."))
    }

    proptest! {
        #[test]
        fn prop_create_then_get_round_trips(mut d in document(), p in path(), v in leaf()) {
            create_property(&mut d, &p, v.clone());
            prop_assert_eq!(get(&d, &p), Some(&v));
        }

        #[test]
        fn prop_remove_is_idempotent(d in document(), p in path()) {
            let mut once = d.clone();
            remove(&mut once, &p);
            let mut twice = once.clone();
            remove(&mut twice, &p);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_rename_is_move(mut d in document(), old in path(), new in path(), v in leaf()) {
            prop_assume!(!is_prefix(&old, &new) && !is_prefix(&new, &old));
            create_property(&mut d, &old, v.clone());
            prop_assert!(rename(&mut d, &old, &new));
            prop_assert_eq!(get(&d, &new), Some(&v));
            prop_assert_eq!(get(&d, &old), None);
        }
    }
}
