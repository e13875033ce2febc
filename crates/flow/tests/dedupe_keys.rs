use flow::dedupe::{build_dedupe_key, canonical_json};
use serde_json::json;
use uuid::Uuid;

#[test]
fn canonical_json_sorts_object_keys_recursively() {
  let a = json!({"b": 2, "a": 1, "nested": {"z": true, "k": [1, 2]}});
  let rendered = canonical_json(&a);
  assert_eq!(rendered, r#"{"a":1,"b":2,"nested":{"k":[1,2],"z":true}}"#);
}

#[test]
fn key_is_independent_of_in_memory_key_order() {
  let run = Uuid::new_v4();
  let k1 = build_dedupe_key("x", Some(&run), &json!({"a": 1, "b": 2}), None);
  let k2 = build_dedupe_key("x", Some(&run), &json!({"b": 2, "a": 1}), None);
  assert_eq!(k1, k2);
}

#[test]
fn key_is_fixed_length_hex() {
  let key = build_dedupe_key("x", None, &json!({"a": 1}), None);
  assert_eq!(key.len(), 64);
  assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn array_order_is_significant() {
  let k1 = build_dedupe_key("x", None, &json!({"items": [1, 2]}), None);
  let k2 = build_dedupe_key("x", None, &json!({"items": [2, 1]}), None);
  assert_ne!(k1, k2);
}

#[test]
fn run_scope_changes_the_key() {
  let run = Uuid::new_v4();
  let scoped = build_dedupe_key("x", Some(&run), &json!({"a": 1}), None);
  let global = build_dedupe_key("x", None, &json!({"a": 1}), None);
  assert_ne!(scoped, global);
}

#[test]
fn event_type_changes_the_key() {
  let k1 = build_dedupe_key("x", None, &json!({"a": 1}), None);
  let k2 = build_dedupe_key("y", None, &json!({"a": 1}), None);
  assert_ne!(k1, k2);
}

#[test]
fn explicit_key_passes_through_unchanged() {
  let key = build_dedupe_key("x", None, &json!({"a": 1}), Some("my-explicit-key"));
  assert_eq!(key, "my-explicit-key");
}
