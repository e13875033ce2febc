use flow::domain::validate_definition;
use serde_json::json;

#[test]
fn minimal_definition_is_valid_with_zero_errors() {
  let candidate = json!({
    "id": "pmc_v1",
    "name": "Budget-Measurement-Certificate",
    "runKey": "period",
    "steps": [
      { "id": "budget_base", "type": "input", "required": true },
      { "id": "measurement", "type": "input", "required": true, "requires": ["budget_base"] },
      { "id": "certificate", "type": "generate", "requires": ["measurement"], "mode": "human_input" }
    ]
  });
  let report = validate_definition(&candidate);
  assert!(report.valid, "unexpected errors: {:?}", report.errors);
  assert!(report.errors.is_empty());
}

#[test]
fn duplicate_step_ids_are_collected_not_fatal() {
  let candidate = json!({
    "id": "d", "name": "d", "runKey": "period",
    "steps": [
      { "id": "a", "type": "input" },
      { "id": "a", "type": "input" },
      { "id": "", "type": "input" }
    ]
  });
  let report = validate_definition(&candidate);
  assert!(!report.valid);
  // duplicate and empty id both reported in one pass
  assert!(report.errors.iter().any(|e| e.contains("duplicado")));
  assert!(report.errors.len() >= 2);
}

#[test]
fn unknown_step_type_is_rejected() {
  let candidate = json!({
    "id": "d", "name": "d", "runKey": "period",
    "steps": [{ "id": "a", "type": "transform" }]
  });
  let report = validate_definition(&candidate);
  assert!(!report.valid);
  assert!(report.errors.iter().any(|e| e.contains("tipo desconocido")));
}

#[test]
fn empty_steps_array_is_rejected() {
  let candidate = json!({ "id": "d", "name": "d", "runKey": "period", "steps": [] });
  let report = validate_definition(&candidate);
  assert!(!report.valid);
}

#[test]
fn wrong_run_key_is_rejected() {
  let candidate = json!({
    "id": "d", "name": "d", "runKey": "daily",
    "steps": [{ "id": "a", "type": "input" }]
  });
  let report = validate_definition(&candidate);
  assert!(!report.valid);
  assert!(report.errors.iter().any(|e| e.contains("runKey")));
}

#[test]
fn forward_references_in_requires_are_rejected() {
  // "b" requires "c", which is declared later: single-pass evaluation
  // could never resolve it in order.
  let candidate = json!({
    "id": "d", "name": "d", "runKey": "period",
    "steps": [
      { "id": "a", "type": "input" },
      { "id": "b", "type": "generate", "requires": ["c"] },
      { "id": "c", "type": "generate", "requires": ["a"] }
    ]
  });
  let report = validate_definition(&candidate);
  assert!(!report.valid);
  assert!(report.errors.iter().any(|e| e.contains("'c'")));
}

#[test]
fn requires_must_be_an_array() {
  let candidate = json!({
    "id": "d", "name": "d", "runKey": "period",
    "steps": [{ "id": "a", "type": "generate", "requires": "b" }]
  });
  let report = validate_definition(&candidate);
  assert!(!report.valid);
  assert!(report.errors.iter().any(|e| e.contains("array")));
}

#[test]
fn garbage_input_never_panics() {
  let report = validate_definition(&json!("nonsense"));
  assert!(!report.valid);
  let report = validate_definition(&json!(null));
  assert!(!report.valid);
}
