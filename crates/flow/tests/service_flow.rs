use flow::domain::{DefinitionSource, DefinitionUpdate, EmitEventRequest, EmitOutcome, EngineEvent, FlowDefinition,
                   RunStatus, StepStatus, EVENT_INPUT_MARKED, EVENT_JOB_PLANNED};
use flow::errors::FlowError;
use flow::plugins::{FlowPlugins, PluginRegistry, ProjectionContext, StepExecutor};
use flow::repository::FlowRepository;
use flow::service::{FlowService, FlowServiceConfig};
use flow::stubs::{InMemoryArtifactStore, InMemoryFlowRepository};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

fn test_definition() -> JsonValue {
  json!({
    "id": "test_v1",
    "name": "Test",
    "runKey": "period",
    "steps": [
      { "id": "a", "type": "input", "required": true },
      { "id": "b", "type": "generate", "requires": ["a"], "mode": "auto" },
      { "id": "c", "type": "generate", "requires": ["a"], "mode": "human_input" }
    ]
  })
}

fn builtins() -> HashMap<String, FlowDefinition> {
  let def: FlowDefinition = serde_json::from_value(test_definition()).expect("parse definition");
  let mut map = HashMap::new();
  map.insert(def.id.clone(), def);
  map
}

struct Harness {
  repo: Arc<InMemoryFlowRepository>,
  store: Arc<InMemoryArtifactStore>,
  service: FlowService<InMemoryFlowRepository>,
  tenant: Uuid,
  workspace: Uuid,
}

fn harness(registry: PluginRegistry) -> Harness {
  let repo = Arc::new(InMemoryFlowRepository::new());
  let store = Arc::new(InMemoryArtifactStore::new());
  let tenant = Uuid::new_v4();
  let workspace = Uuid::new_v4();
  repo.register_workspace(workspace, tenant);
  let service = FlowService::new(repo.clone(),
                                 store.clone(),
                                 builtins(),
                                 registry,
                                 FlowServiceConfig::new("test_v1"));
  Harness { repo, store, service, tenant, workspace }
}

fn emit(h: &Harness, event_type: &str, payload: JsonValue, period: Option<&str>) -> EmitOutcome {
  h.service
   .emit_event(&h.tenant,
               &h.workspace,
               EmitEventRequest { event_type: event_type.to_string(),
                                  payload,
                                  period: period.map(str::to_string),
                                  dedupe_key: None })
   .expect("emit event")
}

fn events_of_type(h: &Harness, event_type: &str) -> Vec<EngineEvent> {
  h.repo
   .list_events(&h.workspace, None)
   .expect("list events")
   .into_iter()
   .filter(|e| e.event_type == event_type)
   .collect()
}

fn status_of(state: &flow::domain::FlowState, step_id: &str) -> StepStatus {
  state.steps
       .iter()
       .find(|s| s.step_id == step_id)
       .unwrap_or_else(|| panic!("missing step {}", step_id))
       .status
}

#[test]
fn evaluate_lazily_creates_instance_and_run() {
  let h = harness(PluginRegistry::new());

  let state = h.service.evaluate(&h.tenant, &h.workspace, Some("2024-03")).expect("evaluate");
  assert!(state.instance_id.is_some());
  let run = state.run.as_ref().expect("run created");
  assert_eq!(run.period, "2024-03");
  assert_eq!(run.status, RunStatus::Active);
  assert_eq!(status_of(&state, "a"), StepStatus::Blocked);
  assert_eq!(status_of(&state, "b"), StepStatus::Blocked);
  assert_eq!(status_of(&state, "c"), StepStatus::Blocked);
  assert!(state.planned_jobs.is_empty());
}

#[test]
fn marked_input_unlocks_and_plans_jobs_idempotently() {
  let h = harness(PluginRegistry::new());
  emit(&h, EVENT_INPUT_MARKED, json!({"stepId": "a", "data": {"x": 1}}), Some("2024-03"));

  let first = h.service.evaluate(&h.tenant, &h.workspace, Some("2024-03")).expect("evaluate");
  assert_eq!(status_of(&first, "a"), StepStatus::Done);
  assert_eq!(status_of(&first, "b"), StepStatus::Ready);
  assert_eq!(first.planned_jobs.len(), 1);
  assert_eq!(first.planned_jobs[0].job_type, "generate_b");
  assert_eq!(events_of_type(&h, EVENT_JOB_PLANNED).len(), 1);

  // second evaluation with no new events: same states, no second planned event
  let second = h.service.evaluate(&h.tenant, &h.workspace, Some("2024-03")).expect("evaluate again");
  assert_eq!(status_of(&second, "a"), StepStatus::Done);
  assert_eq!(status_of(&second, "b"), StepStatus::Ready);
  assert_eq!(events_of_type(&h, EVENT_JOB_PLANNED).len(), 1);
}

#[test]
fn duplicate_event_is_a_noop() {
  let h = harness(PluginRegistry::new());

  let first = emit(&h, "measurement_submitted", json!({"total": 10.5}), Some("2024-03"));
  assert!(matches!(first, EmitOutcome::Inserted(_)));
  let second = emit(&h, "measurement_submitted", json!({"total": 10.5}), Some("2024-03"));
  assert!(matches!(second, EmitOutcome::Duplicate));
  assert_eq!(events_of_type(&h, "measurement_submitted").len(), 1);
}

#[test]
fn explicit_dedupe_key_overrides_content_hash() {
  let h = harness(PluginRegistry::new());

  let first = h.service
               .emit_event(&h.tenant,
                           &h.workspace,
                           EmitEventRequest { event_type: "custom".to_string(),
                                              payload: json!({"v": 1}),
                                              period: None,
                                              dedupe_key: Some("fixed-key".to_string()) })
               .expect("emit");
  assert!(matches!(first, EmitOutcome::Inserted(_)));
  // different payload, same explicit key: swallowed
  let second = h.service
                .emit_event(&h.tenant,
                            &h.workspace,
                            EmitEventRequest { event_type: "custom".to_string(),
                                               payload: json!({"v": 2}),
                                               period: None,
                                               dedupe_key: Some("fixed-key".to_string()) })
                .expect("emit");
  assert!(matches!(second, EmitOutcome::Duplicate));
}

#[test]
fn tenant_mismatch_is_a_hard_authorization_failure() {
  let h = harness(PluginRegistry::new());
  let intruder = Uuid::new_v4();

  let eval = h.service.evaluate(&intruder, &h.workspace, None);
  assert!(matches!(eval, Err(FlowError::Unauthorized(_))));
  let emit = h.service.emit_event(&intruder,
                                  &h.workspace,
                                  EmitEventRequest { event_type: "x".to_string(),
                                                     payload: json!({}),
                                                     period: None,
                                                     dedupe_key: None });
  assert!(matches!(emit, Err(FlowError::Unauthorized(_))));
}

#[test]
fn flow_state_is_empty_before_any_activity() {
  let h = harness(PluginRegistry::new());

  let state = h.service.get_flow_state(&h.tenant, &h.workspace, None).expect("state");
  assert!(state.instance_id.is_none());
  assert!(state.run.is_none());
  assert!(state.steps.is_empty());
  assert!(state.planned_jobs.is_empty());
}

#[test]
fn flow_state_reads_without_taking_the_lease() {
  let h = harness(PluginRegistry::new());
  let evaluated = h.service.evaluate(&h.tenant, &h.workspace, Some("2024-03")).expect("evaluate");
  let instance_id = evaluated.instance_id.expect("instance");

  // hold the evaluation lease from elsewhere
  let lease_key = format!("flow_eval:{}", instance_id);
  assert!(h.repo.acquire_lease(&lease_key, 30, "other-holder").expect("acquire"));

  // evaluate contends, read does not
  let eval = h.service.evaluate(&h.tenant, &h.workspace, Some("2024-03"));
  assert!(matches!(eval, Err(FlowError::LockUnavailable(_))));
  let state = h.service.get_flow_state(&h.tenant, &h.workspace, Some("2024-03")).expect("state");
  assert_eq!(state.steps.len(), 3);
}

struct TriggeredExecutor;

impl StepExecutor for TriggeredExecutor {
  fn step_id(&self) -> &str {
    "c"
  }

  fn trigger_event_type(&self) -> &str {
    "c_requested"
  }

  fn execute(&self, ctx: &ProjectionContext<'_>, trigger: &EngineEvent) -> flow::errors::Result<JsonValue> {
    let path = format!("out/{}/c.json", ctx.run.period);
    ctx.store.put(&path, b"{}")?;
    Ok(json!({ "path": path, "by": trigger.payload.get("by").cloned().unwrap_or(JsonValue::Null) }))
  }
}

struct FailingExecutor;

impl StepExecutor for FailingExecutor {
  fn step_id(&self) -> &str {
    "c"
  }

  fn trigger_event_type(&self) -> &str {
    "c_requested"
  }

  fn execute(&self, _ctx: &ProjectionContext<'_>, _trigger: &EngineEvent) -> flow::errors::Result<JsonValue> {
    Err(FlowError::Execution("render failed".to_string()))
  }
}

#[test]
fn executor_completes_human_triggered_step() {
  let mut registry = PluginRegistry::new();
  registry.register("test_v1",
                    FlowPlugins { executors: vec![Box::new(TriggeredExecutor)], ..Default::default() });
  let h = harness(registry);

  emit(&h, EVENT_INPUT_MARKED, json!({"stepId": "a", "data": {"x": 1}}), Some("2024-03"));
  // ready but no trigger yet: stays ready
  let state = h.service.evaluate(&h.tenant, &h.workspace, Some("2024-03")).expect("evaluate");
  assert_eq!(status_of(&state, "c"), StepStatus::Ready);

  emit(&h, "c_requested", json!({"by": "ana"}), Some("2024-03"));
  let state = h.service.evaluate(&h.tenant, &h.workspace, Some("2024-03")).expect("evaluate");
  assert_eq!(status_of(&state, "c"), StepStatus::Done);
  let outputs = state.steps
                     .iter()
                     .find(|s| s.step_id == "c")
                     .and_then(|s| s.outputs.clone())
                     .expect("outputs");
  assert_eq!(outputs["by"], json!("ana"));
  assert!(h.store.get("out/2024-03/c.json").is_some());

  // done is sticky: a later evaluation does not re-run the executor
  let again = h.service.evaluate(&h.tenant, &h.workspace, Some("2024-03")).expect("evaluate");
  assert_eq!(status_of(&again, "c"), StepStatus::Done);
}

#[test]
fn executor_failure_aborts_before_any_state_is_persisted() {
  let mut registry = PluginRegistry::new();
  registry.register("test_v1",
                    FlowPlugins { executors: vec![Box::new(FailingExecutor)], ..Default::default() });
  let h = harness(registry);

  emit(&h, EVENT_INPUT_MARKED, json!({"stepId": "a", "data": {"x": 1}}), Some("2024-03"));
  emit(&h, "c_requested", json!({}), Some("2024-03"));

  let result = h.service.evaluate(&h.tenant, &h.workspace, Some("2024-03"));
  assert!(matches!(result, Err(FlowError::Execution(_))));

  // no partial step states were upserted for the aborted call
  let state = h.service.get_flow_state(&h.tenant, &h.workspace, Some("2024-03")).expect("state");
  assert!(state.steps.is_empty());
  // and the call is safe to retry once the failure is gone (lease released)
  let retry = h.service.evaluate(&h.tenant, &h.workspace, Some("2024-03"));
  assert!(matches!(retry, Err(FlowError::Execution(_))));
}

#[test]
fn set_flow_definition_rejects_invalid_candidates_as_a_value() {
  let h = harness(PluginRegistry::new());
  let candidate = json!({
    "id": "test_v1", "name": "t", "runKey": "period",
    "steps": [
      { "id": "a", "type": "input" },
      { "id": "a", "type": "mystery" }
    ]
  });

  let outcome = h.service.set_flow_definition(&h.tenant, &h.workspace, candidate).expect("call succeeds");
  match outcome {
    DefinitionUpdate::Rejected(report) => {
      assert!(!report.valid);
      assert!(!report.errors.is_empty());
    }
    DefinitionUpdate::Applied(_) => panic!("invalid definition must be rejected"),
  }
  // nothing was created for the workspace
  let state = h.service.get_flow_state(&h.tenant, &h.workspace, None).expect("state");
  assert!(state.instance_id.is_none());
}

#[test]
fn set_flow_definition_replaces_snapshot_without_touching_states() {
  let h = harness(PluginRegistry::new());
  emit(&h, EVENT_INPUT_MARKED, json!({"stepId": "a", "data": {"x": 1}}), Some("2024-03"));
  let before = h.service.evaluate(&h.tenant, &h.workspace, Some("2024-03")).expect("evaluate");
  assert_eq!(status_of(&before, "a"), StepStatus::Done);

  // same definition id, one extra optional input step
  let candidate = json!({
    "id": "test_v1", "name": "Test v2", "runKey": "period",
    "steps": [
      { "id": "a", "type": "input", "required": true },
      { "id": "b", "type": "generate", "requires": ["a"], "mode": "auto" },
      { "id": "c", "type": "generate", "requires": ["a"], "mode": "human_input" },
      { "id": "notes", "type": "input", "required": false }
    ]
  });
  let outcome = h.service.set_flow_definition(&h.tenant, &h.workspace, candidate).expect("set definition");
  assert!(matches!(outcome, DefinitionUpdate::Applied(_)));

  let after = h.service.evaluate(&h.tenant, &h.workspace, Some("2024-03")).expect("evaluate");
  assert_eq!(after.definition.steps.len(), 4);
  // previously persisted terminal state survives the snapshot swap
  assert_eq!(status_of(&after, "a"), StepStatus::Done);
  assert_eq!(status_of(&after, "notes"), StepStatus::Ready);
}

#[test]
fn init_flow_instance_accepts_named_and_inline_sources() {
  let h = harness(PluginRegistry::new());

  let named = h.service
               .init_flow_instance(&h.tenant, &h.workspace, DefinitionSource::Named("test_v1".to_string()))
               .expect("init named");
  let named_instance = match named {
    DefinitionUpdate::Applied(instance) => instance,
    DefinitionUpdate::Rejected(report) => panic!("unexpected rejection: {:?}", report.errors),
  };
  // idempotent: a second init returns the same instance
  let again = h.service
               .init_flow_instance(&h.tenant, &h.workspace, DefinitionSource::Named("test_v1".to_string()))
               .expect("init again");
  match again {
    DefinitionUpdate::Applied(instance) => assert_eq!(instance.id, named_instance.id),
    DefinitionUpdate::Rejected(_) => panic!("unexpected rejection"),
  }

  let invalid = h.service
                 .init_flow_instance(&h.tenant, &h.workspace, DefinitionSource::Inline(json!({"id": "x"})))
                 .expect("init inline");
  assert!(matches!(invalid, DefinitionUpdate::Rejected(_)));
}

#[test]
fn archive_run_retires_a_period() {
  let h = harness(PluginRegistry::new());
  h.service.evaluate(&h.tenant, &h.workspace, Some("2024-03")).expect("evaluate");

  h.service.archive_run(&h.tenant, &h.workspace, "2024-03").expect("archive");
  let state = h.service.get_flow_state(&h.tenant, &h.workspace, Some("2024-03")).expect("state");
  assert_eq!(state.run.expect("run").status, RunStatus::Archived);
}
