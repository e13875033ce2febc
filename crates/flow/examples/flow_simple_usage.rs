use flow::domain::{AvailableInput, EmitEventRequest, FlowDefinition};
use flow::engine::{evaluate_steps, plan_jobs};
use flow::errors::FlowError;
use flow::plugins::PluginRegistry;
use flow::service::{FlowService, FlowServiceConfig};
use flow::stubs::{InMemoryArtifactStore, InMemoryFlowRepository};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

fn main() -> Result<(), FlowError> {
    // Una definición mínima: un input requerido y un generate automático.
    let definition: FlowDefinition = serde_json::from_value(json!({
        "id": "demo_v1",
        "name": "Demo",
        "runKey": "period",
        "steps": [
            { "id": "datos", "type": "input", "required": true },
            { "id": "informe", "type": "generate", "requires": ["datos"], "mode": "auto" }
        ]
    }))?;

    // El núcleo puro se puede usar sin repositorio alguno.
    let run_id = Uuid::new_v4();
    let states = evaluate_steps(&definition, &[], &[], run_id);
    println!("sin inputs: {:?}\n", states.iter().map(|s| (&s.step_id, s.status)).collect::<Vec<_>>());

    let inputs = vec![AvailableInput { step_id: "datos".to_string(), data: json!({"filas": 12}) }];
    let states = evaluate_steps(&definition, &[], &inputs, run_id);
    let jobs = plan_jobs(&definition, &states, run_id);
    println!("con inputs: {:?}", states.iter().map(|s| (&s.step_id, s.status)).collect::<Vec<_>>());
    println!("jobs planificados: {:?}\n", jobs.iter().map(|j| &j.job_type).collect::<Vec<_>>());

    // Lo mismo, orquestado extremo a extremo con los stubs en memoria.
    let repo = Arc::new(InMemoryFlowRepository::new());
    let store = Arc::new(InMemoryArtifactStore::new());
    let tenant = Uuid::new_v4();
    let workspace = Uuid::new_v4();
    repo.register_workspace(workspace, tenant);

    let mut builtins = HashMap::new();
    builtins.insert(definition.id.clone(), definition);
    let service = FlowService::new(repo,
                                   store,
                                   builtins,
                                   PluginRegistry::new(),
                                   FlowServiceConfig::new("demo_v1"));

    service.emit_event(&tenant,
                       &workspace,
                       EmitEventRequest { event_type: "input_marked".to_string(),
                                          payload: json!({"stepId": "datos", "data": {"filas": 12}}),
                                          period: Some("2024-03".to_string()),
                                          dedupe_key: None })?;
    let state = service.evaluate(&tenant, &workspace, Some("2024-03"))?;
    for step in &state.steps {
        println!("{} -> {:?}", step.step_id, step.status);
    }
    for job in &state.planned_jobs {
        println!("planificado: {}", job.job_type);
    }
    Ok(())
}
