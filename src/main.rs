use flow::domain::{DocumentRef, EmitEventRequest, EmitOutcome};
use flow::errors::FlowError;
use flow::plugins::PluginRegistry;
use flow::service::{FlowService, FlowServiceConfig};
use flow::stubs::{InMemoryArtifactStore, InMemoryFlowRepository};
use serde_json::json;
use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;
use uuid::Uuid;

/// Pequeño menú interactivo para ejercitar el motor de flujos con los
/// stubs en memoria y el flujo integrado `pmc_v1`.
///
/// Opciones soportadas:
/// 1) Ver estado del flujo
/// 2) Subir documento de presupuesto (simulado)
/// 3) Marcar input manualmente
/// 4) Emitir medición del periodo
/// 5) Solicitar certificado
/// 6) Evaluar
/// 7) Salir
fn main() -> Result<(), Box<dyn Error>> {
    // Variables de entorno opcionales (p.ej. FLOW_LEASE_TTL_SECS)
    dotenvy::dotenv().ok();
    let lease_ttl = std::env::var("FLOW_LEASE_TTL_SECS").ok()
                                                        .and_then(|v| v.parse().ok())
                                                        .unwrap_or(flow::lease::DEFAULT_LEASE_TTL_SECS);

    let repo = Arc::new(InMemoryFlowRepository::new());
    let store = Arc::new(InMemoryArtifactStore::new());
    let tenant = Uuid::new_v4();
    let workspace = Uuid::new_v4();
    repo.register_workspace(workspace, tenant);

    let mut registry = PluginRegistry::new();
    obra_workflow::register_builtin(&mut registry);
    let mut config = FlowServiceConfig::new(obra_workflow::PMC_DEFINITION_ID);
    config.lease_ttl_secs = lease_ttl;
    let service = FlowService::new(repo.clone(), store, obra_workflow::builtin_definitions(), registry, config);

    println!("Workspace de demo: {} (tenant {})", workspace, tenant);

    loop {
        println!("\n== Flow CLI menu ==");
        println!("1) Ver estado del flujo");
        println!("2) Subir documento de presupuesto (simulado)");
        println!("3) Marcar input manualmente");
        println!("4) Emitir medición del periodo");
        println!("5) Solicitar certificado");
        println!("6) Evaluar");
        println!("7) Salir");
        print!("Elige una opción: ");
        io::stdout().flush().ok();

        let mut choice = String::new();
        io::stdin().read_line(&mut choice)?;
        match choice.trim() {
            "1" => {
                match service.get_flow_state(&tenant, &workspace, None) {
                    Ok(state) => print_state(&state),
                    Err(e) => eprintln!("Error leyendo estado: {}", e),
                }
            }
            "2" => {
                let name = prompt("Nombre del documento (ej: presupuesto.bc3): ")?;
                let name = if name.trim().is_empty() { "presupuesto.bc3".to_string() } else { name.trim().to_string() };
                repo.add_document(DocumentRef { id: Uuid::new_v4(),
                                                workspace_id: workspace,
                                                kind: Some("budget".to_string()),
                                                path: format!("uploads/{}/{}", workspace, name),
                                                name,
                                                uploaded_at: chrono::Utc::now() });
                println!("Documento registrado");
            }
            "3" => {
                let step = prompt("Id del paso (ej: budget_base): ")?;
                let data = prompt("Data (JSON o texto simple): ")?;
                let payload = json!({
                    "stepId": step.trim(),
                    "data": serde_json::from_str::<serde_json::Value>(&data).unwrap_or(json!(data.trim())),
                });
                emit(&service, &tenant, &workspace, "input_marked", payload);
            }
            "4" => {
                let total = prompt("Importe medido del periodo (número): ")?;
                let total: f64 = match total.trim().parse() {
                    Ok(n) => n,
                    Err(_) => { eprintln!("Importe inválido"); continue; }
                };
                emit(&service, &tenant, &workspace,
                     obra_workflow::EVENT_MEASUREMENT_SUBMITTED,
                     json!({ "total": total }));
            }
            "5" => {
                let who = prompt("Solicitante (enter para anónimo): ")?;
                let payload = if who.trim().is_empty() { json!({}) } else { json!({ "requestedBy": who.trim() }) };
                emit(&service, &tenant, &workspace, obra_workflow::EVENT_CERTIFICATE_REQUESTED, payload);
            }
            "6" => {
                match service.evaluate(&tenant, &workspace, None) {
                    Ok(state) => {
                        print_state(&state);
                        for job in &state.planned_jobs {
                            println!("Job planificado: {} (paso {})", job.job_type, job.step_id);
                        }
                    }
                    Err(FlowError::LockUnavailable(msg)) => eprintln!("Evaluación en curso, reintenta: {}", msg),
                    Err(e) => eprintln!("Error evaluando: {}", e),
                }
            }
            "7" => {
                println!("Saliendo...");
                break;
            }
            other => {
                println!("Opción inválida: {}", other);
            }
        }
    }

    Ok(())
}

fn emit(service: &FlowService<InMemoryFlowRepository>,
        tenant: &Uuid,
        workspace: &Uuid,
        event_type: &str,
        payload: serde_json::Value) {
    let request = EmitEventRequest { event_type: event_type.to_string(),
                                     payload,
                                     period: Some(flow::domain::current_period()),
                                     dedupe_key: None };
    match service.emit_event(tenant, workspace, request) {
        Ok(EmitOutcome::Inserted(event)) => println!("Evento {} emitido ({})", event.event_type, event.id),
        Ok(EmitOutcome::Duplicate) => println!("Evento duplicado: ignorado"),
        Err(e) => eprintln!("Error emitiendo evento: {}", e),
    }
}

fn print_state(state: &flow::domain::FlowState) {
    match &state.run {
        Some(run) => println!("\nRun {} | periodo {} | {:?}", run.id, run.period, run.status),
        None => println!("\nSin run todavía"),
    }
    if state.steps.is_empty() {
        println!("(sin estados de paso persistidos)");
        return;
    }
    println!("PASO                 | STATUS   | DETALLE");
    println!("--------------------------------------------------------------");
    for step in &state.steps {
        let detail = match &step.reason {
            Some(reason) => format!("{:?}", reason),
            None => step.outputs
                        .as_ref()
                        .map(|o| o.to_string())
                        .unwrap_or_else(|| "-".to_string()),
        };
        println!("{:<20} | {:<8} | {}", step.step_id, format!("{:?}", step.status).to_lowercase(), detail);
    }
}

fn prompt(msg: &str) -> io::Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s)
}
