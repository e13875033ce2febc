// Archivo: domain.rs
// Propósito: tipos de dominio del motor (definiciones, instancias, runs,
// estados de paso, eventos) y el validador estructural de definiciones.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use uuid::Uuid;

/// Clave de partición de runs soportada. Los runs se particionan por
/// periodo contable con formato "YYYY-MM" (por ejemplo "2024-03").
pub const RUN_KEY_PERIOD: &str = "period";

/// Tipo de evento que marca el input de un paso de forma explícita. Su
/// payload lleva `stepId` y `data`; una marca siempre tiene prioridad
/// sobre lo que detecte un proyector heurístico.
pub const EVENT_INPUT_MARKED: &str = "input_marked";

/// Tipo de evento idempotente que registra un job planificado.
pub const EVENT_JOB_PLANNED: &str = "job_planned";

/// Definición declarativa de un flujo: grafo dirigido de pasos, con nombre
/// y versión implícita en su `id` (por ejemplo `pmc_v1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDefinition {
    pub id: String,
    pub name: String,
    pub run_key: String,
    pub steps: Vec<StepDefinition>,
}

impl FlowDefinition {
    /// Busca un paso por id.
    pub fn step(&self, step_id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == step_id)
    }
}

/// Un paso dentro de una definición.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Sólo significativo para pasos `input`: un input requerido bloquea
    /// hasta que aparezca su dato; uno opcional no.
    #[serde(default)]
    pub required: bool,
    /// Ids de pasos que deben estar `done` antes que éste.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Modo de planificación de pasos `generate`: `auto` se planifica solo;
    /// `human_input` exige un evento de disparo explícito.
    #[serde(default)]
    pub mode: Option<StepMode>,
    /// Metadatos descriptivos, opacos para el evaluador.
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub doc_kinds: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Input,
    Generate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMode {
    HumanInput,
    Auto,
}

/// Instancia de flujo: snapshot de una definición ligado a un workspace.
/// Ediciones posteriores de la definición "por defecto" no afectan a las
/// instancias ya creadas; cada una conserva su propio snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowInstance {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub flow_definition_id: String,
    pub definition: FlowDefinition,
    pub created_at: DateTime<Utc>,
}

/// Run: una ejecución de una instancia acotada a un periodo. Único por
/// `(instance_id, period)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRun {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub period: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Active,
    Archived,
}

/// Status de un estado de paso. `Done`, `Failed` y `Running` son
/// terminales: el evaluador nunca los re-deriva.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Blocked,
    Ready,
    Running,
    Done,
    Failed,
}

impl StepStatus {
    /// Un status terminal es pegajoso: ninguna evaluación posterior puede
    /// sacarlo de ahí, aunque cambien sus dependencias o inputs.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Done | StepStatus::Failed | StepStatus::Running)
    }
}

/// Razón estructurada por la que un paso sigue bloqueado. Unión etiquetada
/// para que los anotadores sólo puedan producir valores bien tipados.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BlockReason {
    /// Falta el dato de un input requerido.
    InputMissing,
    /// Dependencias de un paso `generate` aún no están `done`.
    DependenciesMissing { missing: Vec<String> },
    /// Bloqueo de dominio anotado tras la evaluación, con detalle legible.
    DomainBlocked {
        kind: String,
        message: String,
        #[serde(default)]
        detail: JsonValue,
    },
}

/// Proyección actual de un paso dentro de un run. Upsert con clave
/// `(run_id, step_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepState {
    pub run_id: Uuid,
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<BlockReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<JsonValue>,
    pub updated_at: DateTime<Utc>,
}

impl StepState {
    pub fn blocked(run_id: Uuid, step_id: &str, reason: BlockReason) -> Self {
        Self { run_id,
               step_id: step_id.to_string(),
               status: StepStatus::Blocked,
               reason: Some(reason),
               inputs: None,
               outputs: None,
               updated_at: Utc::now() }
    }

    pub fn ready(run_id: Uuid, step_id: &str) -> Self {
        Self { run_id,
               step_id: step_id.to_string(),
               status: StepStatus::Ready,
               reason: None,
               inputs: None,
               outputs: None,
               updated_at: Utc::now() }
    }

    pub fn done(run_id: Uuid, step_id: &str, inputs: Option<JsonValue>, outputs: Option<JsonValue>) -> Self {
        Self { run_id,
               step_id: step_id.to_string(),
               status: StepStatus::Done,
               reason: None,
               inputs,
               outputs,
               updated_at: Utc::now() }
    }
}

/// Hecho de dominio inmutable, append-only. El log ordenado de un run es la
/// fuente de verdad de la que se deriva la disponibilidad de inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineEvent {
    pub id: Uuid,
    pub workspace_id: Uuid,
    /// `None` marca un evento global del workspace, visible desde todos
    /// sus runs.
    pub run_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: JsonValue,
    pub dedupe_key: String,
    pub created_at: DateTime<Utc>,
}

/// Petición de emisión de un evento (entrada de `emit_event`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitEventRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: JsonValue,
    /// Periodo del run destino; `None` emite un evento global.
    #[serde(default)]
    pub period: Option<String>,
    /// Clave de idempotencia explícita; si falta se deriva del contenido.
    #[serde(default)]
    pub dedupe_key: Option<String>,
}

/// Resultado de `emit_event`: el duplicado es un no-op, no un error.
#[derive(Debug, Clone)]
pub enum EmitOutcome {
    Inserted(EngineEvent),
    Duplicate,
}

/// Señal del adaptador al insertar un evento con clave única.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventInsert {
    Inserted,
    Duplicate,
}

/// Dato materializado para un paso `input`, derivado de eventos o de un
/// detector enchufable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableInput {
    pub step_id: String,
    pub data: JsonValue,
}

/// Recomendación de ejecutar un paso `generate` en modo `auto`. Efímero:
/// sólo queda registrado como evento `job_planned` idempotente.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedJob {
    #[serde(rename = "type")]
    pub job_type: String,
    pub step_id: String,
    pub run_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
}

/// Vista devuelta por `evaluate` y `get_flow_state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowState {
    pub definition: FlowDefinition,
    pub instance_id: Option<Uuid>,
    pub run: Option<FlowRun>,
    pub steps: Vec<StepState>,
    pub planned_jobs: Vec<PlannedJob>,
}

/// Referencia a un documento candidato de un workspace. Sólo la consumen
/// los detectores enchufables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub kind: Option<String>,
    pub name: String,
    pub path: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Fuente de la definición al inicializar una instancia.
#[derive(Debug, Clone)]
pub enum DefinitionSource {
    /// Definición integrada, por id de catálogo.
    Named(String),
    /// Documento JSON explícito; se valida antes de aceptarse.
    Inline(JsonValue),
}

/// Resultado de las operaciones administrativas sobre definiciones. El
/// rechazo por validación es un valor, nunca un error: está pensado para
/// guiar una UI de configuración.
#[derive(Debug, Clone)]
pub enum DefinitionUpdate {
    Applied(FlowInstance),
    Rejected(ValidationReport),
}

/// Periodo corriente con formato "YYYY-MM".
pub fn current_period() -> String {
    Utc::now().format("%Y-%m").to_string()
}

/// Resultado del chequeo estructural de una definición candidata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Valida una definición candidata (documento JSON crudo). Nunca falla:
/// los problemas se acumulan como mensajes en el reporte. Es validación de
/// configuración, distinta de los fallos de runtime; se usa antes de
/// aceptar una definición no-default para una instancia.
///
/// Además de los chequeos básicos (id/name presentes, `runKey`, `steps` no
/// vacío, tipos conocidos, ids únicos), exige que `requires` sólo nombre
/// pasos declarados *antes* en `steps`. Eso convierte la resolución de
/// dependencias en una sola pasada del evaluador en precondición explícita
/// y excluye ciclos por construcción.
pub fn validate_definition(candidate: &JsonValue) -> ValidationReport {
    let mut errors: Vec<String> = Vec::new();

    match candidate.get("id").and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => {}
        _ => errors.push("falta el id de la definición".to_string()),
    }
    match candidate.get("name").and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => {}
        _ => errors.push("falta el nombre de la definición".to_string()),
    }
    if candidate.get("runKey").and_then(|v| v.as_str()) != Some(RUN_KEY_PERIOD) {
        errors.push(format!("runKey debe ser \"{}\"", RUN_KEY_PERIOD));
    }

    let steps = candidate.get("steps").and_then(|v| v.as_array());
    let steps = match steps {
        Some(arr) if !arr.is_empty() => arr,
        _ => {
            errors.push("steps debe ser un array no vacío".to_string());
            return ValidationReport { valid: errors.is_empty(), errors };
        }
    };

    // Ids ya declarados, en orden: sirven tanto para detectar duplicados
    // como para rechazar referencias hacia adelante en `requires`.
    let mut seen: HashSet<String> = HashSet::new();
    for (idx, step) in steps.iter().enumerate() {
        let step_id = match step.get("id").and_then(|v| v.as_str()) {
            Some(s) if !s.trim().is_empty() => s.to_string(),
            _ => {
                errors.push(format!("paso #{}: falta el id", idx));
                continue;
            }
        };

        match step.get("type").and_then(|v| v.as_str()) {
            Some("input") | Some("generate") => {}
            Some(other) => errors.push(format!("paso '{}': tipo desconocido \"{}\"", step_id, other)),
            None => errors.push(format!("paso '{}': falta el tipo", step_id)),
        }

        if let Some(requires) = step.get("requires") {
            match requires.as_array() {
                Some(deps) => {
                    for dep in deps {
                        match dep.as_str() {
                            Some(dep_id) if seen.contains(dep_id) => {}
                            Some(dep_id) => errors.push(format!(
                                "paso '{}': requires referencia '{}' que no está declarado antes",
                                step_id, dep_id
                            )),
                            None => errors.push(format!("paso '{}': requires contiene un valor no textual", step_id)),
                        }
                    }
                }
                None => errors.push(format!("paso '{}': requires debe ser un array", step_id)),
            }
        }

        if !seen.insert(step_id.clone()) {
            errors.push(format!("id de paso duplicado '{}'", step_id));
        }
    }

    ValidationReport { valid: errors.is_empty(), errors }
}
