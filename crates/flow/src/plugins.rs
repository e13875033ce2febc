// Archivo: plugins.rs
// Propósito: seams enchufables del orquestador — proyectores de inputs,
// proyecciones directas, anotadores post-evaluación y executors de paso.
// Mantienen el evaluador y el planificador genéricos testeables en total
// aislamiento de las reglas de negocio.
use crate::domain::{AvailableInput, BlockReason, EngineEvent, FlowRun, StepState};
use crate::errors::Result;
use crate::repository::{ArtifactStore, FlowRepository};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use uuid::Uuid;

/// Contexto de sólo lectura que reciben los plugins durante una evaluación:
/// el run en curso, su log de eventos completo y los colaboradores externos.
pub struct ProjectionContext<'a> {
    pub workspace_id: Uuid,
    pub run: &'a FlowRun,
    pub events: &'a [EngineEvent],
    pub repo: &'a dyn FlowRepository,
    pub store: &'a dyn ArtifactStore,
}

/// Detector heurístico de un `AvailableInput` para un paso `input` (por
/// ejemplo "¿hay un documento cualificado en el storage?"). Un evento
/// `input_marked` explícito siempre tiene prioridad sobre lo que devuelva
/// el proyector.
pub trait InputProjector: Send + Sync {
    /// Paso `input` que cubre este proyector.
    fn step_id(&self) -> &str;

    fn project(&self, ctx: &ProjectionContext<'_>) -> Result<Option<AvailableInput>>;
}

/// Proyección directa: completa un paso fuera de la máquina genérica cuando
/// un evento de dominio reporta su resultado out-of-band. Devolver
/// `Some(outputs)` marca el paso como `done` con esos outputs; un estado
/// terminal ya persistido siempre gana.
pub trait DirectProjection: Send + Sync {
    fn step_id(&self) -> &str;

    fn apply(&self, ctx: &ProjectionContext<'_>) -> Result<Option<JsonValue>>;
}

/// Anotador post-evaluación: enriquece la razón de un paso que sigue
/// bloqueado con detalle estructurado y legible. El tipo de retorno sólo
/// permite sustituir la razón, nunca el status.
pub trait StepAnnotator: Send + Sync {
    fn annotate(&self, ctx: &ProjectionContext<'_>, state: &StepState) -> Result<Option<BlockReason>>;
}

/// Executor de side-effects para pasos `generate` con disparo explícito
/// (modo `human_input`): por ejemplo, renderizar un artefacto al storage.
/// Devuelve los outputs a persistir en el estado del paso.
pub trait StepExecutor: Send + Sync {
    fn step_id(&self) -> &str;

    /// Tipo de evento que dispara la ejecución.
    fn trigger_event_type(&self) -> &str;

    fn execute(&self, ctx: &ProjectionContext<'_>, trigger: &EngineEvent) -> Result<JsonValue>;
}

/// Conjunto de plugins asociado a una definición de flujo.
#[derive(Default)]
pub struct FlowPlugins {
    pub input_projectors: Vec<Box<dyn InputProjector>>,
    pub direct_projections: Vec<Box<dyn DirectProjection>>,
    pub annotators: Vec<Box<dyn StepAnnotator>>,
    pub executors: Vec<Box<dyn StepExecutor>>,
}

/// Registro de plugins por id de definición.
#[derive(Default)]
pub struct PluginRegistry {
    by_definition: HashMap<String, FlowPlugins>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self { by_definition: HashMap::new() }
    }

    pub fn register(&mut self, definition_id: &str, plugins: FlowPlugins) {
        self.by_definition.insert(definition_id.to_string(), plugins);
    }

    pub fn get(&self, definition_id: &str) -> Option<&FlowPlugins> {
        self.by_definition.get(definition_id)
    }
}
