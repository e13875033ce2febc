// Archivo: repository.rs
// Propósito: definir los contratos de persistencia (`FlowRepository`) y de
// object store (`ArtifactStore`) que consume el núcleo del motor. Las
// implementaciones concretas (Postgres, in-memory, etc.) viven fuera; aquí
// sólo se describe la interfaz.
use crate::domain::{DocumentRef, EngineEvent, EventInsert, FlowDefinition, FlowInstance, FlowRun, StepState};
use crate::errors::Result;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Contrato único de persistencia que requiere el núcleo. Todas las
/// operaciones son síncronas y request-scoped: el motor no mantiene estado
/// mutable entre llamadas.
pub trait FlowRepository: Send + Sync {
    // --- Instancias ---

    /// Instancia de un workspace para una definición, si existe.
    fn get_instance(&self, workspace_id: &Uuid, definition_id: &str) -> Result<Option<FlowInstance>>;

    /// Inserta una instancia nueva, snapshot de definición incluido.
    fn create_instance(&self, instance: &FlowInstance) -> Result<()>;

    /// Reemplaza el snapshot de definición de una instancia existente. No
    /// toca los estados de paso ya persistidos.
    fn set_instance_definition(&self, instance_id: &Uuid, definition: &FlowDefinition) -> Result<()>;

    // --- Runs ---

    /// Run de una instancia para un periodo. Único por `(instancia, periodo)`.
    fn get_run(&self, instance_id: &Uuid, period: &str) -> Result<Option<FlowRun>>;

    /// Run más reciente de una instancia, si hay alguno.
    fn latest_run(&self, instance_id: &Uuid) -> Result<Option<FlowRun>>;

    fn create_run(&self, run: &FlowRun) -> Result<()>;

    /// Marca un run como archivado.
    fn archive_run(&self, run_id: &Uuid) -> Result<()>;

    // --- Estados de paso ---

    fn list_step_states(&self, run_id: &Uuid) -> Result<Vec<StepState>>;

    /// Upsert en lote con clave `(run_id, step_id)`.
    fn upsert_step_states(&self, run_id: &Uuid, states: &[StepState]) -> Result<()>;

    // --- Eventos ---

    /// Inserta un evento respetando la unicidad de `dedupe_key`. Un
    /// duplicado debe señalarse como `EventInsert::Duplicate`, nunca
    /// propagarse como error visible.
    fn insert_event(&self, event: &EngineEvent) -> Result<EventInsert>;

    /// Eventos en orden de inserción. Con `run_id` presente devuelve los de
    /// ese run más los globales del workspace (run nulo); sin él, todos los
    /// del workspace.
    fn list_events(&self, workspace_id: &Uuid, run_id: Option<&Uuid>) -> Result<Vec<EngineEvent>>;

    // --- Lease ---

    /// Adquisición atómica: `true` si la clave estaba libre o su holder
    /// anterior ya expiró.
    fn acquire_lease(&self, key: &str, ttl_secs: u64, token: &str) -> Result<bool>;

    /// Libera sólo si `token` coincide con el holder actual; un token ajeno
    /// no toca nada.
    fn release_lease(&self, key: &str, token: &str) -> Result<()>;

    // --- Autorización ---

    /// Tenant propietario de un workspace. El caller lo compara con el
    /// tenant esperado; un mismatch es un fallo duro de autorización.
    fn resolve_workspace_owner(&self, workspace_id: &Uuid) -> Result<Uuid>;

    // --- Lecturas de dominio para detectores ---

    /// Registros secundarios candidatos de un workspace, por tipo. Sólo los
    /// consumen los detectores enchufables, no el núcleo genérico.
    fn list_domain_records(&self, workspace_id: &Uuid, kind: &str) -> Result<Vec<JsonValue>>;

    /// Documentos candidatos de un workspace.
    fn list_documents(&self, workspace_id: &Uuid) -> Result<Vec<DocumentRef>>;
}

/// Contrato del object/document store. Sólo lo consumen detectores y
/// executors de dominio; el núcleo genérico no lo toca.
pub trait ArtifactStore: Send + Sync {
    /// Lista las rutas guardadas bajo un prefijo.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Enlace de lectura con tiempo de vida limitado.
    fn signed_url(&self, path: &str, ttl_secs: u64) -> Result<String>;

    /// Escribe bytes en una ruta.
    fn put(&self, path: &str, bytes: &[u8]) -> Result<()>;
}
