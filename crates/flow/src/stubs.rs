// Archivo: stubs.rs
// Propósito: implementaciones en memoria para pruebas y wiring rápido.
//
// Incluye un repositorio en memoria (`InMemoryFlowRepository`) que cubre el
// contrato completo de `FlowRepository` (lease incluido) y un object store
// simbólico (`InMemoryArtifactStore`). No son durables: sirven para demos,
// ejemplos y tests locales.
use crate::domain::{DocumentRef, EngineEvent, EventInsert, FlowDefinition, FlowInstance, FlowRun, RunStatus,
                    StepState};
use crate::errors::{FlowError, Result};
use crate::repository::{ArtifactStore, FlowRepository};
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Fila del lease en memoria: token del holder y expiración.
#[derive(Debug, Clone)]
struct LeaseRow {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Repositorio en memoria. Las tablas son mapas bajo `Mutex`; el lease usa
/// un `DashMap` cuya API de entry mantiene atómica la adquisición.
pub struct InMemoryFlowRepository {
    /// Tenant propietario por workspace (se inscribe con `register_workspace`).
    owners: Mutex<HashMap<Uuid, Uuid>>,
    /// Instancias por id.
    instances: Mutex<HashMap<Uuid, FlowInstance>>,
    /// Runs por id.
    runs: Mutex<HashMap<Uuid, FlowRun>>,
    /// Estados de paso por run.
    step_states: Mutex<HashMap<Uuid, Vec<StepState>>>,
    /// Log de eventos en orden de inserción.
    events: Mutex<Vec<EngineEvent>>,
    /// Índice de claves de dedupe ya insertadas.
    dedupe_index: Mutex<HashSet<String>>,
    leases: DashMap<String, LeaseRow>,
    /// Registros secundarios por (workspace, tipo), para los detectores.
    domain_records: Mutex<HashMap<(Uuid, String), Vec<JsonValue>>>,
    /// Documentos por workspace, para los detectores.
    documents: Mutex<HashMap<Uuid, Vec<DocumentRef>>>,
}

impl InMemoryFlowRepository {
    pub fn new() -> Self {
        Self { owners: Mutex::new(HashMap::new()),
               instances: Mutex::new(HashMap::new()),
               runs: Mutex::new(HashMap::new()),
               step_states: Mutex::new(HashMap::new()),
               events: Mutex::new(Vec::new()),
               dedupe_index: Mutex::new(HashSet::new()),
               leases: DashMap::new(),
               domain_records: Mutex::new(HashMap::new()),
               documents: Mutex::new(HashMap::new()) }
    }

    /// Helper para mapear `Mutex::lock()` en un `Result` con
    /// `FlowError::Storage`.
    fn lock<'a, T>(&'a self, m: &'a Mutex<T>) -> std::result::Result<MutexGuard<'a, T>, FlowError> {
        m.lock().map_err(|e| FlowError::Storage(format!("mutex poisoned: {:?}", e)))
    }

    /// Inscribe el tenant propietario de un workspace (seed de pruebas).
    pub fn register_workspace(&self, workspace_id: Uuid, tenant_id: Uuid) {
        self.owners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(workspace_id, tenant_id);
    }

    /// Seed de un documento candidato del workspace.
    pub fn add_document(&self, document: DocumentRef) {
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(document.workspace_id)
            .or_default()
            .push(document);
    }

    /// Seed de un registro secundario del workspace.
    pub fn add_domain_record(&self, workspace_id: Uuid, kind: &str, record: JsonValue) {
        self.domain_records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry((workspace_id, kind.to_string()))
            .or_default()
            .push(record);
    }
}

impl Default for InMemoryFlowRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowRepository for InMemoryFlowRepository {
    fn get_instance(&self, workspace_id: &Uuid, definition_id: &str) -> Result<Option<FlowInstance>> {
        let instances = self.lock(&self.instances)?;
        Ok(instances.values()
                    .find(|i| i.workspace_id == *workspace_id && i.flow_definition_id == definition_id)
                    .cloned())
    }

    fn create_instance(&self, instance: &FlowInstance) -> Result<()> {
        self.lock(&self.instances)?.insert(instance.id, instance.clone());
        Ok(())
    }

    fn set_instance_definition(&self, instance_id: &Uuid, definition: &FlowDefinition) -> Result<()> {
        let mut instances = self.lock(&self.instances)?;
        let instance = instances.get_mut(instance_id)
                                .ok_or_else(|| FlowError::NotFound(format!("instancia {}", instance_id)))?;
        instance.definition = definition.clone();
        instance.flow_definition_id = definition.id.clone();
        Ok(())
    }

    fn get_run(&self, instance_id: &Uuid, period: &str) -> Result<Option<FlowRun>> {
        let runs = self.lock(&self.runs)?;
        Ok(runs.values()
               .find(|r| r.instance_id == *instance_id && r.period == period)
               .cloned())
    }

    fn latest_run(&self, instance_id: &Uuid) -> Result<Option<FlowRun>> {
        let runs = self.lock(&self.runs)?;
        Ok(runs.values()
               .filter(|r| r.instance_id == *instance_id)
               .max_by_key(|r| r.created_at)
               .cloned())
    }

    fn create_run(&self, run: &FlowRun) -> Result<()> {
        let mut runs = self.lock(&self.runs)?;
        // Unicidad por (instancia, periodo), como exigiría un índice real.
        if runs.values().any(|r| r.instance_id == run.instance_id && r.period == run.period) {
            return Err(FlowError::Conflict(format!("run duplicado para el periodo {}", run.period)));
        }
        runs.insert(run.id, run.clone());
        Ok(())
    }

    fn archive_run(&self, run_id: &Uuid) -> Result<()> {
        let mut runs = self.lock(&self.runs)?;
        let run = runs.get_mut(run_id)
                      .ok_or_else(|| FlowError::NotFound(format!("run {}", run_id)))?;
        run.status = RunStatus::Archived;
        Ok(())
    }

    fn list_step_states(&self, run_id: &Uuid) -> Result<Vec<StepState>> {
        let states = self.lock(&self.step_states)?;
        Ok(states.get(run_id).cloned().unwrap_or_default())
    }

    fn upsert_step_states(&self, run_id: &Uuid, states: &[StepState]) -> Result<()> {
        let mut table = self.lock(&self.step_states)?;
        let stored = table.entry(*run_id).or_default();
        for state in states {
            match stored.iter_mut().find(|s| s.step_id == state.step_id) {
                Some(existing) => *existing = state.clone(),
                None => stored.push(state.clone()),
            }
        }
        Ok(())
    }

    fn insert_event(&self, event: &EngineEvent) -> Result<EventInsert> {
        let mut index = self.lock(&self.dedupe_index)?;
        if !index.insert(event.dedupe_key.clone()) {
            return Ok(EventInsert::Duplicate);
        }
        self.lock(&self.events)?.push(event.clone());
        Ok(EventInsert::Inserted)
    }

    fn list_events(&self, workspace_id: &Uuid, run_id: Option<&Uuid>) -> Result<Vec<EngineEvent>> {
        let events = self.lock(&self.events)?;
        Ok(events.iter()
                 .filter(|e| e.workspace_id == *workspace_id)
                 .filter(|e| match run_id {
                     // Un run ve sus propios eventos más los globales.
                     Some(run) => e.run_id.as_ref() == Some(run) || e.run_id.is_none(),
                     None => true,
                 })
                 .cloned()
                 .collect())
    }

    fn acquire_lease(&self, key: &str, ttl_secs: u64, token: &str) -> Result<bool> {
        let now = Utc::now();
        let row = LeaseRow { token: token.to_string(),
                             expires_at: now + Duration::seconds(ttl_secs as i64) };
        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut held) => {
                if held.get().expires_at > now {
                    return Ok(false);
                }
                // Holder caído: el TTL venció y la clave puede reclamarse.
                held.insert(row);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(row);
                Ok(true)
            }
        }
    }

    fn release_lease(&self, key: &str, token: &str) -> Result<()> {
        self.leases.remove_if(key, |_, row| row.token == token);
        Ok(())
    }

    fn resolve_workspace_owner(&self, workspace_id: &Uuid) -> Result<Uuid> {
        let owners = self.lock(&self.owners)?;
        owners.get(workspace_id)
              .copied()
              .ok_or_else(|| FlowError::NotFound(format!("workspace {}", workspace_id)))
    }

    fn list_domain_records(&self, workspace_id: &Uuid, kind: &str) -> Result<Vec<JsonValue>> {
        let records = self.lock(&self.domain_records)?;
        Ok(records.get(&(*workspace_id, kind.to_string())).cloned().unwrap_or_default())
    }

    fn list_documents(&self, workspace_id: &Uuid) -> Result<Vec<DocumentRef>> {
        let documents = self.lock(&self.documents)?;
        Ok(documents.get(workspace_id).cloned().unwrap_or_default())
    }
}

/// Object store en memoria: guarda los bytes en un `BTreeMap` y fabrica
/// enlaces simbólicos `inmem://`.
pub struct InMemoryArtifactStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self { objects: Mutex::new(BTreeMap::new()) }
    }

    /// Lee los bytes guardados bajo una ruta (helper de pruebas).
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects
                          .lock()
                          .map_err(|e| FlowError::Storage(format!("mutex poisoned: {:?}", e)))?;
        Ok(objects.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    fn signed_url(&self, path: &str, ttl_secs: u64) -> Result<String> {
        let objects = self.objects
                          .lock()
                          .map_err(|e| FlowError::Storage(format!("mutex poisoned: {:?}", e)))?;
        if !objects.contains_key(path) {
            return Err(FlowError::NotFound(format!("objeto {}", path)));
        }
        Ok(format!("inmem://{}?ttl={}", path, ttl_secs))
    }

    fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.objects
            .lock()
            .map_err(|e| FlowError::Storage(format!("mutex poisoned: {:?}", e)))?
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }
}
