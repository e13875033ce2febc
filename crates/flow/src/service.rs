// Archivo: service.rs
// Propósito: orquestador del motor. Compone validador, evaluador,
// planificador, dedupe y lease con los plugins de dominio en las dos
// operaciones públicas (`emit_event`, `evaluate`) y las administrativas
// (`get_flow_state`, `init_flow_instance`, `set_flow_definition`,
// `archive_run`). Pensado para invocarse desde handlers HTTP o webhooks.
use crate::dedupe::build_dedupe_key;
use crate::domain::{current_period, validate_definition, AvailableInput, DefinitionSource, DefinitionUpdate,
                    EmitEventRequest, EmitOutcome, EngineEvent, EventInsert, FlowDefinition, FlowInstance, FlowRun,
                    FlowState, RunStatus, StepMode, StepState, StepStatus, StepType, EVENT_INPUT_MARKED,
                    EVENT_JOB_PLANNED};
use crate::engine::{evaluate_steps, plan_jobs};
use crate::errors::{FlowError, Result};
use crate::lease::{with_lease, DEFAULT_LEASE_TTL_SECS};
use crate::plugins::{FlowPlugins, PluginRegistry, ProjectionContext, StepExecutor};
use crate::repository::{ArtifactStore, FlowRepository};
use chrono::Utc;
use log::{debug, info};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Configuración del servicio.
pub struct FlowServiceConfig {
    /// Definición integrada con la que se crean instancias de forma
    /// perezosa cuando un workspace aún no tiene ninguna.
    pub default_definition_id: String,
    /// TTL del lease de evaluación, en segundos.
    pub lease_ttl_secs: u64,
}

impl FlowServiceConfig {
    pub fn new(default_definition_id: impl Into<String>) -> Self {
        Self { default_definition_id: default_definition_id.into(),
               lease_ttl_secs: DEFAULT_LEASE_TTL_SECS }
    }
}

/// Orquestador del motor de flujos.
///
/// Nota sobre estado y concurrencia:
/// - Todo el estado mutable vive en el repositorio; el servicio no guarda
///   caches ni singletons y puede instanciarse una vez por proceso o por
///   request indistintamente.
/// - `evaluate` es la única operación con exclusión mutua (lease por
///   instancia). `emit_event` no toma el lease: debe poder llamarse desde
///   muchos productores concurrentes, y su corrección descansa en la
///   unicidad de la clave de dedupe en el almacenamiento.
pub struct FlowService<R>
    where R: FlowRepository
{
    repo: Arc<R>,
    store: Arc<dyn ArtifactStore>,
    /// Catálogo inmutable de definiciones integradas, por id.
    builtins: HashMap<String, FlowDefinition>,
    plugins: PluginRegistry,
    config: FlowServiceConfig,
}

impl<R> FlowService<R> where R: FlowRepository + 'static
{
    pub fn new(repo: Arc<R>,
               store: Arc<dyn ArtifactStore>,
               builtins: HashMap<String, FlowDefinition>,
               plugins: PluginRegistry,
               config: FlowServiceConfig)
               -> Self {
        Self { repo, store, builtins, plugins, config }
    }

    /// Emite un evento de dominio de forma idempotente. Garantiza instancia
    /// y run (si el evento nombra un periodo), computa la clave de dedupe e
    /// inserta; un duplicado se traga y devuelve `Duplicate` en lugar de
    /// fallar. Seguro bajo llamadas concurrentes y repetidas.
    pub fn emit_event(&self, expected_tenant: &Uuid, workspace_id: &Uuid, request: EmitEventRequest) -> Result<EmitOutcome> {
        self.authorize(expected_tenant, workspace_id)?;
        let instance = self.ensure_instance(workspace_id)?;
        let run_id = match request.period.as_deref() {
            Some(period) => Some(self.ensure_run(&instance, period)?.id),
            None => None,
        };
        let dedupe_key = build_dedupe_key(&request.event_type,
                                          run_id.as_ref(),
                                          &request.payload,
                                          request.dedupe_key.as_deref());
        let event = EngineEvent { id: Uuid::new_v4(),
                                  workspace_id: *workspace_id,
                                  run_id,
                                  event_type: request.event_type,
                                  payload: request.payload,
                                  dedupe_key,
                                  created_at: Utc::now() };
        match self.repo.insert_event(&event)? {
            EventInsert::Inserted => Ok(EmitOutcome::Inserted(event)),
            EventInsert::Duplicate => {
                debug!("evento duplicado ignorado (dedupe_key {})", event.dedupe_key);
                Ok(EmitOutcome::Duplicate)
            }
        }
    }

    /// Evalúa el run del periodo indicado (o el corriente) bajo el lease de
    /// la instancia. Un segundo caller concurrente recibe `LockUnavailable`
    /// de inmediato y debe reintentar más tarde.
    pub fn evaluate(&self, expected_tenant: &Uuid, workspace_id: &Uuid, period: Option<&str>) -> Result<FlowState> {
        self.authorize(expected_tenant, workspace_id)?;
        let instance = self.ensure_instance(workspace_id)?;
        let lease_key = format!("flow_eval:{}", instance.id);
        with_lease(self.repo.as_ref(), &lease_key, self.config.lease_ttl_secs, || {
            self.evaluate_locked(&instance, period)
        })
    }

    /// Lectura del estado persistido, sin evaluar ni tomar el lease.
    /// Devuelve un estado vacío si el workspace todavía no tiene instancia
    /// o run.
    pub fn get_flow_state(&self, expected_tenant: &Uuid, workspace_id: &Uuid, period: Option<&str>) -> Result<FlowState> {
        self.authorize(expected_tenant, workspace_id)?;
        let instance = match self.repo.get_instance(workspace_id, &self.config.default_definition_id)? {
            Some(instance) => instance,
            None => {
                let definition = self.builtin_definition(&self.config.default_definition_id)?;
                return Ok(FlowState { definition,
                                      instance_id: None,
                                      run: None,
                                      steps: Vec::new(),
                                      planned_jobs: Vec::new() });
            }
        };
        let run = match period {
            Some(p) => self.repo.get_run(&instance.id, p)?,
            None => self.repo.latest_run(&instance.id)?,
        };
        let steps = match &run {
            Some(run) => self.repo.list_step_states(&run.id)?,
            None => Vec::new(),
        };
        Ok(FlowState { definition: instance.definition.clone(),
                       instance_id: Some(instance.id),
                       run,
                       steps,
                       planned_jobs: Vec::new() })
    }

    /// Crea (si no existe) la instancia del workspace a partir de una
    /// definición integrada o de un documento JSON explícito. El documento
    /// se valida antes de aceptarse; el rechazo es un valor, no un error.
    pub fn init_flow_instance(&self,
                              expected_tenant: &Uuid,
                              workspace_id: &Uuid,
                              source: DefinitionSource)
                              -> Result<DefinitionUpdate> {
        self.authorize(expected_tenant, workspace_id)?;
        let definition = match source {
            DefinitionSource::Named(id) => self.builtin_definition(&id)?,
            DefinitionSource::Inline(candidate) => {
                let report = validate_definition(&candidate);
                if !report.valid {
                    return Ok(DefinitionUpdate::Rejected(report));
                }
                serde_json::from_value(candidate)?
            }
        };
        if let Some(existing) = self.repo.get_instance(workspace_id, &definition.id)? {
            return Ok(DefinitionUpdate::Applied(existing));
        }
        let instance = self.create_instance(workspace_id, definition)?;
        Ok(DefinitionUpdate::Applied(instance))
    }

    /// Reemplaza el snapshot de definición de la instancia del workspace
    /// (creándola si no existe). No toca retroactivamente los estados de
    /// paso ya persistidos.
    pub fn set_flow_definition(&self,
                               expected_tenant: &Uuid,
                               workspace_id: &Uuid,
                               candidate: JsonValue)
                               -> Result<DefinitionUpdate> {
        self.authorize(expected_tenant, workspace_id)?;
        let report = validate_definition(&candidate);
        if !report.valid {
            return Ok(DefinitionUpdate::Rejected(report));
        }
        let definition: FlowDefinition = serde_json::from_value(candidate)?;
        match self.repo.get_instance(workspace_id, &definition.id)? {
            Some(mut instance) => {
                self.repo.set_instance_definition(&instance.id, &definition)?;
                instance.definition = definition;
                Ok(DefinitionUpdate::Applied(instance))
            }
            None => {
                let instance = self.create_instance(workspace_id, definition)?;
                Ok(DefinitionUpdate::Applied(instance))
            }
        }
    }

    /// Archiva el run de un periodo (operación administrativa).
    pub fn archive_run(&self, expected_tenant: &Uuid, workspace_id: &Uuid, period: &str) -> Result<()> {
        self.authorize(expected_tenant, workspace_id)?;
        let instance = self.repo
                           .get_instance(workspace_id, &self.config.default_definition_id)?
                           .ok_or_else(|| FlowError::NotFound(format!("instancia del workspace {}", workspace_id)))?;
        let run = self.repo
                      .get_run(&instance.id, period)?
                      .ok_or_else(|| FlowError::NotFound(format!("run del periodo {}", period)))?;
        self.repo.archive_run(&run.id)
    }

    // --- Internos ---

    /// Chequeo único de frontera: el workspace debe pertenecer al tenant
    /// que el caller espera.
    fn authorize(&self, expected_tenant: &Uuid, workspace_id: &Uuid) -> Result<()> {
        let owner = self.repo.resolve_workspace_owner(workspace_id)?;
        if owner != *expected_tenant {
            return Err(FlowError::Unauthorized(format!("workspace {} no pertenece al tenant {}",
                                                       workspace_id, expected_tenant)));
        }
        Ok(())
    }

    fn builtin_definition(&self, definition_id: &str) -> Result<FlowDefinition> {
        self.builtins
            .get(definition_id)
            .cloned()
            .ok_or_else(|| FlowError::NotFound(format!("definición integrada '{}'", definition_id)))
    }

    /// Instancia del workspace para la definición por defecto, creándola de
    /// forma perezosa en el primer uso.
    fn ensure_instance(&self, workspace_id: &Uuid) -> Result<FlowInstance> {
        if let Some(instance) = self.repo.get_instance(workspace_id, &self.config.default_definition_id)? {
            return Ok(instance);
        }
        let definition = self.builtin_definition(&self.config.default_definition_id)?;
        self.create_instance(workspace_id, definition)
    }

    fn create_instance(&self, workspace_id: &Uuid, definition: FlowDefinition) -> Result<FlowInstance> {
        let instance = FlowInstance { id: Uuid::new_v4(),
                                      workspace_id: *workspace_id,
                                      flow_definition_id: definition.id.clone(),
                                      definition,
                                      created_at: Utc::now() };
        self.repo.create_instance(&instance)?;
        Ok(instance)
    }

    /// Run de un periodo, creado de forma perezosa en el primer uso.
    fn ensure_run(&self, instance: &FlowInstance, period: &str) -> Result<FlowRun> {
        if let Some(run) = self.repo.get_run(&instance.id, period)? {
            return Ok(run);
        }
        let run = FlowRun { id: Uuid::new_v4(),
                            instance_id: instance.id,
                            period: period.to_string(),
                            status: RunStatus::Active,
                            created_at: Utc::now() };
        self.repo.create_run(&run)?;
        Ok(run)
    }

    /// Cuerpo de la evaluación, ya bajo el lease. El orden es el del ciclo
    /// completo: inputs disponibles → proyecciones directas → evaluador →
    /// planificador → anotadores → executors → upsert en lote → eventos
    /// `job_planned` idempotentes.
    fn evaluate_locked(&self, instance: &FlowInstance, period: Option<&str>) -> Result<FlowState> {
        let period = period.map(str::to_string).unwrap_or_else(current_period);
        let run = self.ensure_run(instance, &period)?;
        let events = self.repo.list_events(&instance.workspace_id, Some(&run.id))?;
        let prior = self.repo.list_step_states(&run.id)?;
        let plugins = self.plugins.get(&instance.flow_definition_id);

        let ctx = ProjectionContext { workspace_id: instance.workspace_id,
                                      run: &run,
                                      events: &events,
                                      repo: self.repo.as_ref(),
                                      store: self.store.as_ref() };

        let available = self.collect_available_inputs(&instance.definition, &ctx, plugins)?;

        // Proyecciones directas: completan pasos reportados out-of-band.
        // Un estado terminal ya persistido siempre gana.
        let mut effective_prior = prior;
        if let Some(plugins) = plugins {
            for projection in &plugins.direct_projections {
                let already_terminal = effective_prior.iter()
                                                      .any(|s| s.step_id == projection.step_id()
                                                               && s.status.is_terminal());
                if already_terminal {
                    continue;
                }
                if let Some(outputs) = projection.apply(&ctx)? {
                    effective_prior.retain(|s| s.step_id != projection.step_id());
                    effective_prior.push(StepState::done(run.id, projection.step_id(), None, Some(outputs)));
                }
            }
        }

        let mut states = evaluate_steps(&instance.definition, &effective_prior, &available, run.id);
        let planned = plan_jobs(&instance.definition, &states, run.id);
        debug!("evaluación del run {}: {} pasos, {} jobs planificados",
               run.id,
               states.len(),
               planned.len());

        // Anotadores: sólo enriquecen la razón de pasos bloqueados; el seam
        // no les permite tocar el status.
        if let Some(plugins) = plugins {
            for state in states.iter_mut().filter(|s| s.status == StepStatus::Blocked) {
                for annotator in &plugins.annotators {
                    if let Some(reason) = annotator.annotate(&ctx, state)? {
                        state.reason = Some(reason);
                    }
                }
            }
        }

        // Executors: un fallo aquí aborta la evaluación completa antes del
        // upsert en lote, así no se persisten cambios parciales.
        if let Some(plugins) = plugins {
            for executor in &plugins.executors {
                self.run_executor(&instance.definition, executor.as_ref(), &ctx, &mut states)?;
            }
        }

        self.repo.upsert_step_states(&run.id, &states)?;

        // Un evento idempotente por job, con clave explícita (run, paso):
        // planificar dos veces el mismo job jamás produce dos eventos.
        for job in &planned {
            let key = format!("{}:{}:{}", EVENT_JOB_PLANNED, job.run_id, job.step_id);
            let event = EngineEvent { id: Uuid::new_v4(),
                                      workspace_id: instance.workspace_id,
                                      run_id: Some(run.id),
                                      event_type: EVENT_JOB_PLANNED.to_string(),
                                      payload: json!({ "stepId": job.step_id, "jobType": job.job_type }),
                                      dedupe_key: key,
                                      created_at: Utc::now() };
            if self.repo.insert_event(&event)? == EventInsert::Inserted {
                info!("job planificado {} (run {})", job.job_type, run.id);
            }
        }

        Ok(FlowState { definition: instance.definition.clone(),
                       instance_id: Some(instance.id),
                       run: Some(run),
                       steps: states,
                       planned_jobs: planned })
    }

    /// Inputs disponibles para los pasos `input` de la definición: primero
    /// las marcas explícitas del log (`input_marked`, la última de cada
    /// paso gana) y después los detectores heurísticos, sólo para pasos
    /// que siguen sin dato.
    fn collect_available_inputs(&self,
                                definition: &FlowDefinition,
                                ctx: &ProjectionContext<'_>,
                                plugins: Option<&FlowPlugins>)
                                -> Result<Vec<AvailableInput>> {
        let mut available: Vec<AvailableInput> = Vec::new();
        for event in ctx.events.iter().filter(|e| e.event_type == EVENT_INPUT_MARKED) {
            let step_id = match event.payload.get("stepId").and_then(|v| v.as_str()) {
                Some(step_id) => step_id,
                None => continue,
            };
            let is_input_step = definition.step(step_id)
                                          .map(|s| s.step_type == StepType::Input)
                                          .unwrap_or(false);
            if !is_input_step {
                continue;
            }
            let data = event.payload.get("data").cloned().unwrap_or(JsonValue::Null);
            available.retain(|i| i.step_id != step_id);
            available.push(AvailableInput { step_id: step_id.to_string(), data });
        }
        if let Some(plugins) = plugins {
            for projector in &plugins.input_projectors {
                if available.iter().any(|i| i.step_id == projector.step_id()) {
                    continue;
                }
                if let Some(input) = projector.project(ctx)? {
                    available.push(input);
                }
            }
        }
        Ok(available)
    }

    /// Ejecuta el side-effect de un paso `ready` cuyo modo exige disparo
    /// explícito, si el evento de disparo aparece en el log. El paso
    /// transiciona a `done` con los outputs devueltos por el executor.
    fn run_executor(&self,
                    definition: &FlowDefinition,
                    executor: &dyn StepExecutor,
                    ctx: &ProjectionContext<'_>,
                    states: &mut [StepState])
                    -> Result<()> {
        let step = match definition.step(executor.step_id()) {
            Some(step) => step,
            None => return Ok(()),
        };
        // Sólo pasos generate con disparo humano explícito.
        if step.step_type != StepType::Generate || step.mode != Some(StepMode::HumanInput) {
            return Ok(());
        }
        let state = match states.iter_mut().find(|s| s.step_id == step.id) {
            Some(state) => state,
            None => return Ok(()),
        };
        if state.status != StepStatus::Ready {
            return Ok(());
        }
        let trigger = match ctx.events.iter().rev().find(|e| e.event_type == executor.trigger_event_type()) {
            Some(trigger) => trigger,
            None => return Ok(()),
        };
        let outputs = executor.execute(ctx, trigger)?;
        state.status = StepStatus::Done;
        state.reason = None;
        state.outputs = Some(outputs);
        state.updated_at = Utc::now();
        info!("paso '{}' completado por executor (run {})", step.id, ctx.run.id);
        Ok(())
    }
}
