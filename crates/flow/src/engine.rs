// Archivo: engine.rs
// Propósito: núcleo puro del motor — re-derivación de estados de paso y
// planificación de jobs automáticos. Sin acceso a persistencia: toda la
// entrada llega como argumentos y la salida es un valor nuevo.
use crate::domain::{AvailableInput, BlockReason, FlowDefinition, PlannedJob, StepMode, StepState, StepStatus,
                    StepType};
use indexmap::IndexMap;
use std::collections::HashMap;
use uuid::Uuid;

/// Re-deriva los estados de todos los pasos de una definición.
///
/// El recorrido sigue el orden de `definition.steps` manteniendo dos
/// lookups: los estados persistidos previos y los recién computados en esta
/// pasada, de modo que un paso puede resolver dependencias declaradas antes
/// que él. La función es pura e idempotente: dos llamadas con la misma
/// entrada producen la misma salida.
///
/// Reglas por paso:
/// - un estado previo terminal (`done`, `failed`, `running`) se copia tal
///   cual, nunca se re-deriva;
/// - `input` con dato disponible pasa a `done` con ese dato como `inputs`;
///   requerido sin dato queda `blocked(input_missing)`; opcional sin dato
///   queda `ready`;
/// - `generate` queda `ready` si todas sus dependencias están `done`, y
///   `blocked(dependencies_missing)` con la lista de faltantes si no.
pub fn evaluate_steps(definition: &FlowDefinition,
                      prior: &[StepState],
                      available: &[AvailableInput],
                      run_id: Uuid)
                      -> Vec<StepState> {
    let prior_by_id: HashMap<&str, &StepState> = prior.iter().map(|s| (s.step_id.as_str(), s)).collect();
    let inputs_by_id: HashMap<&str, &AvailableInput> = available.iter().map(|i| (i.step_id.as_str(), i)).collect();
    // Mapa ordenado por inserción: los pasos ya procesados en esta pasada
    // sirven como lookup de dependencias para los siguientes.
    let mut computed: IndexMap<String, StepState> = IndexMap::with_capacity(definition.steps.len());

    for step in &definition.steps {
        // Los estados terminales son pegajosos.
        if let Some(prev) = prior_by_id.get(step.id.as_str()) {
            if prev.status.is_terminal() {
                computed.insert(step.id.clone(), (*prev).clone());
                continue;
            }
        }

        let state = match step.step_type {
            StepType::Input => match inputs_by_id.get(step.id.as_str()) {
                Some(input) => StepState::done(run_id, &step.id, Some(input.data.clone()), None),
                None if step.required => StepState::blocked(run_id, &step.id, BlockReason::InputMissing),
                // La ausencia de un input opcional no bloquea.
                None => StepState::ready(run_id, &step.id),
            },
            StepType::Generate => {
                let missing: Vec<String> = step.requires
                                               .iter()
                                               .filter(|dep| !dependency_done(dep, &computed, &prior_by_id))
                                               .cloned()
                                               .collect();
                if missing.is_empty() {
                    StepState::ready(run_id, &step.id)
                } else {
                    StepState::blocked(run_id, &step.id, BlockReason::DependenciesMissing { missing })
                }
            }
        };
        computed.insert(step.id.clone(), state);
    }

    computed.into_values().collect()
}

/// Resuelve una dependencia buscando primero entre los pasos ya computados
/// en esta pasada y después entre los estados persistidos previos. Un id
/// irresoluble cuenta simplemente como "todavía no done".
fn dependency_done(dep: &str, computed: &IndexMap<String, StepState>, prior: &HashMap<&str, &StepState>) -> bool {
    if let Some(state) = computed.get(dep) {
        return state.status == StepStatus::Done;
    }
    matches!(prior.get(dep), Some(state) if state.status == StepStatus::Done)
}

/// Planifica jobs para los pasos `generate` en modo `auto` que están
/// `ready`. Los pasos en modo `human_input` nunca se planifican solos:
/// exigen un evento de disparo explícito.
pub fn plan_jobs(definition: &FlowDefinition, states: &[StepState], run_id: Uuid) -> Vec<PlannedJob> {
    let by_id: HashMap<&str, &StepState> = states.iter().map(|s| (s.step_id.as_str(), s)).collect();
    definition.steps
              .iter()
              .filter(|step| step.step_type == StepType::Generate && step.mode == Some(StepMode::Auto))
              .filter(|step| matches!(by_id.get(step.id.as_str()), Some(state) if state.status == StepStatus::Ready))
              .map(|step| PlannedJob { job_type: format!("generate_{}", step.id),
                                       step_id: step.id.clone(),
                                       run_id,
                                       payload: None })
              .collect()
}
