// Archivo: definitions.rs
// Propósito: catálogo de definiciones integradas de la capa de obra.
use flow::domain::{FlowDefinition, StepDefinition, StepMode, StepType, RUN_KEY_PERIOD};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Id de la definición integrada presupuesto–medición–certificado.
pub const PMC_DEFINITION_ID: &str = "pmc_v1";

// Catálogo estático e inmutable: no es un cache de proceso. Cada instancia
// guarda su propio snapshot, así que editar este catálogo en versiones
// futuras no toca instancias ya creadas.
static PMC_V1: Lazy<FlowDefinition> = Lazy::new(|| {
    FlowDefinition { id: PMC_DEFINITION_ID.to_string(),
                     name: "Budget-Measurement-Certificate".to_string(),
                     run_key: RUN_KEY_PERIOD.to_string(),
                     steps: vec![StepDefinition { id: "budget_base".to_string(),
                                                  step_type: StepType::Input,
                                                  required: true,
                                                  requires: vec![],
                                                  mode: None,
                                                  outputs: vec![],
                                                  doc_kinds: vec!["budget".to_string()] },
                                 StepDefinition { id: "measurement".to_string(),
                                                  step_type: StepType::Input,
                                                  required: true,
                                                  requires: vec!["budget_base".to_string()],
                                                  mode: None,
                                                  outputs: vec![],
                                                  doc_kinds: vec![] },
                                 StepDefinition { id: "certificate".to_string(),
                                                  step_type: StepType::Generate,
                                                  required: false,
                                                  requires: vec!["measurement".to_string()],
                                                  mode: Some(StepMode::HumanInput),
                                                  outputs: vec!["certificate_json".to_string()],
                                                  doc_kinds: vec![] }] }
});

/// Copia de la definición integrada `pmc_v1`.
pub fn pmc_definition() -> FlowDefinition {
    PMC_V1.clone()
}

/// Catálogo de definiciones integradas, indexado por id.
pub fn builtin_definitions() -> HashMap<String, FlowDefinition> {
    let mut catalog = HashMap::new();
    catalog.insert(PMC_DEFINITION_ID.to_string(), pmc_definition());
    catalog
}
