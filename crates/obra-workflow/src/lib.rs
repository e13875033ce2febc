//! obra-workflow: capa de dominio del flujo presupuesto–medición–certificado.
//!
//! Crate que monta, sobre el motor genérico del crate `flow`, el flujo
//! integrado `pmc_v1`: catálogo de definiciones, detector del documento de
//! presupuesto, proyección y anotador de medición y executor del
//! certificado. El núcleo del motor no conoce ninguna de estas reglas; todo
//! entra por los seams de `flow::plugins`.

pub mod budget;
pub mod certificate;
pub mod definitions;
pub mod errors;
pub mod measurement;

pub use budget::BudgetDocumentDetector;
pub use certificate::{CertificateExecutor, EVENT_CERTIFICATE_REQUESTED};
pub use definitions::{builtin_definitions, pmc_definition, PMC_DEFINITION_ID};
pub use errors::ObraError;
pub use measurement::{MeasurementAnnotator, MeasurementProjection, EVENT_MEASUREMENT_SUBMITTED};

use flow::plugins::{FlowPlugins, PluginRegistry};

/// Plugins del flujo `pmc_v1`: detector de presupuesto, proyección y
/// anotador de medición y executor de certificado.
pub fn pmc_plugins() -> FlowPlugins {
    FlowPlugins { input_projectors: vec![Box::new(BudgetDocumentDetector)],
                  direct_projections: vec![Box::new(MeasurementProjection)],
                  annotators: vec![Box::new(MeasurementAnnotator)],
                  executors: vec![Box::new(CertificateExecutor)] }
}

/// Registra los plugins integrados en un registro del orquestador.
pub fn register_builtin(registry: &mut PluginRegistry) {
    registry.register(PMC_DEFINITION_ID, pmc_plugins());
}
