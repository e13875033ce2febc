// Archivo: measurement.rs
// Propósito: proyección directa del paso de medición y anotador de su
// bloqueo. La medición se reporta out-of-band con un evento
// `measurement_submitted`; el paso se completa en cuanto el log lo contiene.
use flow::domain::{BlockReason, StepState, StepStatus};
use flow::errors::Result;
use flow::plugins::{DirectProjection, ProjectionContext, StepAnnotator};
use serde_json::{json, Value as JsonValue};

/// Tipo de evento que reporta la medición del periodo.
pub const EVENT_MEASUREMENT_SUBMITTED: &str = "measurement_submitted";

const STEP_MEASUREMENT: &str = "measurement";

/// Completa `measurement` en cuanto el log contiene un
/// `measurement_submitted`, llevando el payload del evento como outputs.
pub struct MeasurementProjection;

impl DirectProjection for MeasurementProjection {
    fn step_id(&self) -> &str {
        STEP_MEASUREMENT
    }

    fn apply(&self, ctx: &ProjectionContext<'_>) -> Result<Option<JsonValue>> {
        // El último envío gana si el periodo se midió más de una vez.
        let submitted = ctx.events
                           .iter()
                           .rev()
                           .find(|e| e.event_type == EVENT_MEASUREMENT_SUBMITTED);
        Ok(submitted.map(|event| event.payload.clone()))
    }
}

/// Anotador del bloqueo de medición: enriquece la razón con el número de
/// partidas del presupuesto pendientes de medir, para que la UI pueda
/// explicar el bloqueo sin consultar nada más.
pub struct MeasurementAnnotator;

impl StepAnnotator for MeasurementAnnotator {
    fn annotate(&self, ctx: &ProjectionContext<'_>, state: &StepState) -> Result<Option<BlockReason>> {
        if state.step_id != STEP_MEASUREMENT || state.status != StepStatus::Blocked {
            return Ok(None);
        }
        let partidas = ctx.repo.list_domain_records(&ctx.workspace_id, "partida")?;
        Ok(Some(BlockReason::DomainBlocked { kind: "measurement_pending".to_string(),
                                             message: format!("medición pendiente del periodo {}", ctx.run.period),
                                             detail: json!({ "pendingLines": partidas.len() }) }))
    }
}
