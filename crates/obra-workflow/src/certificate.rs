// Archivo: certificate.rs
// Propósito: executor del paso de certificado — renderiza el artefacto al
// object store cuando llega el disparo explícito (`certificate_requested`).
use crate::errors::ObraError;
use crate::measurement::EVENT_MEASUREMENT_SUBMITTED;
use flow::domain::EngineEvent;
use flow::errors::{FlowError, Result};
use flow::plugins::{ProjectionContext, StepExecutor};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};

/// Evento de disparo del certificado (modo `human_input`).
pub const EVENT_CERTIFICATE_REQUESTED: &str = "certificate_requested";

const STEP_CERTIFICATE: &str = "certificate";

/// Contenido del artefacto generado. Se serializa como JSON; el render
/// final a PDF/planilla queda fuera de este subsistema.
#[derive(Debug, Serialize)]
struct CertificateArtifact {
    workspace_id: String,
    period: String,
    requested_by: Option<String>,
    measurement: JsonValue,
    generated_at: String,
}

/// Executor del certificado: construye el artefacto con la última medición
/// del log y lo escribe bajo `certificates/<workspace>/<periodo>.json`.
/// Devuelve los outputs a persistir en el estado del paso (ruta, enlace
/// temporal de lectura y tamaño).
pub struct CertificateExecutor;

impl StepExecutor for CertificateExecutor {
    fn step_id(&self) -> &str {
        STEP_CERTIFICATE
    }

    fn trigger_event_type(&self) -> &str {
        EVENT_CERTIFICATE_REQUESTED
    }

    fn execute(&self, ctx: &ProjectionContext<'_>, trigger: &EngineEvent) -> Result<JsonValue> {
        let path = format!("certificates/{}/{}.json", ctx.workspace_id, ctx.run.period);
        let bytes = render_certificate(ctx, trigger).map_err(|e| FlowError::Execution(e.to_string()))?;
        ctx.store.put(&path, &bytes)?;
        let url = ctx.store.signed_url(&path, 3600)?;
        log::info!("certificado generado en {} (run {})", path, ctx.run.id);
        Ok(json!({ "path": path, "url": url, "sizeBytes": bytes.len() }))
    }
}

/// Construye los bytes del artefacto a partir del disparo y del último
/// envío de medición presente en el log del run.
fn render_certificate(ctx: &ProjectionContext<'_>, trigger: &EngineEvent) -> std::result::Result<Vec<u8>, ObraError> {
    let measurement = ctx.events
                         .iter()
                         .rev()
                         .find(|e| e.event_type == EVENT_MEASUREMENT_SUBMITTED)
                         .map(|e| e.payload.clone())
                         .unwrap_or(JsonValue::Null);
    let artifact = CertificateArtifact { workspace_id: ctx.workspace_id.to_string(),
                                         period: ctx.run.period.clone(),
                                         requested_by: trigger.payload
                                                              .get("requestedBy")
                                                              .and_then(|v| v.as_str())
                                                              .map(str::to_string),
                                         measurement,
                                         generated_at: chrono::Utc::now().to_rfc3339() };
    Ok(serde_json::to_vec_pretty(&artifact)?)
}
