use thiserror::Error;

// Errores de la capa de dominio de obra.
//
// Centraliza los fallos que pueden darse al construir artefactos o
// proyecciones de dominio: errores del motor (`FlowError`), de
// serializacion y otros no tipados.
#[derive(Error, Debug)]
pub enum ObraError {
  /// Errores originados por el motor de flujos.
  #[error("Error de flujo: {0}")]
  Flow(#[from] flow::errors::FlowError),

  /// Errores de serializacion/deserializacion JSON.
  #[error("Error de serializacion: {0}")]
  Serialization(#[from] serde_json::Error),

  /// Error generico: captura otros tipos de errores no tipados.
  #[error("Otro error: {0}")]
  Other(String),
}
