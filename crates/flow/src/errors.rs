// Archivo: errors.rs
// Propósito: definir los errores del motor de flujos y el alias Result<T>
// usado por las APIs del crate.
use thiserror::Error;

/// Errores comunes del motor de flujos.
///
/// - `Unauthorized`: el workspace no pertenece al tenant esperado.
/// - `LockUnavailable`: contención del lease de evaluación (reintentable).
/// - `NotFound`: entidad no encontrada.
/// - `Conflict`: conflicto de unicidad señalado por el almacenamiento.
/// - `Execution`: fallo de un executor de paso (side-effect de dominio).
/// - `Storage`: error al acceder al almacenamiento externo.
#[derive(Error, Debug)]
pub enum FlowError {
  /// Acceso denegado: el workspace pertenece a otro tenant.
  #[error("No autorizado: {0}")]
  Unauthorized(String),
  /// El lease de evaluación está en manos de otro holder. El caller puede
  /// reintentar con backoff; el motor nunca reintenta por su cuenta.
  #[error("flow_lock_unavailable: {0}")]
  LockUnavailable(String),
  /// Entidad no encontrada (instancia, run, workspace...).
  #[error("No encontrado: {0}")]
  NotFound(String),
  /// Conflicto de unicidad reconocido por el almacenamiento.
  #[error("Conflicto: {0}")]
  Conflict(String),
  /// Fallo del side-effect de un executor de paso.
  #[error("Error de ejecución de paso: {0}")]
  Execution(String),
  /// Error genérico de almacenamiento (BD, object store, etc.).
  #[error("Error de almacenamiento: {0}")]
  Storage(String),
  /// Errores de serialización/deserialización JSON.
  #[error("Error de serialización: {0}")]
  Serialization(#[from] serde_json::Error),
  /// Otro tipo de error.
  #[error("Otro: {0}")]
  Other(String),
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, FlowError>;
