// Archivo: lease.rs
// Propósito: lease de exclusión mutua con TTL sobre el adaptador de
// persistencia. Protege una unidad lógica de trabajo por instancia de
// flujo (la evaluación).
use crate::errors::{FlowError, Result};
use crate::repository::FlowRepository;
use uuid::Uuid;

/// TTL por defecto del lease, en segundos. Actúa sólo como red de seguridad
/// frente a un holder caído o colgado; no hay extensión cooperativa ni
/// heartbeat en este diseño.
pub const DEFAULT_LEASE_TTL_SECS: u64 = 30;

/// Ejecuta `f` bajo el lease `key`.
///
/// Genera un token opaco fresco e intenta la adquisición atómica "libre, o
/// tomado pero expirado" contra el adaptador. Si falla, devuelve
/// `LockUnavailable` inmediatamente: sin colas, sin reintentos internos.
///
/// La liberación ocurre en todas las rutas de salida — retorno normal,
/// error o panic — mediante un guard que libera con el mismo token, de modo
/// que el lease todavía válido de otro holder jamás se libera por accidente.
pub fn with_lease<R, T, F>(repo: &R, key: &str, ttl_secs: u64, f: F) -> Result<T>
    where R: FlowRepository + ?Sized,
          F: FnOnce() -> Result<T>
{
    let token = Uuid::new_v4().to_string();
    if !repo.acquire_lease(key, ttl_secs, &token)? {
        return Err(FlowError::LockUnavailable(format!("lease '{}' en uso por otro holder", key)));
    }
    let _guard = LeaseGuard { repo, key, token: &token };
    f()
}

/// Guard de liberación del lease. `Drop` no puede propagar errores: un
/// fallo al liberar se registra y el TTL hace el resto.
struct LeaseGuard<'a, R>
    where R: FlowRepository + ?Sized
{
    repo: &'a R,
    key: &'a str,
    token: &'a str,
}

impl<R> Drop for LeaseGuard<'_, R> where R: FlowRepository + ?Sized
{
    fn drop(&mut self) {
        if let Err(err) = self.repo.release_lease(self.key, self.token) {
            log::warn!("fallo liberando lease '{}': {}", self.key, err);
        }
    }
}
