// Archivo: dedupe.rs
// Propósito: construcción determinista de claves de idempotencia para los
// eventos del motor.
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Serialización canónica de un valor JSON: las claves de objeto se ordenan
/// lexicográficamente de forma recursiva, los arrays conservan su orden y
/// los primitivos se codifican como literales JSON estándar. Dos payloads
/// lógicamente iguales producen siempre el mismo texto, sin importar el
/// orden de claves en memoria.
pub fn canonical_json(value: &JsonValue) -> String {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys.into_iter()
                                          .map(|k| format!("{}:{}", JsonValue::String(k.clone()), canonical_json(&map[k])))
                                          .collect();
            format!("{{{}}}", fields.join(","))
        }
        JsonValue::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

/// Construye la clave de deduplicación de un evento. Una clave explícita se
/// usa tal cual; en su defecto se concatena
/// `tipo + ":" + (run o "global") + ":" + payload canónico` y se digiere
/// con SHA-256 en hexadecimal: longitud fija, apta para un índice único en
/// el almacenamiento.
pub fn build_dedupe_key(event_type: &str,
                        run_id: Option<&Uuid>,
                        payload: &JsonValue,
                        explicit: Option<&str>)
                        -> String {
    if let Some(key) = explicit {
        return key.to_string();
    }
    let scope = run_id.map(|id| id.to_string()).unwrap_or_else(|| "global".to_string());
    let material = format!("{}:{}:{}", event_type, scope, canonical_json(payload));
    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    format!("{:x}", hasher.finalize())
}
