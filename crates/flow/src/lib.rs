//! Crate `flow` — motor de evaluación de flujos por workspace y periodo.
//!
//! Este crate define el modelo de definición de flujos (`FlowDefinition`) y
//! su validador estructural, el evaluador puro de estados de paso, el
//! planificador de jobs automáticos, la construcción determinista de claves
//! de idempotencia, el lease de exclusión mutua con TTL, los contratos de
//! persistencia (`FlowRepository`) y object store (`ArtifactStore`), y el
//! orquestador `FlowService` que compone todo con los plugins de dominio.
//!
//! Diseño resumido:
//! - Estado externalizado: el motor no guarda estado mutable de proceso;
//!   cada operación recibe su contexto completo y delega en el repositorio.
//! - Idempotencia: los eventos se insertan con clave de dedupe única; un
//!   duplicado es un no-op benigno, nunca un error.
//! - Exclusión mutua: `evaluate` corre bajo un lease con TTL por instancia;
//!   un segundo caller concurrente falla rápido con `LockUnavailable`.
//!
//! Ejemplo rápido:
//! ```rust
//! use flow::stubs::{InMemoryArtifactStore, InMemoryFlowRepository};
//! use flow::{FlowService, FlowServiceConfig, PluginRegistry};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! let repo = Arc::new(InMemoryFlowRepository::new());
//! let store = Arc::new(InMemoryArtifactStore::new());
//! let service = FlowService::new(repo, store, HashMap::new(),
//!                                PluginRegistry::new(),
//!                                FlowServiceConfig::new("pmc_v1"));
//! ```
pub mod dedupe;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod lease;
pub mod plugins;
pub mod repository;
pub mod service;
pub mod stubs;

pub use dedupe::*;
pub use domain::*;
pub use engine::*;
pub use errors::*;
pub use lease::*;
pub use plugins::*;
pub use repository::*;
pub use service::*;
pub use stubs::*;
