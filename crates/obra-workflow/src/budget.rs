// Archivo: budget.rs
// Propósito: detector del presupuesto base — proyector de input que busca
// un documento de presupuesto cualificado entre los documentos del
// workspace.
use flow::domain::AvailableInput;
use flow::errors::Result;
use flow::plugins::{InputProjector, ProjectionContext};
use serde_json::json;

const STEP_BUDGET_BASE: &str = "budget_base";

/// Heurística de detección: un documento del workspace con kind "budget" o
/// con extensión de presupuesto conocida habilita el paso `budget_base`
/// aunque nadie lo haya marcado desde la UI. La marca explícita
/// (`input_marked`) siempre tiene prioridad en el orquestador.
pub struct BudgetDocumentDetector;

impl InputProjector for BudgetDocumentDetector {
    fn step_id(&self) -> &str {
        STEP_BUDGET_BASE
    }

    fn project(&self, ctx: &ProjectionContext<'_>) -> Result<Option<AvailableInput>> {
        let documents = ctx.repo.list_documents(&ctx.workspace_id)?;
        let candidate = documents.iter()
                                 .find(|doc| doc.kind.as_deref() == Some("budget") || has_budget_extension(&doc.name));
        Ok(candidate.map(|doc| AvailableInput { step_id: STEP_BUDGET_BASE.to_string(),
                                                data: json!({
                                                    "documentId": doc.id,
                                                    "name": doc.name,
                                                    "path": doc.path,
                                                    "detectedBy": "budget_document_detector",
                                                }) }))
    }
}

fn has_budget_extension(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".bc3") || lower.ends_with(".presupuesto.xlsx")
}
