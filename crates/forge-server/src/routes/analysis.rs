use axum::extract::{Path, State};
use axum::Json;

use crate::analysis::{reanalyze, ReanalysisMode};
use crate::error::AppError;
use crate::routes::features::feature_detail;
use crate::state::AppState;

#[derive(Debug, Default, serde::Deserialize)]
pub struct AnalyzeBody {
    #[serde(default)]
    pub force: bool,
}

/// POST /api/features/{slug}/analyze: run the reanalysis flow.
///
/// 409 while another analysis for the same feature is in flight. A scoring
/// failure is a 200 carrying `outcome.status == "failed"` and a warning;
/// the stored analysis is left as it was.
pub async fn analyze_feature(
    State(app): State<AppState>,
    Path(slug): Path<String>,
    body: Option<Json<AnalyzeBody>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(body) = body.unwrap_or_default();
    let mode = if body.force {
        ReanalysisMode::Force
    } else {
        ReanalysisMode::IfStale
    };

    let outcome = reanalyze(&app, &slug, mode).await?;
    let warnings: Vec<&str> = outcome.warning().into_iter().collect();

    let root = app.root.clone();
    let f = tokio::task::spawn_blocking(move || forge_core::feature::Feature::load(&root, &slug))
        .await
        .map_err(AppError::join)??;

    Ok(Json(serde_json::json!({
        "feature": feature_detail(&f),
        "outcome": outcome,
        "warnings": warnings,
    })))
}
