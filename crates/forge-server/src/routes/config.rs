use axum::extract::State;
use axum::Json;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/config: read-only view of `.forge/config.yaml`.
///
/// The config only names the environment variable holding the API key, so
/// no secret is ever returned here.
pub async fn get_config(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let root = app.root.clone();
    let llm_ready = app.scorer.is_some();
    let result = tokio::task::spawn_blocking(move || {
        let config = forge_core::config::Config::load(&root)?;
        let mut json = serde_json::to_value(&config)?;
        json["warnings"] = serde_json::to_value(config.validate())?;
        json["llm_ready"] = serde_json::Value::Bool(llm_ready);
        Ok::<_, forge_core::ForgeError>(json)
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}
