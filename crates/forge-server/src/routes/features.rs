use axum::extract::{Path, State};
use axum::Json;
use claude_api::GenerationRequest;
use forge_core::config::Config;
use forge_core::feature::{self, Feature, FeatureEdit, NewFeature};
use forge_core::paths;
use tracing::info;

use crate::analysis::{reanalyze_after_write, ReanalysisMode, ReanalysisOutcome};
use crate::error::AppError;
use crate::state::{AppState, ForgeEvent};

/// Full feature body returned by the detail, create, edit and analyze routes.
pub fn feature_detail(f: &Feature) -> serde_json::Value {
    let mut json = serde_json::json!({
        "slug": f.slug,
        "title": f.title,
        "story": f.story,
        "domain": f.domain,
        "declared_scenario_count": f.declared_scenario_count,
        "text": f.text,
        "analysis": f.analysis,
        "stale_reason": f.stale_reason,
        "created_at": f.created_at,
        "updated_at": f.updated_at,
        "analyzed_at": f.analyzed_at,
    });
    json["scenario_titles"] = serde_json::json!(f.scenario_titles());
    json["analysis_current"] = serde_json::json!(f.analysis_current());
    json["reanalysis_reason"] = serde_json::json!(f.reanalysis_reason());
    json
}

fn feature_summary(f: &Feature) -> serde_json::Value {
    serde_json::json!({
        "slug": f.slug,
        "title": f.title,
        "declared_scenario_count": f.declared_scenario_count,
        "scenario_count": f.scenario_titles().len(),
        "overall_complexity": f.analysis.as_ref().map(|a| a.overall_complexity),
        "analysis_current": f.analysis_current(),
        "updated_at": f.updated_at,
    })
}

fn write_response(
    f: &Feature,
    outcome: Option<ReanalysisOutcome>,
    warnings: Vec<String>,
) -> serde_json::Value {
    serde_json::json!({
        "feature": feature_detail(f),
        "outcome": outcome,
        "warnings": warnings,
    })
}

async fn load(app: &AppState, slug: String) -> Result<Feature, AppError> {
    let root = app.root.clone();
    let feature = tokio::task::spawn_blocking(move || Feature::load(&root, &slug))
        .await
        .map_err(AppError::join)??;
    Ok(feature)
}

/// GET /api/features: list all features.
pub async fn list_features(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let root = app.root.clone();
    let result = tokio::task::spawn_blocking(move || {
        let features = Feature::list(&root)?;
        let list: Vec<serde_json::Value> = features.iter().map(feature_summary).collect();
        Ok::<_, forge_core::ForgeError>(serde_json::json!(list))
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}

/// GET /api/features/{slug}: full feature detail.
pub async fn get_feature(
    State(app): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let f = load(&app, slug).await?;
    Ok(Json(feature_detail(&f)))
}

#[derive(serde::Deserialize)]
pub struct CreateFeatureBody {
    pub title: String,
    #[serde(default)]
    pub story: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub scenario_count: Option<u32>,
    /// Supplied text skips generation.
    #[serde(default)]
    pub text: Option<String>,
}

/// POST /api/features: generate (unless `text` is given), store, then
/// analyze. Generation failure stores nothing; analysis failure still
/// stores the feature and reports a warning.
pub async fn create_feature(
    State(app): State<AppState>,
    Json(body): Json<CreateFeatureBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let root = app.root.clone();
    let title = body.title.trim().to_string();
    let slug_in = body.slug.clone();
    let count_in = body.scenario_count;
    let domain_in = body.domain.clone();

    // Validate and resolve defaults before spending a model call.
    let (slug, count, domain) = tokio::task::spawn_blocking(move || {
        let config = Config::load(&root)?;
        let slug = match slug_in {
            Some(s) => s,
            None => paths::slugify(&title)
                .ok_or_else(|| forge_core::ForgeError::InvalidSlug(title.clone()))?,
        };
        paths::validate_slug(&slug)?;
        if paths::feature_dir(&root, &slug).exists() {
            return Err(forge_core::ForgeError::FeatureExists(slug));
        }
        let count = count_in.unwrap_or(config.generation.default_scenario_count);
        feature::validate_scenario_count(count)?;
        let domain = domain_in
            .filter(|d| !d.trim().is_empty())
            .or(config.generation.default_domain);
        Ok::<_, forge_core::ForgeError>((slug, count, domain))
    })
    .await
    .map_err(AppError::join)??;

    let text = match body.text {
        Some(text) => text,
        None => {
            let generator = app.generator.clone().ok_or_else(|| {
                AppError::unavailable("feature generation needs an LLM; set the API key and restart")
            })?;
            let request = GenerationRequest {
                title: body.title.trim().to_string(),
                story: body.story.clone(),
                scenario_count: count,
                domain: domain.clone(),
            };
            info!(slug = %slug, scenarios = count, "generating feature");
            generator.generate(&request).await?
        }
    };

    let app_for_save = app.clone();
    let new = NewFeature {
        slug: Some(slug.clone()),
        title: body.title.trim().to_string(),
        story: body.story,
        domain,
        declared_scenario_count: count,
        text,
    };
    tokio::task::spawn_blocking(move || {
        let _w = app_for_save.write_lock();
        Feature::create(&app_for_save.root, new)
    })
    .await
    .map_err(AppError::join)??;
    info!(slug = %slug, "feature created");
    app.emit(ForgeEvent::FeatureCreated { slug: slug.clone() });

    let (outcome, warnings) = reanalyze_after_write(&app, &slug, ReanalysisMode::Created).await?;
    let f = load(&app, slug).await?;
    Ok(Json(write_response(&f, outcome, warnings)))
}

/// PATCH /api/features/{slug}: apply an edit, save it, then reanalyze if
/// the edit made the analysis stale and `analysis.reanalyze_on_edit` is on.
pub async fn update_feature(
    State(app): State<AppState>,
    Path(slug): Path<String>,
    Json(edit): Json<FeatureEdit>,
) -> Result<Json<serde_json::Value>, AppError> {
    let app_for_save = app.clone();
    let slug_for_save = slug.clone();
    let (hints, reanalyze_on_edit) = tokio::task::spawn_blocking(move || {
        let root = &app_for_save.root;
        let reanalyze_on_edit = Config::load(root)?.analysis.reanalyze_on_edit;
        let _w = app_for_save.write_lock();
        let mut f = Feature::load(root, &slug_for_save)?;
        let hints = f.apply_edit(edit)?;
        f.save(root)?;
        Ok::<_, forge_core::ForgeError>((hints, reanalyze_on_edit))
    })
    .await
    .map_err(AppError::join)??;
    app.emit(ForgeEvent::FeatureUpdated { slug: slug.clone() });

    let (outcome, warnings) = if reanalyze_on_edit {
        reanalyze_after_write(&app, &slug, ReanalysisMode::IfStale).await?
    } else {
        if hints.any() {
            info!(slug = %slug, "analysis marked stale; reanalysis deferred");
        }
        (None, Vec::new())
    };

    let f = load(&app, slug).await?;
    Ok(Json(write_response(&f, outcome, warnings)))
}

/// DELETE /api/features/{slug}
pub async fn delete_feature(
    State(app): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let app_for_delete = app.clone();
    let slug_for_delete = slug.clone();
    tokio::task::spawn_blocking(move || {
        let _w = app_for_delete.write_lock();
        Feature::delete(&app_for_delete.root, &slug_for_delete)
    })
    .await
    .map_err(AppError::join)??;
    info!(slug = %slug, "feature deleted");
    app.emit(ForgeEvent::FeatureDeleted { slug: slug.clone() });

    Ok(Json(serde_json::json!({ "slug": slug, "deleted": true })))
}
