//! Reanalysis flow shared by the HTTP routes and the CLI.
//!
//! One run loads the latest stored feature, decides whether its analysis
//! must be recomputed, calls the scorer once, and persists the normalized
//! result only if the text it scored is still the stored text. A failed
//! run never writes the feature.

use forge_core::feature::Feature;
use forge_core::reconcile::{normalize_analysis_to_text, ReanalysisReason};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::AppError;
use crate::state::{AppState, ForgeEvent, InFlightGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReanalysisMode {
    /// Recompute regardless of alignment.
    Force,
    /// Recompute only when the reconciler asks for it.
    IfStale,
    /// First run on a freshly created feature. Recomputes like `Force` and
    /// reserves placeholders up to the declared scenario count.
    Created,
}

impl ReanalysisMode {
    /// Length hint for normalization. Only the post-create run pads to the
    /// declared count; later runs align to the headings alone.
    fn length_hint(self, declared: u32) -> Option<usize> {
        match self {
            ReanalysisMode::Created => Some(declared as usize),
            ReanalysisMode::Force | ReanalysisMode::IfStale => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReanalysisOutcome {
    Updated {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<ReanalysisReason>,
    },
    Unchanged,
    /// The text or count changed while scoring; the result was dropped.
    Superseded,
    /// Scoring failed; the stored analysis is untouched.
    Failed { warning: String },
}

impl ReanalysisOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReanalysisOutcome::Updated { .. } => "updated",
            ReanalysisOutcome::Unchanged => "unchanged",
            ReanalysisOutcome::Superseded => "superseded",
            ReanalysisOutcome::Failed { .. } => "failed",
        }
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            ReanalysisOutcome::Failed { warning } => Some(warning),
            _ => None,
        }
    }
}

/// Run a reanalysis for `slug`. Returns 409 when one is already in flight
/// for the same feature.
pub async fn reanalyze(
    app: &AppState,
    slug: &str,
    mode: ReanalysisMode,
) -> Result<ReanalysisOutcome, AppError> {
    let guard = app
        .begin_analysis(slug)
        .ok_or_else(|| AppError::conflict(format!("analysis already running for '{slug}'")))?;
    reanalyze_locked(app, guard, slug, mode).await
}

/// Same as [`reanalyze`] for callers that already hold the in-flight marker.
pub async fn reanalyze_locked(
    app: &AppState,
    _guard: InFlightGuard,
    slug: &str,
    mode: ReanalysisMode,
) -> Result<ReanalysisOutcome, AppError> {
    let feature = load(app, slug).await?;

    let reason = feature.reanalysis_reason();
    if mode == ReanalysisMode::IfStale && reason.is_none() {
        return Ok(ReanalysisOutcome::Unchanged);
    }

    let Some(scorer) = app.scorer.clone() else {
        let warning = "Complexity analysis skipped: no LLM is configured".to_string();
        warn!(slug = %slug, "{warning}");
        return Ok(ReanalysisOutcome::Failed { warning });
    };

    app.emit(ForgeEvent::AnalysisStarted {
        slug: slug.to_string(),
    });
    info!(slug = %slug, reason = ?reason, "analyzing feature complexity");

    let outcome = match scorer.score(&feature.text).await {
        Ok(scored) => {
            let hint = mode.length_hint(feature.declared_scenario_count);
            let normalized = normalize_analysis_to_text(scored, Some(&feature.text), hint);
            let app_for_save = app.clone();
            let scored_from = feature.clone();
            tokio::task::spawn_blocking(move || {
                let _w = app_for_save.write_lock();
                let mut latest = Feature::load(&app_for_save.root, &scored_from.slug)?;
                if latest.text != scored_from.text
                    || latest.declared_scenario_count != scored_from.declared_scenario_count
                {
                    warn!(slug = %latest.slug, "feature changed during analysis; discarding result");
                    return Ok::<_, forge_core::ForgeError>(ReanalysisOutcome::Superseded);
                }
                latest.set_analysis(normalized);
                latest.save(&app_for_save.root)?;
                Ok(ReanalysisOutcome::Updated { reason })
            })
            .await
            .map_err(AppError::join)??
        }
        Err(e) => {
            warn!(slug = %slug, error = %e, "complexity analysis failed; keeping previous analysis");
            ReanalysisOutcome::Failed {
                warning: format!("Complexity analysis failed: {e}"),
            }
        }
    };

    app.emit(ForgeEvent::AnalysisFinished {
        slug: slug.to_string(),
        status: outcome.label().to_string(),
    });
    Ok(outcome)
}

/// Reanalysis run right after a write. An analysis already in flight is
/// not an error here: the write recorded its stale reason and the next
/// request picks it up.
pub async fn reanalyze_after_write(
    app: &AppState,
    slug: &str,
    mode: ReanalysisMode,
) -> Result<(Option<ReanalysisOutcome>, Vec<String>), AppError> {
    let Some(guard) = app.begin_analysis(slug) else {
        info!(slug = %slug, "analysis already in flight; deferring");
        return Ok((
            None,
            vec!["An analysis is already running; this change will be analyzed on the next request."
                .to_string()],
        ));
    };
    let outcome = reanalyze_locked(app, guard, slug, mode).await?;
    let warnings = outcome.warning().map(str::to_string).into_iter().collect();
    Ok((Some(outcome), warnings))
}

async fn load(app: &AppState, slug: &str) -> Result<Feature, AppError> {
    let root = app.root.clone();
    let slug = slug.to_string();
    let feature = tokio::task::spawn_blocking(move || Feature::load(&root, &slug))
        .await
        .map_err(AppError::join)??;
    Ok(feature)
}
