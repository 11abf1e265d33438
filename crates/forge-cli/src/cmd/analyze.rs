use crate::output::{complexity_label, format_score, print_json, print_table};
use anyhow::Context;
use claude_api::{ClaudeClient, ClaudeScorer};
use forge_core::{config::Config, feature::Feature};
use forge_server::{AppState, ReanalysisMode, ReanalysisOutcome};
use std::path::Path;
use std::sync::Arc;

pub fn run(root: &Path, slug: &str, force: bool, json: bool) -> anyhow::Result<()> {
    let mode = if force {
        ReanalysisMode::Force
    } else {
        ReanalysisMode::IfStale
    };
    let outcome = analyze(root, slug, mode)?;
    let feature =
        Feature::load(root, slug).with_context(|| format!("failed to reload feature '{slug}'"))?;

    if json {
        print_json(&serde_json::json!({
            "outcome": outcome,
            "feature": forge_server::routes::features::feature_detail(&feature),
        }))?;
    } else {
        print_outcome(&feature, outcome.as_ref());
    }
    Ok(())
}

/// Run one reanalysis against the Claude scorer. `None` means it was
/// skipped because no LLM is configured; the reason goes to stderr.
pub fn analyze(
    root: &Path,
    slug: &str,
    mode: ReanalysisMode,
) -> anyhow::Result<Option<ReanalysisOutcome>> {
    let config = Config::load(root).context("failed to load config")?;
    // Surface a missing feature as an error before touching the LLM.
    Feature::load(root, slug).with_context(|| format!("feature '{slug}' not found"))?;

    let client = match ClaudeClient::from_config(&config.llm) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("warning: analysis skipped: {e}");
            return Ok(None);
        }
    };
    let state = AppState::with_collaborators(
        root.to_path_buf(),
        Some(Arc::new(ClaudeScorer::new(client))),
        None,
    );

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt
        .block_on(forge_server::reanalyze(&state, slug, mode))
        .map_err(|e| e.0)?;
    Ok(Some(outcome))
}

pub fn print_outcome(feature: &Feature, outcome: Option<&ReanalysisOutcome>) {
    let slug = &feature.slug;
    match outcome {
        None => println!("Run `forge analyze {slug}` once an API key is set."),
        Some(ReanalysisOutcome::Unchanged) => println!("Analysis for {slug} is current."),
        Some(ReanalysisOutcome::Superseded) => {
            println!("{slug} changed during analysis; result discarded. Run `forge analyze {slug}` again.")
        }
        Some(ReanalysisOutcome::Failed { warning }) => {
            eprintln!("warning: {warning}");
            println!("Previous analysis for {slug} kept.");
        }
        Some(ReanalysisOutcome::Updated { reason }) => {
            match reason {
                Some(r) => println!("Analyzed {slug} ({r})."),
                None => println!("Analyzed {slug}."),
            }
            print_analysis(feature);
        }
    }
}

pub fn print_analysis(feature: &Feature) {
    let Some(analysis) = &feature.analysis else {
        println!("Not analyzed yet.");
        return;
    };
    println!(
        "Overall complexity: {}{}",
        format_score(analysis.overall_complexity),
        if feature.analysis_current() {
            ""
        } else {
            "  (stale)"
        }
    );
    let rows: Vec<Vec<String>> = analysis
        .scenarios
        .iter()
        .enumerate()
        .map(|(i, s)| {
            vec![
                (i + 1).to_string(),
                complexity_label(s.complexity),
                s.title.clone(),
            ]
        })
        .collect();
    print_table(&["#", "COMPLEXITY", "SCENARIO"], rows);
    for rec in &analysis.recommendations {
        println!("- {rec}");
    }
}
