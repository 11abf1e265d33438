use crate::cmd::analyze;
use crate::output::{format_score, print_json, print_table};
use anyhow::{bail, Context};
use clap::{Args, Subcommand};
use claude_api::{ClaudeClient, ClaudeGenerator, FeatureGenerator, GenerationRequest};
use forge_core::config::Config;
use forge_core::feature::{self, Feature, FeatureEdit, NewFeature};
use forge_core::paths;
use forge_server::routes::features::feature_detail;
use forge_server::ReanalysisMode;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum FeatureSubcommand {
    /// Create a feature, generating its Gherkin unless --text-file is given
    Create(CreateArgs),
    /// List all features
    List,
    /// Show a feature with its analysis and text
    Show { slug: String },
    /// Edit a feature; never calls the LLM, only marks the analysis stale
    Edit(EditArgs),
    /// Delete a feature
    Delete { slug: String },
    /// Print the scenario headings found in the feature text
    Headings { slug: String },
}

#[derive(Args)]
pub struct CreateArgs {
    pub title: String,
    /// User story the feature is written from
    #[arg(long)]
    pub story: String,
    /// Explicit slug (default: derived from the title)
    #[arg(long)]
    pub slug: Option<String>,
    #[arg(long)]
    pub domain: Option<String>,
    /// Declared scenario count (default: generation.default_scenario_count)
    #[arg(long = "scenarios")]
    pub scenarios: Option<u32>,
    /// Read the Gherkin text from a file instead of generating it
    #[arg(long)]
    pub text_file: Option<PathBuf>,
    /// Store the feature without scoring it
    #[arg(long)]
    pub no_analyze: bool,
}

#[derive(Args)]
pub struct EditArgs {
    pub slug: String,
    /// Replace the Gherkin text with the contents of this file
    #[arg(long)]
    pub text_file: Option<PathBuf>,
    #[arg(long = "scenarios")]
    pub scenarios: Option<u32>,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub story: Option<String>,
    /// Set the domain (an empty string clears it)
    #[arg(long)]
    pub domain: Option<String>,
}

pub fn run(root: &Path, subcmd: FeatureSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        FeatureSubcommand::Create(args) => create(root, args, json),
        FeatureSubcommand::List => list(root, json),
        FeatureSubcommand::Show { slug } => show(root, &slug, json),
        FeatureSubcommand::Edit(args) => edit(root, args, json),
        FeatureSubcommand::Delete { slug } => delete(root, &slug, json),
        FeatureSubcommand::Headings { slug } => headings(root, &slug, json),
    }
}

fn create(root: &Path, args: CreateArgs, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let count = args
        .scenarios
        .unwrap_or(config.generation.default_scenario_count);
    feature::validate_scenario_count(count)?;
    let slug = match args.slug {
        Some(slug) => slug,
        None => paths::slugify(&args.title)
            .with_context(|| format!("cannot derive a slug from '{}'; pass --slug", args.title))?,
    };
    paths::validate_slug(&slug)?;
    if paths::feature_dir(root, &slug).exists() {
        bail!("feature '{slug}' already exists");
    }
    let domain = args
        .domain
        .filter(|d| !d.trim().is_empty())
        .or(config.generation.default_domain.clone());

    let text = match &args.text_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let client = ClaudeClient::from_config(&config.llm)
                .context("generating a feature needs an LLM; pass --text-file to supply the text")?;
            let request = GenerationRequest {
                title: args.title.clone(),
                story: args.story.clone(),
                scenario_count: count,
                domain: domain.clone(),
            };
            tracing::info!(slug = %slug, scenarios = count, "generating feature");
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(ClaudeGenerator::new(client).generate(&request))
                .context("feature generation failed")?
        }
    };

    let created = Feature::create(
        root,
        NewFeature {
            slug: Some(slug.clone()),
            title: args.title,
            story: args.story,
            domain,
            declared_scenario_count: count,
            text,
        },
    )
    .with_context(|| format!("failed to create feature '{slug}'"))?;

    let outcome = if args.no_analyze {
        None
    } else {
        analyze::analyze(root, &slug, ReanalysisMode::Created)?
    };
    let feature = Feature::load(root, &slug).unwrap_or(created);

    if json {
        print_json(&serde_json::json!({
            "feature": feature_detail(&feature),
            "outcome": outcome,
        }))?;
        return Ok(());
    }

    println!(
        "Created feature: {slug} ({} scenarios)",
        feature.scenario_titles().len()
    );
    if !args.no_analyze {
        analyze::print_outcome(&feature, outcome.as_ref());
    }
    Ok(())
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let features = Feature::list(root).context("failed to list features")?;

    if json {
        let summaries: Vec<_> = features
            .iter()
            .map(|f| {
                serde_json::json!({
                    "slug": f.slug,
                    "title": f.title,
                    "declared_scenario_count": f.declared_scenario_count,
                    "scenario_count": f.scenario_titles().len(),
                    "overall_complexity": f.analysis.as_ref().map(|a| a.overall_complexity),
                    "analysis_current": f.analysis_current(),
                })
            })
            .collect();
        print_json(&summaries)?;
        return Ok(());
    }

    if features.is_empty() {
        println!("No features yet.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = features
        .iter()
        .map(|f| {
            let complexity = match &f.analysis {
                Some(a) if f.analysis_current() => format_score(a.overall_complexity),
                Some(a) => format!("{} (stale)", format_score(a.overall_complexity)),
                None => "-".to_string(),
            };
            vec![
                f.slug.clone(),
                format!(
                    "{}/{}",
                    f.scenario_titles().len(),
                    f.declared_scenario_count
                ),
                complexity,
                f.title.clone(),
            ]
        })
        .collect();
    print_table(&["SLUG", "SCENARIOS", "COMPLEXITY", "TITLE"], rows);
    Ok(())
}

fn show(root: &Path, slug: &str, json: bool) -> anyhow::Result<()> {
    let feature = Feature::load(root, slug).with_context(|| format!("feature '{slug}' not found"))?;

    if json {
        print_json(&feature_detail(&feature))?;
        return Ok(());
    }

    println!("Feature: {} - {}", feature.slug, feature.title);
    println!("Story:   {}", feature.story);
    if let Some(domain) = &feature.domain {
        println!("Domain:  {domain}");
    }
    println!(
        "Scenarios: {} found, {} declared",
        feature.scenario_titles().len(),
        feature.declared_scenario_count
    );
    if let Some(reason) = feature.reanalysis_reason() {
        println!("Needs reanalysis: {reason}");
    }
    println!();
    analyze::print_analysis(&feature);
    println!();
    println!("{}", feature.text.trim_end());
    Ok(())
}

fn edit(root: &Path, args: EditArgs, json: bool) -> anyhow::Result<()> {
    let text = match &args.text_file {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
        ),
        None => None,
    };
    let edit = FeatureEdit {
        title: args.title,
        story: args.story,
        domain: args.domain,
        text,
        declared_scenario_count: args.scenarios,
    };

    let mut feature = Feature::load(root, &args.slug)
        .with_context(|| format!("feature '{}' not found", args.slug))?;
    let hints = feature.apply_edit(edit)?;
    feature
        .save(root)
        .with_context(|| format!("failed to save feature '{}'", args.slug))?;

    if json {
        print_json(&serde_json::json!({
            "feature": feature_detail(&feature),
            "hints": hints,
        }))?;
        return Ok(());
    }

    println!("Updated feature: {}", feature.slug);
    if let Some(reason) = feature.reanalysis_reason() {
        println!("Analysis is stale ({reason}). Run `forge analyze {}`.", feature.slug);
    }
    Ok(())
}

fn delete(root: &Path, slug: &str, json: bool) -> anyhow::Result<()> {
    Feature::delete(root, slug).with_context(|| format!("failed to delete feature '{slug}'"))?;
    if json {
        print_json(&serde_json::json!({ "slug": slug, "deleted": true }))?;
    } else {
        println!("Deleted feature: {slug}");
    }
    Ok(())
}

fn headings(root: &Path, slug: &str, json: bool) -> anyhow::Result<()> {
    let feature = Feature::load(root, slug).with_context(|| format!("feature '{slug}' not found"))?;
    let titles = feature.scenario_titles();
    if json {
        print_json(&titles)?;
        return Ok(());
    }
    for (i, title) in titles.iter().enumerate() {
        println!("{:>3}. {title}", i + 1);
    }
    Ok(())
}
