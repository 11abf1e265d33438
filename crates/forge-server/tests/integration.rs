use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use claude_api::{ClaudeApiError, ComplexityScorer, FeatureGenerator, GenerationRequest};
use forge_core::analysis::ComplexityAnalysis;
use forge_core::feature::{Feature, NewFeature};
use forge_server::state::{AppState, ForgeEvent};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tokio::sync::Notify;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Scorer that returns one scored entry per configured title, or fails.
/// With `hold` set, the first call waits for `release` before answering.
#[derive(Default)]
struct FakeScorer {
    titles: Vec<String>,
    fail: bool,
    hold: bool,
    calls: AtomicUsize,
    started: Notify,
    release: Notify,
}

impl FakeScorer {
    fn scoring(titles: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            titles: titles.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    fn held(titles: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            titles: titles.iter().map(|t| t.to_string()).collect(),
            hold: true,
            ..Default::default()
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComplexityScorer for FakeScorer {
    async fn score(&self, _text: &str) -> claude_api::Result<ComplexityAnalysis> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hold && n == 0 {
            self.started.notify_one();
            self.release.notified().await;
        }
        if self.fail {
            return Err(ClaudeApiError::Api {
                status: 529,
                message: "overloaded".into(),
            });
        }
        let scenarios: Vec<serde_json::Value> = self
            .titles
            .iter()
            .map(|t| serde_json::json!({"title": t, "complexity": 4, "explanation": "scored"}))
            .collect();
        Ok(ComplexityAnalysis::from_model_output(&serde_json::json!({
            "overallComplexity": 6,
            "scenarios": scenarios,
            "recommendations": ["split checkout"],
        }))?)
    }
}

struct FakeGenerator {
    fail: bool,
}

#[async_trait]
impl FeatureGenerator for FakeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> claude_api::Result<String> {
        if self.fail {
            return Err(ClaudeApiError::EmptyResponse);
        }
        let mut text = format!("Feature: {}\n", request.title);
        for i in 1..=request.scenario_count {
            text.push_str(&format!("  Scenario: Generated {i}\n    Given step {i}\n"));
        }
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const CART: &str = "Feature: Cart\n  Scenario: Add item\n    Given a cart\n  Scenario: Remove item\n    Given a cart\n";

fn init_project(dir: &TempDir) {
    forge_core::io::ensure_dir(&forge_core::paths::features_dir(dir.path())).unwrap();
    forge_core::config::Config::new("test-project")
        .save(dir.path())
        .unwrap();
}

fn state(
    dir: &TempDir,
    scorer: Option<Arc<FakeScorer>>,
    generator: Option<FakeGenerator>,
) -> AppState {
    AppState::with_collaborators(
        dir.path().to_path_buf(),
        scorer.map(|s| s as Arc<dyn ComplexityScorer>),
        generator.map(|g| Arc::new(g) as Arc<dyn FeatureGenerator>),
    )
}

fn seed_feature(dir: &TempDir, slug: &str, text: &str, count: u32) -> Feature {
    Feature::create(
        dir.path(),
        NewFeature {
            slug: Some(slug.to_string()),
            title: "Cart".to_string(),
            story: "As a shopper I want a cart".to_string(),
            declared_scenario_count: count,
            text: text.to_string(),
            ..Default::default()
        },
    )
    .unwrap()
}

fn seed_analyzed(dir: &TempDir, slug: &str) -> Feature {
    let mut f = seed_feature(dir, slug, CART, 2);
    let analysis = ComplexityAnalysis::from_model_output(&serde_json::json!({
        "overallComplexity": 3,
        "scenarios": [
            {"title": "Add item", "complexity": 2},
            {"title": "Remove item", "complexity": 3},
        ],
    }))
    .unwrap();
    f.set_analysis(analysis);
    f.save(dir.path()).unwrap();
    Feature::load(dir.path(), slug).unwrap()
}

async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, "GET", uri, None).await
}

async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, "POST", uri, Some(body)).await
}

async fn patch_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, "PATCH", uri, Some(body)).await
}

/// The `analysis:` block of the stored manifest, as written on disk.
fn analysis_section(dir: &TempDir, slug: &str) -> String {
    let manifest = std::fs::read_to_string(forge_core::paths::feature_manifest(dir.path(), slug))
        .unwrap();
    let mut lines = manifest.lines().skip_while(|l| !l.starts_with("analysis:"));
    let mut section = lines.next().expect("manifest has an analysis").to_string();
    for line in lines.take_while(|l| l.starts_with(' ')) {
        section.push('\n');
        section.push_str(line);
    }
    section
}

fn titles(analysis: &serde_json::Value) -> Vec<String> {
    analysis["scenarios"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["title"].as_str().unwrap().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Basics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_is_ok() {
    let dir = TempDir::new().unwrap();
    let app = forge_server::build_router_with(state(&dir, None, None));
    let (status, json) = get(app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn config_names_key_variable_but_never_a_key() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let app = forge_server::build_router_with(state(&dir, None, None));
    let (status, json) = get(app, "/api/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["project"]["name"], "test-project");
    assert_eq!(json["llm"]["api_key_env"], "ANTHROPIC_API_KEY");
    assert!(json["llm"].get("api_key").is_none());
    assert_eq!(json["llm_ready"], false);
}

#[tokio::test]
async fn config_before_init_is_400() {
    let dir = TempDir::new().unwrap();
    let app = forge_server::build_router_with(state(&dir, None, None));
    let (status, json) = get(app, "/api/config").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("forge init"));
}

#[tokio::test]
async fn unknown_feature_is_404() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let app = forge_server::build_router_with(state(&dir, None, None));
    let (status, _) = get(app, "/api/features/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_reports_summaries() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    seed_analyzed(&dir, "cart");
    seed_feature(&dir, "draft", "Feature: Draft\n", 1);

    let app = forge_server::build_router_with(state(&dir, None, None));
    let (status, json) = get(app, "/api/features").await;
    assert_eq!(status, StatusCode::OK);
    let list = json.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["slug"], "cart");
    assert_eq!(list[0]["scenario_count"], 2);
    assert_eq!(list[0]["overall_complexity"], 3.0);
    assert_eq!(list[0]["analysis_current"], true);
    assert_eq!(list[1]["slug"], "draft");
    assert!(list[1]["overall_complexity"].is_null());
    assert_eq!(list[1]["analysis_current"], false);
}

#[tokio::test]
async fn detail_includes_headings_and_alignment() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    seed_analyzed(&dir, "cart");

    let app = forge_server::build_router_with(state(&dir, None, None));
    let (status, json) = get(app, "/api/features/cart").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["scenario_titles"],
        serde_json::json!(["Add item", "Remove item"])
    );
    assert_eq!(json["analysis_current"], true);
    assert!(json["reanalysis_reason"].is_null());
    // Both keys are present on every scenario entry.
    assert_eq!(json["analysis"]["scenarios"][0]["name"], "Add item");
}

#[tokio::test]
async fn delete_removes_feature() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    seed_feature(&dir, "cart", CART, 2);

    let app = forge_server::build_router_with(state(&dir, None, None));
    let (status, json) = send(app.clone(), "DELETE", "/api/features/cart", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["deleted"], true);
    let (status, _) = get(app, "/api/features/cart").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_with_text_skips_generation_and_normalizes_analysis() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    // Scorer only knows one scenario under a different name.
    let scorer = FakeScorer::scoring(&["add an item"]);
    let st = state(&dir, Some(scorer.clone()), Some(FakeGenerator { fail: true }));
    let mut events = st.event_tx.subscribe();
    let app = forge_server::build_router_with(st);

    let (status, json) = post_json(
        app,
        "/api/features",
        serde_json::json!({
            "title": "Cart",
            "story": "As a shopper I want a cart",
            "scenario_count": 3,
            "text": CART,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(scorer.calls(), 1);
    assert_eq!(json["outcome"]["status"], "updated");
    assert_eq!(json["warnings"], serde_json::json!([]));

    let f = &json["feature"];
    assert_eq!(f["slug"], "cart");
    assert_eq!(f["text"], CART);
    let analysis = &f["analysis"];
    assert_eq!(titles(analysis), vec!["Add item", "Remove item", "Scenario 3"]);
    assert_eq!(analysis["scenarios"][0]["complexity"], 4.0);
    assert_eq!(analysis["scenarios"][1]["complexity"], "pending");
    assert_eq!(analysis["overallComplexity"], 6.0);

    assert_eq!(
        events.try_recv().unwrap(),
        ForgeEvent::FeatureCreated {
            slug: "cart".into()
        }
    );
}

#[tokio::test]
async fn create_without_text_uses_generator() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let scorer = FakeScorer::scoring(&["Generated 1", "Generated 2"]);
    let app = forge_server::build_router_with(state(
        &dir,
        Some(scorer),
        Some(FakeGenerator { fail: false }),
    ));

    let (status, json) = post_json(
        app,
        "/api/features",
        serde_json::json!({"title": "Checkout Flow", "story": "pay", "scenario_count": 2}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["feature"]["slug"], "checkout-flow");
    assert_eq!(
        json["feature"]["scenario_titles"],
        serde_json::json!(["Generated 1", "Generated 2"])
    );
    assert_eq!(json["feature"]["analysis_current"], true);
}

#[tokio::test]
async fn generation_failure_is_502_and_stores_nothing() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let scorer = FakeScorer::scoring(&[]);
    let app = forge_server::build_router_with(state(
        &dir,
        Some(scorer.clone()),
        Some(FakeGenerator { fail: true }),
    ));

    let (status, _) = post_json(
        app.clone(),
        "/api/features",
        serde_json::json!({"title": "Cart", "story": "s"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(scorer.calls(), 0);
    let (status, _) = get(app, "/api/features/cart").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn generation_without_llm_is_503() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let app = forge_server::build_router_with(state(&dir, None, None));
    let (status, _) = post_json(
        app,
        "/api/features",
        serde_json::json!({"title": "Cart", "story": "s"}),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn create_keeps_feature_when_scoring_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let app = forge_server::build_router_with(state(&dir, Some(FakeScorer::failing()), None));

    let (status, json) = post_json(
        app,
        "/api/features",
        serde_json::json!({"title": "Cart", "story": "s", "scenario_count": 2, "text": CART}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"]["status"], "failed");
    assert!(json["warnings"][0]
        .as_str()
        .unwrap()
        .contains("overloaded"));
    assert!(json["feature"]["analysis"].is_null());
    assert!(Feature::load(dir.path(), "cart").is_ok());
}

#[tokio::test]
async fn create_rejects_duplicates_and_bad_counts() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    seed_feature(&dir, "cart", CART, 2);
    let app = forge_server::build_router_with(state(&dir, None, None));

    let (status, _) = post_json(
        app.clone(),
        "/api/features",
        serde_json::json!({"title": "Cart", "story": "s", "text": CART}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = post_json(
        app,
        "/api/features",
        serde_json::json!({"title": "Other", "story": "s", "scenario_count": 0, "text": CART}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Edit and reanalysis
// ---------------------------------------------------------------------------

#[tokio::test]
async fn edit_failure_keeps_previous_analysis_verbatim() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let before = seed_analyzed(&dir, "cart");
    let section_before = analysis_section(&dir, "cart");
    let scorer = FakeScorer::failing();
    let app = forge_server::build_router_with(state(&dir, Some(scorer.clone()), None));

    let edited = format!("{CART}  Scenario: Empty cart\n");
    let (status, json) = patch_json(
        app,
        "/api/features/cart",
        serde_json::json!({"text": edited}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(scorer.calls(), 1);
    assert_eq!(json["outcome"]["status"], "failed");
    assert_eq!(json["warnings"].as_array().unwrap().len(), 1);

    let after = Feature::load(dir.path(), "cart").unwrap();
    assert_eq!(after.text, edited);
    assert_eq!(
        serde_json::to_value(&after.analysis).unwrap(),
        serde_json::to_value(&before.analysis).unwrap()
    );
    assert_eq!(after.analyzed_at, before.analyzed_at);
    assert_eq!(analysis_section(&dir, "cart"), section_before);
    assert_eq!(json["feature"]["stale_reason"], "content_edited");
    assert_eq!(json["feature"]["analysis_current"], false);
}

#[tokio::test]
async fn edit_success_reanalyzes_and_clears_stale_reason() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    seed_analyzed(&dir, "cart");
    let scorer = FakeScorer::scoring(&["Add item", "Remove item", "Empty cart"]);
    let app = forge_server::build_router_with(state(&dir, Some(scorer), None));

    let edited = format!("{CART}  Scenario: Empty cart\n");
    let (status, json) = patch_json(
        app,
        "/api/features/cart",
        serde_json::json!({"text": edited, "declared_scenario_count": 3}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"]["status"], "updated");
    assert_eq!(json["outcome"]["reason"]["kind"], "content_edited");
    assert!(json["feature"]["stale_reason"].is_null());
    assert_eq!(json["feature"]["analysis_current"], true);
    assert_eq!(
        titles(&json["feature"]["analysis"]),
        vec!["Add item", "Remove item", "Empty cart"]
    );
}

#[tokio::test]
async fn title_only_edit_does_not_call_scorer() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    seed_analyzed(&dir, "cart");
    let scorer = FakeScorer::scoring(&["x"]);
    let app = forge_server::build_router_with(state(&dir, Some(scorer.clone()), None));

    let (status, json) = patch_json(
        app,
        "/api/features/cart",
        serde_json::json!({"title": "Shopping cart"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"]["status"], "unchanged");
    assert_eq!(json["feature"]["title"], "Shopping cart");
    assert_eq!(scorer.calls(), 0);
}

#[tokio::test]
async fn edit_with_reanalysis_disabled_only_marks_stale() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let mut config = forge_core::config::Config::load(dir.path()).unwrap();
    config.analysis.reanalyze_on_edit = false;
    config.save(dir.path()).unwrap();
    seed_analyzed(&dir, "cart");
    let scorer = FakeScorer::scoring(&["x"]);
    let app = forge_server::build_router_with(state(&dir, Some(scorer.clone()), None));

    let (status, json) = patch_json(
        app.clone(),
        "/api/features/cart",
        serde_json::json!({"declared_scenario_count": 4}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["outcome"].is_null());
    assert_eq!(json["feature"]["stale_reason"], "scenario_count_changed");
    assert_eq!(scorer.calls(), 0);

    // The deferred signal is still honoured by a later analyze.
    let (status, json) = post_json(app, "/api/features/cart/analyze", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"]["reason"]["kind"], "scenario_count_changed");
    assert_eq!(scorer.calls(), 1);
    // Later runs align to the headings, not the declared count.
    assert_eq!(
        json["feature"]["analysis"]["scenarios"]
            .as_array()
            .unwrap()
            .len(),
        2
    );
    assert_eq!(json["feature"]["analysis_current"], true);
}

#[tokio::test]
async fn analyze_if_stale_skips_current_feature_and_force_does_not() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    seed_analyzed(&dir, "cart");
    let scorer = FakeScorer::scoring(&["Add item", "Remove item"]);
    let app = forge_server::build_router_with(state(&dir, Some(scorer.clone()), None));

    let (status, json) = send(app.clone(), "POST", "/api/features/cart/analyze", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"]["status"], "unchanged");
    assert_eq!(scorer.calls(), 0);

    let (status, json) = post_json(
        app,
        "/api/features/cart/analyze",
        serde_json::json!({"force": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"]["status"], "updated");
    assert_eq!(scorer.calls(), 1);
    assert_eq!(json["feature"]["analysis"]["overallComplexity"], 6.0);
}

#[tokio::test]
async fn short_text_with_larger_declared_count_settles_after_one_run() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    seed_feature(&dir, "cart", CART, 4);
    let scorer = FakeScorer::scoring(&["Add item", "Remove item"]);
    let app = forge_server::build_router_with(state(&dir, Some(scorer.clone()), None));

    let (status, json) = post_json(
        app.clone(),
        "/api/features/cart/analyze",
        serde_json::json!({"force": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["outcome"]["status"], "updated");
    assert_eq!(titles(&json["feature"]["analysis"]), vec!["Add item", "Remove item"]);
    assert_eq!(json["feature"]["analysis_current"], true);
    assert_eq!(scorer.calls(), 1);

    let (status, json) = patch_json(
        app.clone(),
        "/api/features/cart",
        serde_json::json!({"title": "Shopping cart"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"]["status"], "unchanged");

    for _ in 0..2 {
        let (status, json) = send(app.clone(), "POST", "/api/features/cart/analyze", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["outcome"]["status"], "unchanged");
    }
    assert_eq!(scorer.calls(), 1);
}

#[tokio::test]
async fn padding_from_create_is_replaced_once_then_settles() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let scorer = FakeScorer::scoring(&["Add item", "Remove item"]);
    let app = forge_server::build_router_with(state(&dir, Some(scorer.clone()), None));

    let (status, json) = post_json(
        app.clone(),
        "/api/features",
        serde_json::json!({"title": "Cart", "story": "s", "scenario_count": 4, "text": CART}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(
        titles(&json["feature"]["analysis"]),
        vec!["Add item", "Remove item", "Scenario 3", "Scenario 4"]
    );
    assert_eq!(scorer.calls(), 1);

    let (_, json) = send(app.clone(), "POST", "/api/features/cart/analyze", None).await;
    assert_eq!(json["outcome"]["status"], "updated");
    assert_eq!(json["feature"]["analysis_current"], true);
    assert_eq!(scorer.calls(), 2);

    let (_, json) = send(app, "POST", "/api/features/cart/analyze", None).await;
    assert_eq!(json["outcome"]["status"], "unchanged");
    assert_eq!(scorer.calls(), 2);
}

#[tokio::test]
async fn analyze_without_llm_warns_and_keeps_analysis() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let before = seed_analyzed(&dir, "cart");
    let app = forge_server::build_router_with(state(&dir, None, None));

    let (status, json) = post_json(
        app,
        "/api/features/cart/analyze",
        serde_json::json!({"force": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"]["status"], "failed");
    let after = Feature::load(dir.path(), "cart").unwrap();
    assert_eq!(after.analyzed_at, before.analyzed_at);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_analyze_for_same_feature_is_409() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    seed_feature(&dir, "cart", CART, 2);
    seed_feature(&dir, "other", CART, 2);
    let scorer = FakeScorer::held(&["Add item", "Remove item"]);
    let app = forge_server::build_router_with(state(&dir, Some(scorer.clone()), None));

    let first = tokio::spawn(post_json(
        app.clone(),
        "/api/features/cart/analyze",
        serde_json::json!({"force": true}),
    ));
    scorer.started.notified().await;

    let (status, json) = post_json(
        app.clone(),
        "/api/features/cart/analyze",
        serde_json::json!({"force": true}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("cart"));

    // Another feature is not blocked.
    let (status, json) = post_json(
        app.clone(),
        "/api/features/other/analyze",
        serde_json::json!({"force": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"]["status"], "updated");

    scorer.release.notify_one();
    let (status, json) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"]["status"], "updated");

    // Marker released: a new run is accepted.
    let (status, _) = post_json(
        app,
        "/api/features/cart/analyze",
        serde_json::json!({"force": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scorer.calls(), 3);
}

#[tokio::test]
async fn result_for_edited_text_is_discarded() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    seed_feature(&dir, "cart", CART, 2);
    let scorer = FakeScorer::held(&["Add item", "Remove item"]);
    let app = forge_server::build_router_with(state(&dir, Some(scorer.clone()), None));

    let first = tokio::spawn(post_json(
        app.clone(),
        "/api/features/cart/analyze",
        serde_json::json!({"force": true}),
    ));
    scorer.started.notified().await;

    // The edit is saved; its own reanalysis is deferred because one is in flight.
    let edited = "Feature: Cart\n  Scenario: Checkout\n";
    let (status, json) = patch_json(
        app.clone(),
        "/api/features/cart",
        serde_json::json!({"text": edited}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["outcome"].is_null());
    assert_eq!(json["warnings"].as_array().unwrap().len(), 1);

    scorer.release.notify_one();
    let (status, json) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"]["status"], "superseded");

    let stored = Feature::load(dir.path(), "cart").unwrap();
    assert_eq!(stored.text, edited);
    assert!(stored.analysis.is_none());
    assert_eq!(
        stored.stale_reason,
        Some(forge_core::feature::StaleReason::ContentEdited)
    );
}
