use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use claude_api::{ClaudeClient, ClaudeGenerator, ClaudeScorer, ComplexityScorer, FeatureGenerator};
use serde::Serialize;
use tokio::sync::broadcast;

/// Change notifications fanned out to `/api/events` subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForgeEvent {
    FeatureCreated { slug: String },
    FeatureUpdated { slug: String },
    FeatureDeleted { slug: String },
    AnalysisStarted { slug: String },
    AnalysisFinished { slug: String, status: String },
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub event_tx: broadcast::Sender<ForgeEvent>,
    /// `None` when no API key is configured; analysis then degrades to a
    /// warning and generation to 503.
    pub scorer: Option<Arc<dyn ComplexityScorer>>,
    pub generator: Option<Arc<dyn FeatureGenerator>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    /// Serializes read-modify-write cycles on feature manifests.
    write_lock: Arc<Mutex<()>>,
}

impl AppState {
    /// State with Claude-backed collaborators built from `.forge/config.yaml`.
    pub fn new(root: PathBuf) -> Self {
        let (scorer, generator) = match claude_collaborators(&root) {
            Ok((s, g)) => (Some(s), Some(g)),
            Err(e) => {
                tracing::warn!(error = %e, "LLM unavailable; generation and analysis are disabled");
                (None, None)
            }
        };
        Self::with_collaborators(root, scorer, generator)
    }

    pub fn with_collaborators(
        root: PathBuf,
        scorer: Option<Arc<dyn ComplexityScorer>>,
        generator: Option<Arc<dyn FeatureGenerator>>,
    ) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            root,
            event_tx: tx,
            scorer,
            generator,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Best-effort broadcast; having no subscribers is fine.
    pub fn emit(&self, event: ForgeEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Mark `slug` as having an analysis in flight. Returns `None` when one
    /// is already running; the marker is cleared when the guard drops.
    pub fn begin_analysis(&self, slug: &str) -> Option<InFlightGuard> {
        let mut set = lock(&self.in_flight);
        if !set.insert(slug.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            slug: slug.to_string(),
        })
    }

    pub fn analysis_in_flight(&self, slug: &str) -> bool {
        lock(&self.in_flight).contains(slug)
    }

    /// Hold while loading, mutating and saving a feature. Blocking; call from
    /// `spawn_blocking`.
    pub fn write_lock(&self) -> MutexGuard<'_, ()> {
        lock(&self.write_lock)
    }
}

fn claude_collaborators(
    root: &std::path::Path,
) -> anyhow::Result<(Arc<dyn ComplexityScorer>, Arc<dyn FeatureGenerator>)> {
    let config = forge_core::config::Config::load(root)?;
    let client = ClaudeClient::from_config(&config.llm)?;
    tracing::info!(model = %client.model(), "LLM collaborators ready");
    Ok((
        Arc::new(ClaudeScorer::new(client.clone())),
        Arc::new(ClaudeGenerator::new(client)),
    ))
}

// A panic while holding one of these locks leaves plain data behind, so
// recover the guard instead of propagating the poison.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// RAII marker for one in-flight analysis.
pub struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    slug: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.set).remove(&self.slug);
    }
}
