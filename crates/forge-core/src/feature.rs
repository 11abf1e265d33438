use crate::analysis::ComplexityAnalysis;
use crate::error::{ForgeError, Result};
use crate::gherkin;
use crate::paths;
use crate::reconcile::{self, ReanalysisHints, ReanalysisReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MAX_SCENARIO_COUNT: u32 = 50;

// ---------------------------------------------------------------------------
// StaleReason
// ---------------------------------------------------------------------------

/// Persisted record of the edit that made the stored analysis untrustworthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    ContentEdited,
    ScenarioCountChanged,
}

impl StaleReason {
    pub fn from_hints(hints: ReanalysisHints) -> Option<Self> {
        if hints.content_edited {
            Some(StaleReason::ContentEdited)
        } else if hints.scenario_count_changed {
            Some(StaleReason::ScenarioCountChanged)
        } else {
            None
        }
    }

    pub fn hints(self) -> ReanalysisHints {
        ReanalysisHints {
            content_edited: self == StaleReason::ContentEdited,
            scenario_count_changed: self == StaleReason::ScenarioCountChanged,
        }
    }
}

// ---------------------------------------------------------------------------
// NewFeature / FeatureEdit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct NewFeature {
    /// Derived from `title` when absent.
    pub slug: Option<String>,
    pub title: String,
    pub story: String,
    pub domain: Option<String>,
    pub declared_scenario_count: u32,
    pub text: String,
}

/// A partial update. `None` leaves the field as it is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureEdit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub story: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub declared_scenario_count: Option<u32>,
}

// ---------------------------------------------------------------------------
// Feature
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub slug: String,
    pub title: String,
    pub story: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub declared_scenario_count: u32,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ComplexityAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_reason: Option<StaleReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl Feature {
    pub fn new(
        slug: impl Into<String>,
        title: impl Into<String>,
        story: impl Into<String>,
        declared_scenario_count: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            slug: slug.into(),
            title: title.into(),
            story: story.into(),
            domain: None,
            declared_scenario_count,
            text: String::new(),
            analysis: None,
            stale_reason: None,
            created_at: now,
            updated_at: now,
            analyzed_at: None,
        }
    }

    // ---------------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------------

    pub fn create(root: &Path, new: NewFeature) -> Result<Self> {
        let slug = match new.slug {
            Some(slug) => slug,
            None => paths::slugify(&new.title)
                .ok_or_else(|| ForgeError::InvalidSlug(new.title.clone()))?,
        };
        paths::validate_slug(&slug)?;
        validate_scenario_count(new.declared_scenario_count)?;

        if paths::feature_dir(root, &slug).exists() {
            return Err(ForgeError::FeatureExists(slug));
        }

        let mut feature = Self::new(slug, new.title, new.story, new.declared_scenario_count);
        feature.domain = new.domain;
        feature.text = new.text;
        feature.save(root)?;
        Ok(feature)
    }

    pub fn load(root: &Path, slug: &str) -> Result<Self> {
        paths::validate_slug(slug)?;
        let manifest = paths::feature_manifest(root, slug);
        if !manifest.exists() {
            return Err(ForgeError::FeatureNotFound(slug.to_string()));
        }
        let data = std::fs::read_to_string(&manifest)?;
        let feature: Feature = serde_yaml::from_str(&data)?;
        Ok(feature)
    }

    /// Text, count and analysis live in one manifest, so a single atomic
    /// write keeps them consistent.
    pub fn save(&self, root: &Path) -> Result<()> {
        let manifest = paths::feature_manifest(root, &self.slug);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&manifest, data.as_bytes())
    }

    pub fn list(root: &Path) -> Result<Vec<Self>> {
        let features_dir = paths::features_dir(root);
        if !features_dir.exists() {
            return Ok(Vec::new());
        }

        let mut features = Vec::new();
        for entry in std::fs::read_dir(&features_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                let slug = entry.file_name().to_string_lossy().into_owned();
                match Self::load(root, &slug) {
                    Ok(f) => features.push(f),
                    Err(ForgeError::FeatureNotFound(_)) | Err(ForgeError::InvalidSlug(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        features.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(features)
    }

    pub fn delete(root: &Path, slug: &str) -> Result<()> {
        paths::validate_slug(slug)?;
        let dir = paths::feature_dir(root, slug);
        if !paths::feature_manifest(root, slug).exists() {
            return Err(ForgeError::FeatureNotFound(slug.to_string()));
        }
        std::fs::remove_dir_all(dir)?;
        Ok(())
    }

    // ---------------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------------

    /// Apply a partial update and report which reanalysis signals it raised.
    ///
    /// Setting a field to the value it already has is not a change. Raised
    /// signals are folded into `stale_reason` so a deferred reanalysis
    /// still sees them.
    pub fn apply_edit(&mut self, edit: FeatureEdit) -> Result<ReanalysisHints> {
        if let Some(count) = edit.declared_scenario_count {
            validate_scenario_count(count)?;
        }

        let mut hints = ReanalysisHints::none();
        let mut touched = false;

        if let Some(title) = edit.title {
            touched |= title != self.title;
            self.title = title;
        }
        if let Some(story) = edit.story {
            touched |= story != self.story;
            self.story = story;
        }
        if let Some(domain) = edit.domain {
            let domain = Some(domain).filter(|d| !d.trim().is_empty());
            touched |= domain != self.domain;
            self.domain = domain;
        }
        if let Some(text) = edit.text {
            if text != self.text {
                hints.content_edited = true;
                self.text = text;
            }
        }
        if let Some(count) = edit.declared_scenario_count {
            if count != self.declared_scenario_count {
                hints.scenario_count_changed = true;
                self.declared_scenario_count = count;
            }
        }

        if hints.any() {
            self.mark_stale(hints);
        }
        if touched || hints.any() {
            self.updated_at = Utc::now();
        }
        Ok(hints)
    }

    fn mark_stale(&mut self, hints: ReanalysisHints) {
        let merged = self
            .stale_reason
            .map(StaleReason::hints)
            .unwrap_or_default()
            .merge(hints);
        self.stale_reason = StaleReason::from_hints(merged);
    }

    /// Store an analysis that was already normalized against `self.text`.
    pub fn set_analysis(&mut self, analysis: ComplexityAnalysis) {
        let now = Utc::now();
        self.analysis = Some(analysis);
        self.stale_reason = None;
        self.analyzed_at = Some(now);
        self.updated_at = now;
    }

    // ---------------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------------

    pub fn scenario_titles(&self) -> Vec<String> {
        gherkin::scenario_titles(Some(&self.text))
    }

    /// Hints carried over from edits that have not been reanalyzed yet.
    pub fn pending_hints(&self) -> ReanalysisHints {
        self.stale_reason.map(StaleReason::hints).unwrap_or_default()
    }

    /// Why the stored analysis must be recomputed, if it must.
    pub fn reanalysis_reason(&self) -> Option<ReanalysisReason> {
        reconcile::reanalysis_reason(Some(&self.text), self.analysis.as_ref(), self.pending_hints())
    }

    /// Whether the stored analysis can be shown as describing the current text.
    pub fn analysis_current(&self) -> bool {
        self.analysis.is_some()
            && self.stale_reason.is_none()
            && reconcile::is_aligned(Some(&self.text), self.analysis.as_ref())
    }
}

pub fn validate_scenario_count(count: u32) -> Result<()> {
    if count == 0 || count > MAX_SCENARIO_COUNT {
        return Err(ForgeError::InvalidScenarioCount(count));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
