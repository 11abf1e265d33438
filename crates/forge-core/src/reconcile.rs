//! Keeps a feature's complexity analysis consistent with its Gherkin text.
//!
//! The invariant: `analysis.scenarios` has the same length and title order
//! as the scenario headings in the text. [`reanalysis_reason`] decides
//! whether a stored analysis can still be trusted; [`normalize_analysis_to_text`]
//! shapes a freshly scored analysis so the invariant holds before it is
//! stored. Both are pure and total.

use crate::analysis::{ComplexityAnalysis, ScenarioAnalysis};
use crate::gherkin;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ReanalysisHints
// ---------------------------------------------------------------------------

/// Signals from the caller about what just changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReanalysisHints {
    /// The text was overwritten by a person rather than by generation.
    pub content_edited: bool,
    /// The declared scenario count was changed.
    pub scenario_count_changed: bool,
}

impl ReanalysisHints {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn any(self) -> bool {
        self.content_edited || self.scenario_count_changed
    }

    pub fn merge(self, other: ReanalysisHints) -> Self {
        Self {
            content_edited: self.content_edited || other.content_edited,
            scenario_count_changed: self.scenario_count_changed || other.scenario_count_changed,
        }
    }
}

// ---------------------------------------------------------------------------
// ReanalysisReason
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReanalysisReason {
    ContentEdited,
    ScenarioCountChanged,
    /// No stored analysis, but the text has headings.
    NoAnalysis,
    /// `expected` headings in the text, `found` entries in the analysis.
    LengthMismatch { expected: usize, found: usize },
    /// First position whose stored title differs from the heading.
    TitleMismatch { index: usize },
}

impl fmt::Display for ReanalysisReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReanalysisReason::ContentEdited => f.write_str("content was edited"),
            ReanalysisReason::ScenarioCountChanged => {
                f.write_str("declared scenario count changed")
            }
            ReanalysisReason::NoAnalysis => f.write_str("feature has not been analyzed"),
            ReanalysisReason::LengthMismatch { expected, found } => write!(
                f,
                "text has {expected} scenarios but analysis has {found}"
            ),
            ReanalysisReason::TitleMismatch { index } => {
                write!(f, "scenario {} title differs from analysis", index + 1)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Why `existing` must be recomputed for `text`, or `None` if it is current.
///
/// Manual edits and count changes win unconditionally, even when the
/// headings still line up. Otherwise the stored titles are compared with
/// the text's headings by length, then position by position.
pub fn reanalysis_reason(
    text: Option<&str>,
    existing: Option<&ComplexityAnalysis>,
    hints: ReanalysisHints,
) -> Option<ReanalysisReason> {
    if hints.content_edited {
        return Some(ReanalysisReason::ContentEdited);
    }
    if hints.scenario_count_changed {
        return Some(ReanalysisReason::ScenarioCountChanged);
    }
    title_divergence(text, existing)
}

pub fn needs_reanalysis(
    text: Option<&str>,
    existing: Option<&ComplexityAnalysis>,
    hints: ReanalysisHints,
) -> bool {
    reanalysis_reason(text, existing, hints).is_some()
}

/// True when the analysis' scenario titles match the text's headings
/// exactly, in length and order. An absent analysis is aligned only with
/// text that has no headings.
pub fn is_aligned(text: Option<&str>, analysis: Option<&ComplexityAnalysis>) -> bool {
    title_divergence(text, analysis).is_none()
}

fn title_divergence(
    text: Option<&str>,
    existing: Option<&ComplexityAnalysis>,
) -> Option<ReanalysisReason> {
    let headings = gherkin::scenario_titles(text);
    let stored: Vec<&str> = existing
        .map(|a| a.scenario_titles().collect())
        .unwrap_or_default();

    if headings.len() != stored.len() {
        if existing.is_none() {
            return Some(ReanalysisReason::NoAnalysis);
        }
        return Some(ReanalysisReason::LengthMismatch {
            expected: headings.len(),
            found: stored.len(),
        });
    }

    headings
        .iter()
        .zip(&stored)
        .position(|(heading, title)| heading.as_str() != *title)
        .map(|index| ReanalysisReason::TitleMismatch { index })
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Align a freshly computed analysis with the headings in `text`.
///
/// The result has `max(headings, desired_len_hint)` scenario entries.
/// Missing entries become pending placeholders, surplus entries are
/// dropped, and every entry with a heading at its index takes that
/// heading as its title. Placeholders past the last heading are titled
/// `Scenario {n}`. Top-level fields pass through unchanged.
pub fn normalize_analysis_to_text(
    analysis: ComplexityAnalysis,
    text: Option<&str>,
    desired_len_hint: Option<usize>,
) -> ComplexityAnalysis {
    let headings = gherkin::scenario_titles(text);
    let desired_len = headings.len().max(desired_len_hint.unwrap_or(0));

    let ComplexityAnalysis {
        overall_complexity,
        mut scenarios,
        recommendations,
    } = analysis;

    scenarios.truncate(desired_len);
    for index in scenarios.len()..desired_len {
        let title = headings
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("Scenario {}", index + 1));
        scenarios.push(ScenarioAnalysis::pending(title));
    }

    for (scenario, heading) in scenarios.iter_mut().zip(&headings) {
        if scenario.title != *heading {
            scenario.title = heading.clone();
        }
    }

    ComplexityAnalysis {
        overall_complexity,
        scenarios,
        recommendations,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
