use crate::error::{ForgeError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 10.0;

pub const PENDING_EXPLANATION: &str = "Analysis pending for this scenario.";

// ---------------------------------------------------------------------------
// Complexity
// ---------------------------------------------------------------------------

/// A per-scenario complexity score, or the marker for a scenario that has
/// not been scored yet.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Complexity {
    Scored(f64),
    #[default]
    Pending,
}

impl Complexity {
    pub fn score(self) -> Option<f64> {
        match self {
            Complexity::Scored(s) => Some(s),
            Complexity::Pending => None,
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Complexity::Pending)
    }
}

impl Serialize for Complexity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Complexity::Scored(s) => serializer.serialize_f64(*s),
            Complexity::Pending => serializer.serialize_str("pending"),
        }
    }
}

impl<'de> Deserialize<'de> for Complexity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Complexity::Scored(clamp_score(n)),
            Repr::Text(t) => match t.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => Complexity::Scored(clamp_score(n)),
                _ => Complexity::Pending,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// ComplexityFactors
// ---------------------------------------------------------------------------

/// Factor sub-scores behind a scenario's complexity. Expected 0–10 but
/// taken as given.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComplexityFactors {
    pub step_count: f64,
    pub data_complexity: f64,
    pub integration_points: f64,
    pub ui_interactions: f64,
}

// ---------------------------------------------------------------------------
// ScenarioAnalysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ScenarioWire", from = "ScenarioWire")]
pub struct ScenarioAnalysis {
    pub title: String,
    pub complexity: Complexity,
    pub factors: ComplexityFactors,
    pub explanation: String,
}

impl ScenarioAnalysis {
    /// An unscored entry reserving a slot for `title`.
    pub fn pending(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            complexity: Complexity::Pending,
            factors: ComplexityFactors::default(),
            explanation: PENDING_EXPLANATION.to_string(),
        }
    }

    fn from_model_output(value: &Value) -> Self {
        let empty = Map::new();
        let obj = value.as_object().unwrap_or(&empty);

        let title = obj
            .get("title")
            .and_then(Value::as_str)
            .or_else(|| obj.get("name").and_then(Value::as_str))
            .unwrap_or("")
            .trim()
            .to_string();

        let factors = obj
            .get("factors")
            .and_then(Value::as_object)
            .map(|f| ComplexityFactors {
                step_count: factor(f, "stepCount", "step_count"),
                data_complexity: factor(f, "dataComplexity", "data_complexity"),
                integration_points: factor(f, "integrationPoints", "integration_points"),
                ui_interactions: factor(f, "uiInteractions", "ui_interactions"),
            })
            .unwrap_or_default();

        Self {
            title,
            complexity: Complexity::Scored(score_or_default(obj.get("complexity"))),
            factors,
            explanation: obj
                .get("explanation")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
        }
    }
}

/// Storage and wire shape of a scenario entry. Older consumers read `name`,
/// newer ones `title`; both are written and either is accepted.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    complexity: Complexity,
    #[serde(default)]
    factors: ComplexityFactors,
    #[serde(default)]
    explanation: String,
}

impl From<ScenarioAnalysis> for ScenarioWire {
    fn from(s: ScenarioAnalysis) -> Self {
        Self {
            name: Some(s.title.clone()),
            title: Some(s.title),
            complexity: s.complexity,
            factors: s.factors,
            explanation: s.explanation,
        }
    }
}

impl From<ScenarioWire> for ScenarioAnalysis {
    fn from(w: ScenarioWire) -> Self {
        Self {
            title: w.title.or(w.name).unwrap_or_default(),
            complexity: w.complexity,
            factors: w.factors,
            explanation: w.explanation,
        }
    }
}

// ---------------------------------------------------------------------------
// ComplexityAnalysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityAnalysis {
    pub overall_complexity: f64,
    #[serde(default)]
    pub scenarios: Vec<ScenarioAnalysis>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl ComplexityAnalysis {
    /// Build an analysis from the JSON object a scoring model returned.
    ///
    /// Only a non-object top level is rejected. Everything below it is
    /// repaired: scores default to 1 and are clamped to [1, 10], factor
    /// sub-scores default to 0, unusable entries are dropped or blanked.
    pub fn from_model_output(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            ForgeError::MalformedAnalysis(format!(
                "expected a JSON object, got {}",
                json_kind(value)
            ))
        })?;

        let overall = obj
            .get("overallComplexity")
            .or_else(|| obj.get("overall_complexity"));

        let scenarios = obj
            .get("scenarios")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(ScenarioAnalysis::from_model_output).collect())
            .unwrap_or_default();

        let recommendations = obj
            .get("recommendations")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            overall_complexity: score_or_default(overall),
            scenarios,
            recommendations,
        })
    }

    /// Stored scenario titles, trimmed, in order.
    pub fn scenario_titles(&self) -> impl Iterator<Item = &str> {
        self.scenarios.iter().map(|s| s.title.trim())
    }

    pub fn pending_count(&self) -> usize {
        self.scenarios
            .iter()
            .filter(|s| s.complexity.is_pending())
            .count()
    }
}

// ---------------------------------------------------------------------------
// Score repair
// ---------------------------------------------------------------------------

pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return MIN_SCORE;
    }
    score.clamp(MIN_SCORE, MAX_SCORE)
}

fn score_or_default(value: Option<&Value>) -> f64 {
    clamp_score(value.and_then(numeric).unwrap_or(MIN_SCORE))
}

fn factor(obj: &Map<String, Value>, key: &str, alt: &str) -> f64 {
    obj.get(key)
        .or_else(|| obj.get(alt))
        .and_then(numeric)
        .unwrap_or(0.0)
}

fn numeric(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
