//! Scenario heading extraction from Gherkin text.
//!
//! Matching is line-oriented: a line is a heading only when, after its
//! indentation, it begins with one of [`SCENARIO_KEYWORDS`]. The keyword
//! appearing anywhere else on a line (inside a quoted step argument, a
//! comment, a doc string) never counts.

/// Heading keywords, longest first so `Scenario Outline:` is never read as a
/// plain scenario.
pub const SCENARIO_KEYWORDS: [&str; 2] = ["Scenario Outline:", "Scenario:"];

/// Ordered scenario titles found in `text`. `None` behaves like empty text.
pub fn scenario_titles(text: Option<&str>) -> Vec<String> {
    let Some(text) = text else {
        return Vec::new();
    };
    text.lines().filter_map(heading_title).map(str::to_string).collect()
}

/// Number of scenario headings in `text`.
pub fn scenario_count(text: Option<&str>) -> usize {
    text.map(|t| t.lines().filter_map(heading_title).count())
        .unwrap_or(0)
}

/// The title of a heading line, or `None` if the line is not a heading.
/// A keyword followed by nothing but whitespace names no scenario.
fn heading_title(line: &str) -> Option<&str> {
    let content = line.trim_start();
    SCENARIO_KEYWORDS
        .iter()
        .find_map(|kw| content.strip_prefix(kw))
        .map(str::trim)
        .filter(|title| !title.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
