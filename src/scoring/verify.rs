//! Answer verification: option check plus keyword-overlap scoring of the
//! learner's justification.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::keywords::{generate_keywords, normalize_keyword};
use crate::types::Question;

/// Keyword set used when a question has none stored
pub const FALLBACK_KEYWORD: &str = "concept";

pub const MISSING_JUSTIFICATION: &str = "Official justification is missing from the database.";

/// Points available per answer under every policy
pub const MAX_POINTS_PER_ANSWER: f64 = 2.0;

const MSG_INCORRECT: &str = "Answer is incorrect.";
const MSG_RELEVANT: &str = "Answer is correct and justification is highly relevant!";
const MSG_MISSING_KEYWORDS: &str = "Answer is correct, but the justification misses required keywords.";

/// How correctness and keyword overlap turn into points
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPolicy {
    /// 1 point for the right option, +1 once at least half the keywords match
    #[default]
    Tiered,
    /// Like `Tiered`, but a partial match earns `matched / required`
    Partial,
    /// Flat 2.0 for a right option, -0.5 for a wrong one
    Flat,
}

/// What the learner submitted as their justification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Justification {
    /// Pre-extracted keyword list
    Keywords(Vec<String>),
    /// Free text
    Text(String),
}

impl Default for Justification {
    fn default() -> Self {
        Justification::Text(String::new())
    }
}

impl Justification {
    /// Normalized keywords of the justification
    pub fn keywords(&self) -> Vec<String> {
        match self {
            Justification::Keywords(list) => list.iter().map(|k| normalize_keyword(k)).collect(),
            Justification::Text(text) => generate_keywords(text),
        }
    }

    /// Free text, or the keyword list joined by spaces
    pub fn as_text(&self) -> String {
        match self {
            Justification::Keywords(list) => list.join(" "),
            Justification::Text(text) => text.clone(),
        }
    }
}

/// Result of checking one answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub is_correct: bool,
    pub justification_score: f64,
    pub total_score: f64,
    pub message: String,
    pub matched_keywords: Vec<String>,
    pub required_keywords: Vec<String>,
    pub official_justification: String,
}

impl Verification {
    /// Whether the justification earned its full point
    pub fn is_justification_relevant(&self) -> bool {
        self.justification_score >= 1.0
    }
}

/// Required keywords for a question, normalized, with the fallback applied
pub fn required_keywords(question: &Question) -> Vec<String> {
    let normalized: Vec<String> = question
        .keywords
        .iter()
        .map(|k| normalize_keyword(k))
        .filter(|k| !k.is_empty())
        .collect();

    if normalized.is_empty() {
        vec![FALLBACK_KEYWORD.to_string()]
    } else {
        normalized
    }
}

/// Keywords from `submitted` that appear in `required`, deduplicated, in
/// submission order
pub fn match_keywords(submitted: &[String], required: &[String]) -> Vec<String> {
    let required: HashSet<&str> = required.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    submitted
        .iter()
        .filter(|k| required.contains(k.as_str()))
        .filter(|k| seen.insert(k.as_str()))
        .cloned()
        .collect()
}

/// Minimum matches for full justification credit: half, rounded up
pub fn min_keywords_required(required: usize) -> usize {
    required.div_ceil(2)
}

/// Check a selected option and score the justification
pub fn verify_answer(
    question: &Question,
    selected_option: &str,
    justification: &Justification,
    policy: ScoringPolicy,
) -> Verification {
    let is_correct = question.correct_option == selected_option;
    let required = required_keywords(question);
    let matched = match_keywords(&justification.keywords(), &required);

    let (justification_score, total_score, message) = score(is_correct, matched.len(), required.len(), policy);

    let official_justification = question
        .justification_text
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(MISSING_JUSTIFICATION)
        .to_string();

    let required_keywords = if question.keywords.iter().any(|k| !k.trim().is_empty()) {
        question.keywords.clone()
    } else {
        required
    };

    Verification {
        is_correct,
        justification_score,
        total_score,
        message,
        matched_keywords: matched,
        required_keywords,
        official_justification,
    }
}

fn score(is_correct: bool, matched: usize, required: usize, policy: ScoringPolicy) -> (f64, f64, String) {
    if !is_correct {
        let total = match policy {
            ScoringPolicy::Flat => -0.5,
            ScoringPolicy::Tiered | ScoringPolicy::Partial => 0.0,
        };
        return (0.0, total, MSG_INCORRECT.to_string());
    }

    let base = match policy {
        ScoringPolicy::Flat => MAX_POINTS_PER_ANSWER,
        ScoringPolicy::Tiered | ScoringPolicy::Partial => 1.0,
    };

    if matched >= min_keywords_required(required) {
        return (1.0, MAX_POINTS_PER_ANSWER, MSG_RELEVANT.to_string());
    }

    if matched > 0 {
        let partial = match policy {
            ScoringPolicy::Partial => matched as f64 / required as f64,
            ScoringPolicy::Tiered | ScoringPolicy::Flat => 0.0,
        };
        let total = if policy == ScoringPolicy::Flat { base } else { base + partial };
        let message = format!(
            "Answer is correct, but only some relevant keywords were mentioned ({}/{}).",
            matched, required
        );
        return (partial, total, message);
    }

    (0.0, base, MSG_MISSING_KEYWORDS.to_string())
}
