//! Common types used across modules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A multiple-choice quiz question.
///
/// Field names on the wire match the question documents the frontend was
/// written against (`_id`, `Question`, `Option1`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "Question")]
    pub question: String,
    #[serde(rename = "Option1")]
    pub option1: String,
    #[serde(rename = "Option2")]
    pub option2: String,
    #[serde(rename = "Option3")]
    pub option3: String,
    #[serde(rename = "Option4")]
    pub option4: String,
    /// Key of the correct option, e.g. `"Option3"`
    #[serde(rename = "Correct_Option")]
    pub correct_option: String,
    #[serde(rename = "DifficultyLevel", default, skip_serializing_if = "Option::is_none")]
    pub difficulty_level: Option<String>,
    #[serde(rename = "Justification_Text", default, skip_serializing_if = "Option::is_none")]
    pub justification_text: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Question {
    /// Text of the option referenced by `key` (`"Option1"`..`"Option4"`)
    pub fn option_text(&self, key: &str) -> Option<&str> {
        match key {
            "Option1" => Some(&self.option1),
            "Option2" => Some(&self.option2),
            "Option3" => Some(&self.option3),
            "Option4" => Some(&self.option4),
            _ => None,
        }
    }

    /// Whether the generated content (justification + keywords) is missing
    pub fn needs_content(&self) -> bool {
        self.justification_text.as_deref().map(str::trim).unwrap_or("").is_empty()
            || self.keywords.is_empty()
    }
}

/// Difficulty / learning level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
    #[serde(rename = "Expert/New Domain")]
    Expert,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Beginner => "Beginner",
            Level::Intermediate => "Intermediate",
            Level::Advanced => "Advanced",
            Level::Expert => "Expert/New Domain",
        }
    }

    /// Parse a stored difficulty label, case-insensitively
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "beginner" => Some(Level::Beginner),
            "intermediate" => Some(Level::Intermediate),
            "advanced" => Some(Level::Advanced),
            "expert" | "expert/new domain" => Some(Level::Expert),
            _ => None,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered account
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub reset_token: Option<String>,
    pub reset_token_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One learning resource attached to a course recommendation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourseLink {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendedCourse {
    pub name: String,
    pub description: String,
    pub links: Vec<CourseLink>,
}

/// One answered question inside a saved quiz
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    #[serde(rename = "qId")]
    pub q_id: String,
    #[serde(rename = "Question", default)]
    pub question: Option<String>,
    #[serde(default)]
    pub selected: String,
    #[serde(default)]
    pub selected_justification: String,
    pub correct: bool,
    #[serde(default)]
    pub is_justification_relevant: bool,
    pub total_score: f64,
    #[serde(default)]
    pub official_justification: Option<String>,
    #[serde(default)]
    pub official_keywords: Vec<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

/// A finished quiz stored in a user's history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    #[serde(skip)]
    pub id: String,
    pub quiz_date: DateTime<Utc>,
    pub total_score: f64,
    pub total_possible_score: f64,
    pub score_percentage: f64,
    pub recommended_level: Level,
    pub recommended_course: RecommendedCourse,
    pub answers: Vec<AnswerRecord>,
}

/// Chat turn forwarded to the tutor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_uses_document_field_names() {
        let json = serde_json::json!({
            "_id": "q1",
            "Question": "What does len() return?",
            "Option1": "a", "Option2": "b", "Option3": "c", "Option4": "d",
            "Correct_Option": "Option2",
            "DifficultyLevel": "Beginner"
        });
        let q: Question = serde_json::from_value(json).unwrap();
        assert_eq!(q.id, "q1");
        assert_eq!(q.correct_option, "Option2");
        assert!(q.keywords.is_empty());
        assert!(q.needs_content());
        assert_eq!(q.option_text("Option2"), Some("b"));
        assert_eq!(q.option_text("Option9"), None);

        let back = serde_json::to_value(&q).unwrap();
        assert_eq!(back["Correct_Option"], "Option2");
        assert!(back.get("Justification_Text").is_none());
    }

    #[test]
    fn level_labels() {
        assert_eq!(Level::parse("advanced"), Some(Level::Advanced));
        assert_eq!(Level::parse(" Expert/New Domain "), Some(Level::Expert));
        assert_eq!(Level::parse("guru"), None);
        assert_eq!(
            serde_json::to_value(Level::Expert).unwrap(),
            serde_json::json!("Expert/New Domain")
        );
        assert!(Level::Advanced > Level::Intermediate);
    }
}
