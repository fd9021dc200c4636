//! Official justification and keyword generation for questions that lack them

use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::llm::ChatBackend;
use crate::config::ContentConfig;
use crate::scoring::generate_keywords;
use crate::store::SqliteStore;
use crate::types::{ChatTurn, Question};

/// Generated content for one question
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedContent {
    pub justification: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ModelOutput {
    justification: String,
    #[serde(default)]
    keywords_string: String,
}

/// Asks the model for a short justification and key terms
#[derive(Clone)]
pub struct ContentGenerator {
    backend: Arc<dyn ChatBackend>,
    model: String,
}

impl ContentGenerator {
    pub fn new(backend: Arc<dyn ChatBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }

    fn prompt(question: &Question) -> String {
        let correct = question
            .option_text(question.correct_option.trim())
            .unwrap_or(&question.correct_option);

        format!(
            r#"You are an expert quiz content generator. Your task is to provide a brief, accurate justification for the following multiple-choice question.

Question: {}
Correct Answer: {}

The justification should be a concise paragraph (2-3 sentences) explaining WHY the correct option is right.

The final output MUST be a single JSON object with two keys:
1. "justification": The full explanation text.
2. "keywords_string": A comma-separated string of the 5 to 10 most important technical and subject-specific terms from the justification.

Respond with the JSON object only."#,
            question.question, correct
        )
    }

    pub async fn generate(&self, question: &Question) -> Result<GeneratedContent> {
        let messages = vec![ChatTurn::new("user", Self::prompt(question))];
        let text = self
            .backend
            .complete(&self.model, messages, Some(600))
            .await
            .context("Content generation request failed")?;

        parse_model_output(&text)
    }
}

/// Parse the model's JSON, tolerating code fences or prose around it
pub fn parse_model_output(text: &str) -> Result<GeneratedContent> {
    let start = text.find('{').context("No JSON object in model output")?;
    let end = text.rfind('}').context("No JSON object in model output")?;
    anyhow::ensure!(end > start, "Malformed JSON object in model output");

    let output: ModelOutput =
        serde_json::from_str(&text[start..=end]).context("Failed to parse model JSON")?;

    let justification = output.justification.trim().to_string();
    anyhow::ensure!(!justification.is_empty(), "Model returned an empty justification");

    Ok(GeneratedContent {
        justification,
        keywords: generate_keywords(&output.keywords_string),
    })
}

/// Result of one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub attempted: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Generate content for up to `batch_size` questions missing it
pub async fn process_batch(
    store: &SqliteStore,
    generator: &ContentGenerator,
    batch_size: usize,
) -> Result<BatchOutcome> {
    let pending = store.questions_missing_content(batch_size).await?;
    let mut outcome = BatchOutcome {
        attempted: pending.len(),
        ..Default::default()
    };

    for question in &pending {
        match generator.generate(question).await {
            Ok(content) => {
                store
                    .update_question_content(&question.id, &content.justification, &content.keywords)
                    .await?;
                outcome.updated += 1;
            }
            Err(e) => {
                tracing::warn!("Content generation failed for question {}: {:#}", question.id, e);
                outcome.failed += 1;
            }
        }
    }

    tracing::info!(
        "Content batch: {} attempted, {} updated, {} failed",
        outcome.attempted, outcome.updated, outcome.failed
    );
    Ok(outcome)
}

/// Summary of a backfill run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub updated: usize,
    pub batches: usize,
    /// True when no question is left without content
    pub completed: bool,
}

/// Run batches until every question has content or too many batches fail
/// in a row. A batch that updates nothing counts as a failure.
pub async fn run_backfill(
    store: &SqliteStore,
    generator: &ContentGenerator,
    config: &ContentConfig,
) -> Result<BackfillReport> {
    let mut report = BackfillReport::default();
    let mut consecutive_failures = 0u32;
    let retry_delay = Duration::from_secs(config.retry_delay_secs);
    let breather = Duration::from_secs(config.breather_secs);

    while consecutive_failures < config.max_consecutive_failures {
        let outcome = match process_batch(store, generator, config.batch_size).await {
            Ok(outcome) => outcome,
            Err(e) => {
                consecutive_failures += 1;
                tracing::error!(
                    "Batch failed ({}/{}): {:#}",
                    consecutive_failures, config.max_consecutive_failures, e
                );
                if consecutive_failures < config.max_consecutive_failures {
                    tokio::time::sleep(retry_delay).await;
                }
                continue;
            }
        };
        report.batches += 1;

        if outcome.attempted == 0 {
            report.completed = true;
            break;
        }

        if outcome.updated == 0 {
            consecutive_failures += 1;
            tracing::warn!(
                "No question updated ({}/{}); waiting {:?}",
                consecutive_failures, config.max_consecutive_failures, retry_delay
            );
            if consecutive_failures < config.max_consecutive_failures {
                tokio::time::sleep(retry_delay).await;
            }
            continue;
        }

        consecutive_failures = 0;
        report.updated += outcome.updated;

        if outcome.attempted < config.batch_size {
            tokio::time::sleep(breather).await;
        }
    }

    if !report.completed {
        tracing::error!(
            "Backfill stopped after {} consecutive failures; {} question(s) updated",
            consecutive_failures, report.updated
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tutor::llm::{LlmError, MockChatBackend};

    fn question(text: &str) -> Question {
        Question {
            id: String::new(),
            question: text.into(),
            option1: "list".into(),
            option2: "tuple".into(),
            option3: "dict".into(),
            option4: "set".into(),
            correct_option: "Option2".into(),
            difficulty_level: None,
            justification_text: None,
            keywords: vec![],
        }
    }

    fn quick_config(batch_size: usize) -> ContentConfig {
        ContentConfig {
            batch_size,
            max_consecutive_failures: 2,
            retry_delay_secs: 0,
            breather_secs: 0,
        }
    }

    #[test]
    fn parses_fenced_json() {
        let text = "```json\n{\"justification\": \"Tuples are immutable.\", \"keywords_string\": \"tuple, immutable, hashable\"}\n```";
        let content = parse_model_output(text).unwrap();
        assert_eq!(content.justification, "Tuples are immutable.");
        assert_eq!(content.keywords, vec!["tuple", "immutable", "hashable"]);
    }

    #[test]
    fn rejects_non_json() {
        assert!(parse_model_output("Sorry, I can't help").is_err());
        assert!(parse_model_output("{\"justification\": \"\"}").is_err());
    }

    #[test]
    fn prompt_names_the_correct_option_text() {
        let prompt = ContentGenerator::prompt(&question("Which is immutable?"));
        assert!(prompt.contains("Question: Which is immutable?"));
        assert!(prompt.contains("Correct Answer: tuple"));
    }

    #[tokio::test]
    async fn backfill_fills_every_question() {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..3 {
            store.insert_question(&question(&format!("Q{}", i))).await.unwrap();
        }

        let mut backend = MockChatBackend::new();
        backend.expect_complete().times(3).returning(|_, _, _| {
            Ok(r#"{"justification": "Because tuples are immutable.", "keywords_string": "tuple, immutable"}"#.to_string())
        });
        let generator = ContentGenerator::new(Arc::new(backend), "m");

        let report = run_backfill(&store, &generator, &quick_config(2)).await.unwrap();
        assert!(report.completed);
        assert_eq!(report.updated, 3);
        assert!(store.questions_missing_content(10).await.unwrap().is_empty());

        let stored = store.sample_questions(1).await.unwrap();
        assert_eq!(stored[0].keywords, vec!["tuple", "immutable"]);
    }

    #[tokio::test]
    async fn backfill_gives_up_after_repeated_failures() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_question(&question("Q")).await.unwrap();

        let mut backend = MockChatBackend::new();
        backend.expect_complete().times(2).returning(|_, _, _| {
            Err(LlmError::Api {
                status: 429,
                message: "Quota exceeded".into(),
            })
        });
        let generator = ContentGenerator::new(Arc::new(backend), "m");

        let report = run_backfill(&store, &generator, &quick_config(5)).await.unwrap();
        assert!(!report.completed);
        assert_eq!(report.updated, 0);
        assert_eq!(store.questions_missing_content(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn final_store_failure_exits_without_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quiz.db");
        let store = SqliteStore::open(&path).await.unwrap();
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("DROP TABLE questions;")
            .unwrap();

        let generator = ContentGenerator::new(Arc::new(MockChatBackend::new()), "m");
        let config = ContentConfig {
            batch_size: 5,
            max_consecutive_failures: 1,
            retry_delay_secs: 60,
            breather_secs: 0,
        };

        let report = tokio::time::timeout(Duration::from_secs(10), run_backfill(&store, &generator, &config))
            .await
            .expect("backfill slept after its last allowed failure")
            .unwrap();
        assert!(!report.completed);
        assert_eq!(report.batches, 0);
    }
}
