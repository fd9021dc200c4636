//! Tutor chat and AI-assisted question content
//!
//! - OpenRouter chat completions
//! - Difficulty prediction through an external script
//! - Justification/keyword generation for questions that lack them

pub mod llm;
pub mod predictor;
pub mod content;

use std::sync::Arc;

pub use content::{run_backfill, BackfillReport, BatchOutcome, ContentGenerator, GeneratedContent};
pub use llm::{ChatBackend, LlmError, OpenRouterClient, UnconfiguredBackend};
pub use predictor::{DifficultyPredictor, ScriptPredictor};

use crate::config::Config;
use crate::types::ChatTurn;

/// Reply used when the model returns no text
pub const EMPTY_REPLY: &str = "I’m sorry, I couldn’t generate a response at the moment.";

/// Tutor answer plus the predicted difficulty of the query
#[derive(Debug, Clone, PartialEq)]
pub struct TutorReply {
    pub predicted_level: String,
    pub response: String,
}

/// Answers learner questions through the configured model
#[derive(Clone)]
pub struct TutorService {
    backend: Arc<dyn ChatBackend>,
    predictor: Arc<dyn DifficultyPredictor>,
    model: String,
    system_prompt: String,
    max_tokens: u32,
}

impl TutorService {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        predictor: Arc<dyn DifficultyPredictor>,
        config: &Config,
    ) -> Self {
        Self {
            backend,
            predictor,
            model: config.openrouter.default_model.clone(),
            system_prompt: config.tutor.system_prompt.clone(),
            max_tokens: config.tutor.max_tokens,
        }
    }

    /// System prompt, prior turns, then the query unless the history already
    /// ends with it
    pub fn build_messages(&self, query: &str, history: &[ChatTurn]) -> Vec<ChatTurn> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatTurn::new("system", self.system_prompt.clone()));
        messages.extend(history.iter().cloned());

        let already_asked = history.last().is_some_and(|last| last.content == query);
        if !already_asked {
            messages.push(ChatTurn::new("user", query));
        }
        messages
    }

    pub async fn reply(&self, query: &str, history: &[ChatTurn]) -> Result<TutorReply, LlmError> {
        let predicted_level = self.predictor.predict(query).await;
        tracing::debug!("Tutor query classified as {}", predicted_level);

        let messages = self.build_messages(query, history);
        let text = self
            .backend
            .complete(&self.model, messages, Some(self.max_tokens))
            .await?;

        let response = if text.trim().is_empty() {
            EMPTY_REPLY.to_string()
        } else {
            text
        };

        Ok(TutorReply {
            predicted_level,
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm::MockChatBackend;
    use predictor::MockDifficultyPredictor;

    fn predictor(level: &'static str) -> Arc<MockDifficultyPredictor> {
        let mut p = MockDifficultyPredictor::new();
        p.expect_predict().returning(move |_| level.to_string());
        Arc::new(p)
    }

    #[test]
    fn history_ending_with_query_is_not_repeated() {
        let service = TutorService::new(
            Arc::new(MockChatBackend::new()),
            predictor("Beginner"),
            &Config::default(),
        );
        let history = vec![
            ChatTurn::new("assistant", "Hi! Ask me anything."),
            ChatTurn::new("user", "What is a closure?"),
        ];

        let messages = service.build_messages("What is a closure?", &history);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");

        let messages = service.build_messages("And a generator?", &history);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3], ChatTurn::new("user", "And a generator?"));
    }

    #[tokio::test]
    async fn reply_carries_prediction_and_model_text() {
        let mut backend = MockChatBackend::new();
        backend
            .expect_complete()
            .withf(|model, messages, max_tokens| {
                model == "openai/gpt-3.5-turbo" && messages.len() == 2 && *max_tokens == Some(1024)
            })
            .times(1)
            .returning(|_, _, _| Ok("A closure captures its environment.".to_string()));

        let service = TutorService::new(Arc::new(backend), predictor("Intermediate"), &Config::default());
        let reply = service.reply("What is a closure?", &[]).await.unwrap();
        assert_eq!(reply.predicted_level, "Intermediate");
        assert_eq!(reply.response, "A closure captures its environment.");
    }

    #[tokio::test]
    async fn empty_model_text_gets_apology() {
        let mut backend = MockChatBackend::new();
        backend.expect_complete().returning(|_, _, _| Ok("  ".to_string()));

        let service = TutorService::new(Arc::new(backend), predictor("Advanced"), &Config::default());
        let reply = service.reply("?", &[]).await.unwrap();
        assert_eq!(reply.response, EMPTY_REPLY);
    }

    #[tokio::test]
    async fn provider_errors_propagate() {
        let mut backend = MockChatBackend::new();
        backend.expect_complete().returning(|_, _, _| {
            Err(LlmError::Api {
                status: 402,
                message: "Insufficient credits".into(),
            })
        });

        let service = TutorService::new(Arc::new(backend), predictor("Advanced"), &Config::default());
        let err = service.reply("hi", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "Insufficient credits");
    }
}
