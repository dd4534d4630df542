//! Mock LLM client for testing and offline use.
//!
//! Answers with canned intent JSON chosen by keywords in the question. The
//! table name is taken from the first table listed in the system prompt.
//! Grouping and value columns are left out so the validator fills in the
//! configured defaults.

use async_trait::async_trait;
use serde_json::json;

use crate::error::Result;
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

/// Mock LLM client that returns canned responses based on input patterns.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    /// Custom response mappings (pattern -> response), checked first.
    custom_responses: Vec<(String, String)>,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom response mapping.
    ///
    /// When the question contains `pattern` (case-insensitively), the mock
    /// returns `response` verbatim.
    pub fn with_response(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.custom_responses
            .push((pattern.into(), response.into()));
        self
    }

    fn mock_response(&self, question: &str, table: &str) -> String {
        let q = question.to_lowercase();

        for (pattern, response) in &self.custom_responses {
            if q.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        let contains_any = |words: &[&str]| words.iter().any(|w| q.contains(w));

        let intent = if contains_any(&["top", "classement", "ranking", "meilleurs"]) {
            json!({
                "action": "TOP_N",
                "table": table,
                "order": "DESC",
                "limit": 10
            })
        } else if contains_any(&["moyenne", "average", "mean"]) {
            json!({"action": "AVG", "table": table})
        } else if contains_any(&["plus gros", "largest", "biggest", "maximum", "max"]) {
            json!({"action": "MAX", "table": table})
        } else if contains_any(&["plus petit", "smallest", "minimum", "min"]) {
            json!({"action": "MIN", "table": table})
        } else if contains_any(&["total", "somme", "sum", "combien"]) {
            json!({"action": "SUM", "table": table})
        } else {
            json!({"action": "FILTER", "table": table, "limit": 20})
        };

        format!("```json\n{}\n```", intent)
    }

    fn last_user_message(messages: &[Message]) -> &str {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    fn first_table(messages: &[Message]) -> &str {
        messages
            .iter()
            .filter(|m| m.role == Role::System)
            .flat_map(|m| m.content.lines())
            .find_map(|line| line.strip_prefix("Table: "))
            .map(str::trim)
            .unwrap_or("unknown")
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let question = Self::last_user_message(messages);
        let table = Self::first_table(messages);
        Ok(self.mock_response(question, table))
    }
}
