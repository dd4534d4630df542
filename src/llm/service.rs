//! Question translation: natural language in, validated intent out.
//!
//! The model is treated as an untrusted suggestion engine. Its reply is only
//! ever parsed as JSON and handed to the validator; nothing it writes reaches
//! the store directly.

use std::time::Instant;
use tracing::{debug, info, warn};

use crate::catalog::CatalogSnapshot;
use crate::error::{Result, SheetqlError};
use crate::intent::{validate, Intent, IntentDefaults};

use super::parser::parse_candidate;
use super::prompt::{build_messages, DateContext};
use super::LlmClient;

/// Turns questions into validated intents through a language model.
pub struct IntentTranslator {
    client: Box<dyn LlmClient>,
    defaults: IntentDefaults,
}

impl IntentTranslator {
    /// Creates a translator over the given client.
    pub fn new(client: Box<dyn LlmClient>, defaults: IntentDefaults) -> Self {
        Self { client, defaults }
    }

    /// Column defaults used for prompting and validation.
    pub fn defaults(&self) -> &IntentDefaults {
        &self.defaults
    }

    /// Translates a question using today's date context.
    pub async fn translate(&self, question: &str, catalog: &CatalogSnapshot) -> Result<Intent> {
        self.translate_with_dates(question, catalog, &DateContext::now())
            .await
    }

    /// Translates a question with an explicit date context.
    pub async fn translate_with_dates(
        &self,
        question: &str,
        catalog: &CatalogSnapshot,
        dates: &DateContext,
    ) -> Result<Intent> {
        if question.trim().is_empty() {
            return Err(SheetqlError::validation("question", "must not be empty"));
        }
        if catalog.is_empty() {
            return Err(SheetqlError::validation(
                "table",
                "no tables have been loaded",
            ));
        }

        let messages = build_messages(catalog, &self.defaults, dates, question);
        debug!(
            question_len = question.len(),
            table_count = catalog.table_names().len(),
            "Sending translation request"
        );

        let start = Instant::now();
        let response = self.client.complete(&messages).await?;
        let llm_duration_ms = start.elapsed().as_millis() as u64;
        debug!(llm_duration_ms, response_len = response.len(), "Received model response");

        let candidate = parse_candidate(&response).map_err(|e| {
            warn!(error = %e, "Model response could not be parsed");
            e
        })?;
        debug!(candidate = %candidate, "Candidate intent");

        let intent = validate(&candidate, catalog, &self.defaults).map_err(|e| {
            warn!(error = %e, "Candidate intent rejected");
            e
        })?;

        info!(
            action = %intent.action,
            table = %intent.table,
            llm_duration_ms,
            "Question translated"
        );
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableSchema;
    use crate::intent::{Action, FilterOperator, FilterValue};
    use crate::llm::MockLlmClient;
    use chrono::NaiveDate;

    fn catalog() -> CatalogSnapshot {
        CatalogSnapshot::from_tables([TableSchema::from_headers(
            "decaissements_2024",
            &["trigramme", "montant_reglement", "date_reglement"],
        )])
    }

    fn translator(client: MockLlmClient) -> IntentTranslator {
        IntentTranslator::new(Box::new(client), IntentDefaults::default())
    }

    fn dates() -> DateContext {
        DateContext::for_date(NaiveDate::from_ymd_opt(2024, 2, 10).unwrap())
    }

    #[tokio::test]
    async fn test_translates_fenced_response() {
        let client = MockLlmClient::new().with_response(
            "janvier",
            "```json\n{\"intention\": \"TOP_N\", \"table\": \"decaissements_2024\", \
             \"filtres\": [{\"colonne\": \"date_reglement\", \"operateur\": \"entre\", \
             \"valeur\": [\"2024-01-01\", \"2024-01-31\"]}], \"limite\": 3}\n```",
        );

        let intent = translator(client)
            .translate_with_dates("Top 3 fournisseurs en janvier", &catalog(), &dates())
            .await
            .unwrap();

        assert_eq!(intent.action, Action::TopN);
        assert_eq!(intent.group_by.as_deref(), Some("trigramme"));
        assert_eq!(intent.limit, Some(3));
        assert_eq!(intent.filters[0].operator, FilterOperator::Between);
        assert_eq!(
            intent.filters[0].value,
            FilterValue::Range("2024-01-01".into(), "2024-01-31".into())
        );
    }

    #[tokio::test]
    async fn test_default_mock_answers_are_valid() {
        let translator = translator(MockLlmClient::new());
        for question in ["top suppliers", "total paid", "average payment", "show rows"] {
            let intent = translator
                .translate_with_dates(question, &catalog(), &dates())
                .await;
            assert!(intent.is_ok(), "{question}: {intent:?}");
        }
    }

    #[tokio::test]
    async fn test_prose_response_is_translation_error() {
        let client = MockLlmClient::new().with_response("weather", "I only know about payments.");
        let err = translator(client)
            .translate_with_dates("what's the weather", &catalog(), &dates())
            .await
            .unwrap_err();
        assert!(matches!(err, SheetqlError::Translation(_)));
    }

    #[tokio::test]
    async fn test_hostile_response_fails_validation() {
        let client = MockLlmClient::new().with_response(
            "drop",
            r#"{"action": "DROP", "table": "decaissements_2024"}"#,
        );
        let err = translator(client)
            .translate_with_dates("drop the table", &catalog(), &dates())
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("action"));
    }

    #[tokio::test]
    async fn test_empty_inputs() {
        let translator = translator(MockLlmClient::new());
        let err = translator
            .translate_with_dates("   ", &catalog(), &dates())
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("question"));

        let err = translator
            .translate_with_dates("total", &CatalogSnapshot::default(), &dates())
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("table"));
    }
}
