//! End-to-end question pipeline tests.
//!
//! question → translation → validation → compilation → gate → store.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use sheetql::app::App;
use sheetql::error::SheetqlError;
use sheetql::intent::IntentDefaults;
use sheetql::llm::{DateContext, MockLlmClient};
use sheetql::store::SqliteStore;

use super::{write_fixture, DECAISSEMENTS_CSV};

const JANUARY_TOP_N: &str = r#"Voici l'intention :
```json
{
  "action": "TOP_N",
  "table": "decaissements_2024",
  "filters": [
    {"column": "date_reglement", "operator": "BETWEEN", "value": ["2024-01-01", "2024-01-31"]}
  ],
  "groupBy": "trigramme",
  "valueColumn": "montant_reglement",
  "order": "DESC",
  "limit": 10
}
```"#;

async fn loaded(app: App) -> App {
    let (_dir, path) = write_fixture("decaissements_2024.csv", DECAISSEMENTS_CSV);
    app.ingest_csv(&path, None).await.unwrap();
    app
}

fn rows(answer_rows: &[serde_json::Map<String, Value>]) -> Value {
    serde_json::to_value(answer_rows).unwrap()
}

#[tokio::test]
async fn test_top_n_question_end_to_end() {
    let client = MockLlmClient::new().with_response("janvier", JANUARY_TOP_N);
    let app = loaded(App::with_client(Box::new(client)).unwrap()).await;

    let answer = app
        .ask("Quels sont les fournisseurs les plus payés en janvier 2024 ?")
        .await
        .unwrap();

    assert_eq!(
        rows(&answer.rows),
        json!([
            {"trigramme": "ABC", "total": 150.0},
            {"trigramme": "XYZ", "total": 30.0}
        ])
    );
    assert_eq!(
        answer.sql,
        "SELECT \"trigramme\", SUM(norm_amount(CAST(\"montant_reglement\" AS TEXT))) AS \"total\" \
         FROM \"decaissements_2024\" \
         WHERE norm_date(CAST(\"date_reglement\" AS TEXT)) BETWEEN norm_date(CAST('2024-01-01' AS TEXT)) \
         AND norm_date(CAST('2024-01-31' AS TEXT)) \
         GROUP BY \"trigramme\" ORDER BY \"total\" DESC NULLS LAST LIMIT 10"
    );
}

#[tokio::test]
async fn test_reversed_between_bounds_are_sorted() {
    let app = loaded(App::with_mock_llm().unwrap()).await;
    let answer = app
        .run_intent(&json!({
            "action": "TOP_N",
            "table": "decaissements_2024",
            "filters": [{"column": "date_reglement", "operator": "BETWEEN", "value": ["31/01/2024", "01/01/2024"]}]
        }))
        .await
        .unwrap();

    assert_eq!(answer.rows.len(), 2);
    assert_eq!(answer.rows[0]["total"], json!(150.0));
}

#[tokio::test]
async fn test_sum_over_year_mixes_formats() {
    let app = loaded(App::with_mock_llm().unwrap()).await;
    let answer = app
        .run_intent(&json!({
            "action": "SUM",
            "table": "decaissements_2024",
            "filters": [{"column": "date_reglement", "operator": "YEAR_EQ", "value": 2024}]
        }))
        .await
        .unwrap();

    let total = answer.rows[0]["total"].as_f64().unwrap();
    assert!((total - 1414.56).abs() < 1e-6, "total = {total}");
}

#[tokio::test]
async fn test_gt_and_contains_filters() {
    let app = loaded(App::with_mock_llm().unwrap()).await;

    let answer = app
        .run_intent(&json!({
            "action": "FILTER",
            "table": "decaissements_2024",
            "filters": [{"column": "montant_reglement", "operator": "GT", "value": "60"}]
        }))
        .await
        .unwrap();
    let codes: Vec<&Value> = answer.rows.iter().map(|r| &r["trigramme"]).collect();
    assert_eq!(codes, vec![&json!("ABC"), &json!("XYZ")]);

    let answer = app
        .run_intent(&json!({
            "action": "FILTER",
            "table": "decaissements_2024",
            "filters": [{"column": "libelle", "operator": "CONTAINS", "value": "janvier"}]
        }))
        .await
        .unwrap();
    assert_eq!(answer.rows.len(), 1);
    assert_eq!(answer.rows[0]["montant_reglement"], json!("100,00 €"));
}

#[tokio::test]
async fn test_max_row_variant_returns_the_record() {
    let app = loaded(App::with_mock_llm().unwrap()).await;
    let answer = app
        .run_intent(&json!({
            "action": "MAX",
            "table": "decaissements_2024",
            "groupBy": "libelle",
            "displayColumns": ["libelle", "montant_reglement"]
        }))
        .await
        .unwrap();

    assert_eq!(
        rows(&answer.rows),
        json!([{"libelle": "Hors période", "montant_reglement": "1 234,56"}])
    );
}

#[tokio::test]
async fn test_unparseable_amounts_rank_last() {
    let app = loaded(App::with_mock_llm().unwrap()).await;
    let (_dir, path) = write_fixture(
        "extra.csv",
        "Trigramme;Montant règlement\nABC;10\nDEF;n/a\nXYZ;20\n",
    );
    app.ingest_csv(&path, Some("extra")).await.unwrap();

    let answer = app
        .run_intent(&json!({"action": "TOP_N", "table": "extra"}))
        .await
        .unwrap();
    assert_eq!(
        rows(&answer.rows),
        json!([
            {"trigramme": "XYZ", "total": 20.0},
            {"trigramme": "ABC", "total": 10.0},
            {"trigramme": "DEF", "total": null}
        ])
    );
}

#[tokio::test]
async fn test_unknown_column_fails_validation_without_sql() {
    let app = loaded(App::with_mock_llm().unwrap()).await;
    let err = app
        .run_intent(&json!({
            "action": "SUM",
            "table": "decaissements_2024",
            "valueColumn": "montant_ttc"
        }))
        .await
        .unwrap_err();

    assert!(matches!(err, SheetqlError::Validation { .. }));
    assert_eq!(err.field(), Some("valueColumn"));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_drop_action_never_reaches_compiler() {
    let client =
        MockLlmClient::new().with_response("supprime", r#"{"action": "DROP", "table": "decaissements_2024"}"#);
    let app = loaded(App::with_client(Box::new(client)).unwrap()).await;

    let err = app.ask("supprime la table").await.unwrap_err();
    assert_eq!(err.field(), Some("action"));

    // The table is still there.
    let answer = app
        .run_intent(&json!({"action": "FILTER", "table": "decaissements_2024"}))
        .await
        .unwrap();
    assert_eq!(answer.rows.len(), 4);
}

#[tokio::test]
async fn test_denylisted_word_in_value_is_rejected_by_gate() {
    let app = loaded(App::with_mock_llm().unwrap()).await;
    let err = app
        .run_intent(&json!({
            "action": "FILTER",
            "table": "decaissements_2024",
            "filters": [{"column": "libelle", "operator": "EQ", "value": "drop table"}]
        }))
        .await
        .unwrap_err();

    assert!(matches!(err, SheetqlError::ForbiddenOperation(_)));
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn test_quotes_in_values_are_literal_text() {
    let app = loaded(App::with_mock_llm().unwrap()).await;
    let answer = app
        .run_intent(&json!({
            "action": "FILTER",
            "table": "decaissements_2024",
            "filters": [{"column": "trigramme", "operator": "EQ", "value": "ABC' OR '1'='1"}]
        }))
        .await
        .unwrap();
    assert!(answer.rows.is_empty());
}

#[tokio::test]
async fn test_model_reply_without_json_is_translation_error() {
    let client = MockLlmClient::new().with_response("météo", "Je ne sais pas répondre.");
    let app = loaded(App::with_client(Box::new(client)).unwrap()).await;

    let err = app.ask("Quelle météo demain ?").await.unwrap_err();
    assert!(matches!(err, SheetqlError::Translation(_)));
}

#[tokio::test]
async fn test_relative_period_resolved_by_mock_prompt() {
    let app = loaded(App::with_mock_llm().unwrap()).await;
    let dates = DateContext::for_date(chrono::NaiveDate::from_ymd_opt(2024, 2, 15).unwrap());

    let answer = app
        .ask_with_dates("Classement des fournisseurs", &dates)
        .await
        .unwrap();
    assert_eq!(answer.intent.action.as_str(), "TOP_N");
    assert_eq!(answer.rows[0]["trigramme"], json!("XYZ"));
}

#[tokio::test]
async fn test_row_cap_sets_warning() {
    let store = SqliteStore::open_in_memory()
        .unwrap()
        .with_limits(2, Duration::from_secs(5));
    let app = App::new(
        Arc::new(store),
        Box::new(MockLlmClient::new()),
        IntentDefaults::default(),
    )
    .unwrap();
    let app = loaded(app).await;

    let answer = app
        .run_intent(&json!({"action": "FILTER", "table": "decaissements_2024"}))
        .await
        .unwrap();
    assert_eq!(answer.rows.len(), 2);
    assert_eq!(
        answer.warning.as_deref(),
        Some("Result truncated: showing 2 of 4 rows")
    );
}

#[tokio::test]
async fn test_concurrent_questions_during_reingestion() {
    let app = Arc::new(loaded(App::with_mock_llm().unwrap()).await);
    let (_dir, path) = write_fixture("decaissements_2024.csv", DECAISSEMENTS_CSV);

    let mut handles = Vec::new();
    for i in 0..8 {
        let app = Arc::clone(&app);
        let path = path.clone();
        handles.push(tokio::spawn(async move {
            if i % 4 == 0 {
                app.ingest_csv(&path, None).await.map(|_| ())
            } else {
                app.run_intent(&json!({"action": "SUM", "table": "decaissements_2024"}))
                    .await
                    .map(|answer| assert_eq!(answer.rows.len(), 1))
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(app.schema().table_names(), vec!["decaissements_2024"]);
}
