//! CSV ingestion integration tests.

use pretty_assertions::assert_eq;
use serde_json::json;

use sheetql::app::App;
use sheetql::error::SheetqlError;
use sheetql::ingest::LoadSource;

use super::write_fixture;

#[tokio::test]
async fn test_table_name_from_accented_file_stem() {
    let app = App::with_mock_llm().unwrap();
    let (_dir, path) = write_fixture("Décaissements 2024.csv", "Trigramme,Montant\nABC,1\n");

    let schema = app.ingest_csv(&path, None).await.unwrap();
    assert_eq!(schema.name, "decaissements_2024");
    assert!(app.catalog().get("Décaissements 2024").is_some());
}

#[tokio::test]
async fn test_headers_are_slugged_and_deduplicated() {
    let app = App::with_mock_llm().unwrap();
    let (_dir, path) = write_fixture(
        "t.csv",
        "\u{feff}N° facture;Montant;montant;;Libellé\n1;2;3;4;5\n",
    );

    let schema = app.ingest_csv(&path, None).await.unwrap();
    assert_eq!(
        schema.column_names(),
        vec!["n_facture", "montant", "montant_2", "col_4", "libelle"]
    );
    assert_eq!(schema.columns[0].original_header, "N° facture");
}

#[tokio::test]
async fn test_short_rows_are_padded_with_null() {
    let app = App::with_mock_llm().unwrap();
    let (_dir, path) = write_fixture("short.csv", "a,b,c\n1\n\n4,5,6\n");

    app.ingest_csv(&path, None).await.unwrap();
    let answer = app
        .run_intent(&json!({"action": "FILTER", "table": "short"}))
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&answer.rows).unwrap(),
        json!([
            {"a": "1", "b": null, "c": null},
            {"a": "4", "b": "5", "c": "6"}
        ])
    );
}

#[tokio::test]
async fn test_load_source_with_explicit_table() {
    let app = App::with_mock_llm().unwrap();
    let (_dir, path) = write_fixture("export-final (2).csv", "x\n1\n");

    let source: LoadSource = format!("ventes={}", path.display()).parse().unwrap();
    let schema = app.load(&source).await.unwrap();
    assert_eq!(schema.name, "ventes");
}

#[tokio::test]
async fn test_missing_file_is_ingestion_error() {
    let app = App::with_mock_llm().unwrap();
    let dir = tempfile::tempdir().unwrap();

    let err = app
        .ingest_csv(&dir.path().join("absent.csv"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SheetqlError::Ingestion(_)));
    assert!(app.schema().is_empty());
}

#[tokio::test]
async fn test_empty_file_is_rejected() {
    let app = App::with_mock_llm().unwrap();
    let (_dir, path) = write_fixture("empty.csv", "");

    let err = app.ingest_csv(&path, None).await.unwrap_err();
    assert!(matches!(err, SheetqlError::Ingestion(_)));
}

#[tokio::test]
async fn test_reingestion_replaces_schema_and_rows() {
    let app = App::with_mock_llm().unwrap();
    let (dir, path) = write_fixture("t.csv", "a,b\n1,2\n3,4\n");
    app.ingest_csv(&path, None).await.unwrap();

    std::fs::write(dir.path().join("t.csv"), "c\n9\n").unwrap();
    app.ingest_csv(&path, None).await.unwrap();

    let err = app
        .run_intent(&json!({"action": "FILTER", "table": "t", "displayColumns": ["a"]}))
        .await
        .unwrap_err();
    assert_eq!(err.field(), Some("displayColumns[0]"));

    let answer = app
        .run_intent(&json!({"action": "FILTER", "table": "t"}))
        .await
        .unwrap();
    assert_eq!(answer.columns, vec!["c"]);
    assert_eq!(answer.rows.len(), 1);
}
