//! Integration tests for SheetQL.

pub mod ingest_test;
pub mod pipeline_test;
pub mod properties_test;

use std::path::PathBuf;
use tempfile::TempDir;

/// Payments fixture: mixed amount and date formats, one February row.
///
/// TOP_N over January yields ABC 150.0 then XYZ 30.0.
pub const DECAISSEMENTS_CSV: &str = "\
Trigramme;Montant règlement;Date règlement;Libellé
ABC;100,00 €;2024-01-05;Loyer janvier
ABC;50;15/01/2024;Fournitures
XYZ;30;31-01-2024;
XYZ;1 234,56;2024-02-03;Hors période
";

/// Writes `content` to `name` inside a fresh temporary directory.
pub fn write_fixture(name: &str, content: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    (dir, path)
}
