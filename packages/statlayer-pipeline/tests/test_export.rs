//! CSV export integration tests

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use statlayer_core::{ColumnType, Table, Value};
use statlayer_pipeline::{CsvExporter, Exporter};
use std::collections::BTreeMap;
use tempfile::TempDir;

#[test]
fn test_one_file_per_layer_with_placeholder_for_empty() {
    let dir = TempDir::new().unwrap();
    let as_of = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
    let hitting = Table::from_rows(
        &[("Team", ColumnType::Str), ("AVG", ColumnType::Float)],
        vec![
            vec!["Chicago Cubs".into(), 0.278.into()],
            vec!["New York Mets".into(), Value::Null],
        ],
    )
    .unwrap();

    let mut tables = BTreeMap::new();
    tables.insert("team_hitting".to_string(), hitting);
    tables.insert("betting_odds".to_string(), Table::empty());

    let exporter = CsvExporter::new(dir.path().join("out"));
    let written = exporter.export(as_of, &[], &tables).unwrap();

    assert_eq!(
        written,
        vec![
            dir.path().join("out/betting_odds_2024-04-01.csv"),
            dir.path().join("out/team_hitting_2024-04-01.csv"),
        ]
    );
    assert_eq!(
        std::fs::read_to_string(&written[0]).unwrap(),
        "Message\nNo data for betting_odds\n"
    );
    assert_eq!(
        std::fs::read_to_string(&written[1]).unwrap(),
        "Team,AVG\nChicago Cubs,0.278\nNew York Mets,\n"
    );
}

#[test]
fn test_failed_layer_still_gets_a_placeholder_file() {
    let dir = TempDir::new().unwrap();
    let as_of = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
    let mut tables = BTreeMap::new();
    tables.insert(
        "team_hitting".to_string(),
        Table::from_rows(&[("Team", ColumnType::Str)], vec![vec!["Chicago Cubs".into()]])
            .unwrap(),
    );

    // betting_odds failed this run, so it has no table at all
    let exporter = CsvExporter::new(dir.path());
    let written = exporter
        .export(as_of, &["team_hitting", "betting_odds"], &tables)
        .unwrap();

    assert_eq!(
        written,
        vec![
            dir.path().join("betting_odds_2024-04-01.csv"),
            dir.path().join("team_hitting_2024-04-01.csv"),
        ]
    );
    assert_eq!(
        std::fs::read_to_string(&written[0]).unwrap(),
        "Message\nNo data for betting_odds\n"
    );
}
