//! File checkpoint store integration tests

use chrono::{NaiveDate, TimeZone, Utc};
use pretty_assertions::assert_eq;
use statlayer_core::{ColumnType, Table, Value};
use statlayer_pipeline::{CheckpointKey, CheckpointStore, FileCheckpointStore};
use tempfile::TempDir;

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
}

fn conditions() -> Table {
    Table::from_rows(
        &[
            ("GamePk", ColumnType::Int),
            ("Venue", ColumnType::Str),
            ("Temp (F)", ColumnType::Float),
            ("Game Time (UTC)", ColumnType::Timestamp),
        ],
        vec![
            vec![
                745001.into(),
                "Wrigley Field".into(),
                48.5.into(),
                Utc.with_ymd_and_hms(2024, 4, 1, 18, 20, 0).unwrap().into(),
            ],
            vec![745002.into(), Value::Null, Value::Null, Value::Null],
        ],
    )
    .unwrap()
}

#[tokio::test]
async fn test_put_then_get_returns_the_same_table() {
    let dir = TempDir::new().unwrap();
    let store = FileCheckpointStore::new(dir.path().join("checkpoints"));
    let key = CheckpointKey::layer("game_conditions", as_of());

    assert!(store.get(&key).await.unwrap().is_none());
    store.put(&key, &conditions()).await.unwrap();

    assert!(dir
        .path()
        .join("checkpoints/game_conditions_2024-04-01.arrow")
        .exists());
    assert_eq!(store.get(&key).await.unwrap(), Some(conditions()));
}

#[tokio::test]
async fn test_zero_row_table_is_a_hit() {
    let dir = TempDir::new().unwrap();
    let store = FileCheckpointStore::new(dir.path());
    let key = CheckpointKey::layer("betting_odds", as_of());
    let empty = conditions().schema_only();

    store.put(&key, &empty).await.unwrap();
    let loaded = store.get(&key).await.unwrap().unwrap();

    assert!(loaded.is_empty());
    assert_eq!(loaded.schema(), conditions().schema());
}

#[tokio::test]
async fn test_overwrite_keeps_last_write_and_no_temp_files() {
    let dir = TempDir::new().unwrap();
    let store = FileCheckpointStore::new(dir.path());
    let key = CheckpointKey::entity("probable_starters-pitcher", as_of(), 543037);

    store.put(&key, &conditions()).await.unwrap();
    let second = conditions().filter(|row| row.index() == 0);
    store.put(&key, &second).await.unwrap();

    assert_eq!(store.get(&key).await.unwrap(), Some(second));
    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        files,
        vec!["probable_starters-pitcher_2024-04-01_543037.arrow".to_string()]
    );
}

#[tokio::test]
async fn test_remove_clears_entry() {
    let dir = TempDir::new().unwrap();
    let store = FileCheckpointStore::new(dir.path());
    let key = CheckpointKey::layer("team_hitting", as_of());

    store.put(&key, &conditions()).await.unwrap();
    assert!(store.remove(&key).await.unwrap());
    assert!(!store.remove(&key).await.unwrap());
    assert!(store.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_corrupt_file_is_an_error_not_a_miss() {
    let dir = TempDir::new().unwrap();
    let store = FileCheckpointStore::new(dir.path());
    let key = CheckpointKey::layer("team_hitting", as_of());
    std::fs::write(store.path_for(&key), b"not arrow").unwrap();

    let err = store.get(&key).await.unwrap_err();
    assert!(err.to_string().contains("team_hitting_2024-04-01"));
}

#[tokio::test]
async fn test_unwritable_directory_is_an_error() {
    let dir = TempDir::new().unwrap();
    // A regular file where the directory should be
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, b"").unwrap();
    let store = FileCheckpointStore::new(&blocker);

    let key = CheckpointKey::layer("team_hitting", as_of());
    assert!(store.put(&key, &conditions()).await.is_err());
}
