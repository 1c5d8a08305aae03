//! Merged per-entity tables must summarize the same no matter which entity
//! finished first.

use proptest::prelude::*;
use statlayer_core::{summarize, ColumnType, Metric, Table, Value};

fn entity_table(entity: i64, velos: &[f64]) -> Table {
    Table::from_rows(
        &[("pitcher", ColumnType::Int), ("velo", ColumnType::Float)],
        velos
            .iter()
            .map(|v| vec![Value::Int(entity), Value::from(*v)])
            .collect(),
    )
    .unwrap()
}

fn summary(tables: &[Table]) -> Table {
    let merged = Table::concat(tables).unwrap();
    summarize(
        &merged,
        &["pitcher"],
        &[Metric::count("velo").named("n"), Metric::max("velo")],
    )
    .unwrap()
    .sort_by(&["pitcher"])
    .unwrap()
}

proptest! {
    #[test]
    fn prop_summary_invariant_to_completion_order(
        velos in prop::collection::vec(prop::collection::vec(80.0f64..100.0, 1..5), 1..6),
        seed in any::<u64>(),
    ) {
        let tables: Vec<Table> = velos
            .iter()
            .enumerate()
            .map(|(i, v)| entity_table(i as i64, v))
            .collect();

        let mut shuffled = tables.clone();
        let n = shuffled.len();
        shuffled.rotate_left((seed as usize) % n);
        shuffled.reverse();

        prop_assert_eq!(summary(&tables), summary(&shuffled));
    }
}

#[test]
fn test_concat_then_join_keeps_left_cardinality() {
    let games = Table::from_rows(
        &[("GamePk", ColumnType::Int), ("Away Pitcher ID", ColumnType::Int)],
        vec![vec![1.into(), 10.into()], vec![2.into(), 10.into()]],
    )
    .unwrap();
    let stats = Table::concat(&[entity_table(10, &[95.0, 97.0]), entity_table(11, &[90.0])]).unwrap();
    let per_pitcher = summarize(&stats, &["pitcher"], &[Metric::mean("velo").named("Away Velo")]).unwrap();

    let joined = games
        .left_join(&per_pitcher, "Away Pitcher ID", "pitcher")
        .unwrap();
    assert_eq!(joined.num_rows(), 2);
    assert_eq!(joined.value(1, "Away Velo"), Some(&Value::Float(96.0)));
}
