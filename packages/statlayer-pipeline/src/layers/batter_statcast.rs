//! Runs-created family of batter metrics over the trailing month.

use super::statcast::{self, FlagFn};
use crate::error::FetchError;
use crate::layer::{LayerContext, LayerOutput};
use statlayer_core::{
    derive, summarize, Column, ColumnType, Derivation, Expr, Metric, Row, Table, TableError, Value,
};
use tracing::info;

const WINDOW_DAYS: i64 = 30;

/// Plate-appearance outcomes that are not at-bats.
const NON_AB_EVENTS: &[&str] = &[
    "walk",
    "hit_by_pitch",
    "sac_fly",
    "sac_bunt",
    "intent_walk",
    "catcher_interf",
];

const HIT_BASES: &[(&str, i64)] = &[("single", 1), ("double", 2), ("triple", 3), ("home_run", 4)];

const COUNTS: &[&str] = &[
    "H", "BB", "TB", "AB", "OUTS", "1B", "2B", "3B", "HR", "SB", "CS", "K",
];

const MEANS: &[(&str, &str)] = &[
    ("launch_speed", "AvgEV"),
    ("launch_angle", "AvgLA"),
    ("estimated_woba_using_speedangle", "xwOBA"),
    ("estimated_ba_using_speedangle", "xBA"),
];

fn event(row: Row<'_>) -> Option<&str> {
    row.get("events").as_str()
}

const FLAGS: &[(&str, FlagFn)] = &[
    ("1B", |row| event(row).map(|e| e == "single")),
    ("2B", |row| event(row).map(|e| e == "double")),
    ("3B", |row| event(row).map(|e| e == "triple")),
    ("HR", |row| event(row).map(|e| e == "home_run")),
    ("BB", |row| Some(row.get("description").as_str().is_some_and(|d| d.contains("walk")))),
    ("AB", |row| event(row).map(|e| !NON_AB_EVENTS.contains(&e))),
    ("SB", |row| event(row).map(|e| e.starts_with("stolen_base"))),
    ("CS", |row| event(row).map(|e| e.starts_with("caught_stealing"))),
    ("K", |row| event(row).map(|e| e == "strikeout")),
];

pub async fn fetch(ctx: &LayerContext) -> Result<LayerOutput, FetchError> {
    let (events, failures) = statcast::league_window(ctx, WINDOW_DAYS).await?;
    let table = batter_summary(&events)?;
    info!("batter_statcast: {} batters", table.num_rows());
    Ok(LayerOutput::new(table).with_failures(failures))
}

fn bases(e: &str) -> Option<i64> {
    HIT_BASES.iter().find(|(name, _)| *name == e).map(|(_, b)| *b)
}

/// Per-row Int column from `f`.
fn int_column(events: &Table, name: &str, f: impl Fn(Row<'_>) -> Value) -> Result<Column, TableError> {
    Column::new(name, ColumnType::Int, events.rows().map(f).collect())
}

/// One row per batter over plate-appearance-ending pitches.
pub fn batter_summary(events: &Table) -> Result<Table, TableError> {
    let ended = events.filter(|row| {
        !row.get("events").is_null() && !row.get("description").is_null()
    });
    let flagged = statcast::with_flags(&ended, FLAGS)?;
    let h = int_column(&flagged, "H", |row| {
        Value::Int(event(row).and_then(bases).map_or(0, |_| 1))
    })?;
    let tb = int_column(&flagged, "TB", |row| {
        Value::Int(event(row).and_then(bases).unwrap_or(0))
    })?;
    let flagged = flagged.with_column(h)?.with_column(tb)?;
    let outs = int_column(&flagged, "OUTS", |row| {
        match (row.get("AB").as_i64(), row.get("H").as_i64()) {
            (Some(ab), Some(h)) => Value::Int(ab - h),
            _ => Value::Null,
        }
    })?;
    let flagged = flagged.with_column(outs)?;

    let mut metrics: Vec<Metric> = COUNTS.iter().map(|c| Metric::sum(*c)).collect();
    metrics.extend(MEANS.iter().map(|(src, out)| Metric::mean(*src).named(*out)));
    let summary = summarize(&flagged, &["batter"], &metrics)?;

    let col = Expr::col;
    let summary = derive(
        &summary,
        &[
            Derivation::new(
                "RC",
                (col("H") + col("BB")) * col("TB") / (col("AB") + col("BB")),
            ),
            Derivation::new(
                "SecA",
                (col("BB") + (col("TB") - col("H")) + (col("SB") - col("CS"))) / col("AB"),
            ),
            Derivation::new("RC27", Expr::lit(27.0) * (col("RC") / col("OUTS"))),
            Derivation::new("K%", col("K") / col("AB")),
            Derivation::new(
                "BABIP",
                (col("H") - col("HR")) / (col("AB") - col("K") - col("HR")),
            ),
        ],
    )?;
    let summary = summary.rename(&[("batter", "Batter ID")])?;

    let keep: Vec<&str> = std::iter::once("Batter ID")
        .chain(COUNTS.iter().copied())
        .chain(["RC", "SecA", "RC27", "K%", "BABIP"])
        .chain(MEANS.iter().map(|(_, out)| *out))
        .collect();
    summary.select(&keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{csv_table, savant};
    use pretty_assertions::assert_eq;

    fn events(csv: &str) -> Table {
        csv_table(csv.as_bytes(), savant::EVENT_COLUMNS, "test").unwrap()
    }

    fn f(table: &Table, row: usize, column: &str) -> f64 {
        table.value(row, column).unwrap().as_f64().unwrap()
    }

    #[test]
    fn test_runs_created_from_counting_stats() {
        let table = batter_summary(&events(
            "batter,events,description,launch_speed\n\
             1,single,hit_into_play,100.0\n\
             1,home_run,hit_into_play,110.0\n\
             1,walk,ball,\n\
             1,strikeout,swinging_strike,\n\
             1,field_out,hit_into_play,80.0\n\
             1,,ball,\n",
        ))
        .unwrap();

        assert_eq!(table.num_rows(), 1);
        assert_eq!(table.value(0, "Batter ID"), Some(&Value::Int(1)));
        assert_eq!(table.value(0, "H"), Some(&Value::Int(2)));
        assert_eq!(table.value(0, "TB"), Some(&Value::Int(5)));
        assert_eq!(table.value(0, "AB"), Some(&Value::Int(4)));
        assert_eq!(table.value(0, "BB"), Some(&Value::Int(0)));
        assert_eq!(table.value(0, "OUTS"), Some(&Value::Int(2)));
        assert_eq!(table.value(0, "K"), Some(&Value::Int(1)));
        // (H + BB) * TB / (AB + BB)
        assert!((f(&table, 0, "RC") - 2.0 * 5.0 / 4.0).abs() < 1e-9);
        assert!((f(&table, 0, "RC27") - 27.0 * 2.5 / 2.0).abs() < 1e-9);
        assert!((f(&table, 0, "BABIP") - 1.0 / 2.0).abs() < 1e-9);
        assert!((f(&table, 0, "AvgEV") - 290.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_walks_only_batter_has_null_rates() {
        let table = batter_summary(&events(
            "batter,events,description\n2,walk,walk\n2,intent_walk,intent_walk\n",
        ))
        .unwrap();

        assert_eq!(table.value(0, "AB"), Some(&Value::Int(0)));
        assert_eq!(table.value(0, "BB"), Some(&Value::Int(2)));
        assert_eq!(table.value(0, "K%"), Some(&Value::Null));
        assert_eq!(table.value(0, "SecA"), Some(&Value::Null));
        assert_eq!(table.value(0, "RC"), Some(&Value::Float(0.0)));
    }
}
