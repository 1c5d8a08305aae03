//! League-wide pitcher profiles from a trailing year of pitch events.

use super::statcast::{self, FlagFn};
use crate::error::FetchError;
use crate::layer::{LayerContext, LayerOutput};
use statlayer_core::{derive, summarize, Derivation, Expr, Metric, Row, Table, TableError};
use tracing::info;

const WINDOW_DAYS: i64 = 365;
const BARREL_EV: f64 = 98.0;
const BARREL_LA: (f64, f64) = (26.0, 30.0);

/// Event column averaged per pitcher, output column.
const MEANS: &[(&str, &str)] = &[
    ("release_speed", "Avg Velo"),
    ("release_spin_rate", "Avg Spin Rate"),
    ("estimated_woba_using_speedangle", "xwOBA"),
    ("estimated_ba_using_speedangle", "xBA"),
    ("release_extension", "Avg Extension"),
    ("release_pos_x", "Rel Pos X"),
    ("release_pos_z", "Rel Pos Z"),
    ("pfx_x", "Horz Break"),
    ("pfx_z", "Vert Break"),
    ("plate_x", "Plate X"),
    ("plate_z", "Plate Z"),
    ("launch_speed", "Avg Exit Velo"),
    ("launch_angle", "Avg Launch Angle"),
    ("outs_when_up", "Avg Outs"),
    ("inning", "Avg Inning"),
];

fn is_barrel(row: Row<'_>) -> Option<bool> {
    let ev = row.get("launch_speed").as_f64();
    let la = row.get("launch_angle").as_f64();
    Some(matches!((ev, la), (Some(ev), Some(la))
        if ev >= BARREL_EV && (BARREL_LA.0..=BARREL_LA.1).contains(&la)))
}

fn is_hard_hit(row: Row<'_>) -> Option<bool> {
    Some(statcast::hard_hit(row))
}

const FLAGS: &[(&str, FlagFn)] = &[("barrel", is_barrel), ("hard_hit", is_hard_hit)];

pub async fn fetch(ctx: &LayerContext) -> Result<LayerOutput, FetchError> {
    let (events, failures) = statcast::league_window(ctx, WINDOW_DAYS).await?;
    let table = pitcher_profiles(&events)?;
    info!(
        "pitcher_statcast: {} pitchers from {} pitches",
        table.num_rows(),
        events.num_rows()
    );
    Ok(LayerOutput::new(table).with_failures(failures))
}

/// One row per pitcher. `Events` counts pitches that ended a plate
/// appearance; the batted-ball rates are per ended plate appearance and
/// null when there are none.
pub fn pitcher_profiles(events: &Table) -> Result<Table, TableError> {
    let events = statcast::with_flags(events, FLAGS)?;

    let mut metrics = vec![
        Metric::max("player_name").named("Pitcher Name"),
        Metric::count("events").named("Events"),
        Metric::sum("hard_hit").named("HardHits"),
        Metric::sum("barrel").named("Barrels"),
    ];
    metrics.extend(MEANS.iter().map(|(src, out)| Metric::mean(*src).named(*out)));
    let summary = summarize(&events, &["pitcher"], &metrics)?;

    let summary = derive(
        &summary,
        &[
            Derivation::new("HardHit%", Expr::pct(Expr::col("HardHits"), Expr::col("Events"))),
            Derivation::new("Barrel%", Expr::pct(Expr::col("Barrels"), Expr::col("Events"))),
        ],
    )?;
    let summary = summary.rename(&[("pitcher", "Pitcher ID")])?;

    let keep: Vec<&str> = ["Pitcher ID", "Pitcher Name", "Events", "HardHit%", "Barrel%"]
        .into_iter()
        .chain(MEANS.iter().map(|(_, out)| *out))
        .collect();
    summary.select(&keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{csv_table, savant};
    use statlayer_core::Value;

    fn events(csv: &str) -> Table {
        csv_table(csv.as_bytes(), savant::EVENT_COLUMNS, "test").unwrap()
    }

    #[test]
    fn test_profiles_count_barrels_and_hard_hits_per_ended_pa() {
        let table = pitcher_profiles(&events(
            "pitcher,player_name,events,release_speed,launch_speed,launch_angle\n\
             10,\"Cole, Gerrit\",single,97.0,99.0,28.0\n\
             10,\"Cole, Gerrit\",,99.0,,\n\
             10,\"Cole, Gerrit\",field_out,,96.0,10.0\n\
             10,\"Cole, Gerrit\",strikeout,95.0,,\n\
             20,\"Steele, Justin\",,91.0,,\n",
        ))
        .unwrap();

        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.value(0, "Pitcher ID"), Some(&Value::Int(10)));
        assert_eq!(table.value(0, "Pitcher Name"), Some(&Value::str("Cole, Gerrit")));
        assert_eq!(table.value(0, "Events"), Some(&Value::Int(3)));
        assert_eq!(table.value(0, "Avg Velo"), Some(&Value::Float(97.0)));
        let hard = table.value(0, "HardHit%").unwrap().as_f64().unwrap();
        assert!((hard - 200.0 / 3.0).abs() < 1e-9);
        let barrel = table.value(0, "Barrel%").unwrap().as_f64().unwrap();
        assert!((barrel - 100.0 / 3.0).abs() < 1e-9);

        // no ended plate appearances: rates are null, not infinite
        assert_eq!(table.value(1, "Events"), Some(&Value::Null));
        assert_eq!(table.value(1, "HardHit%"), Some(&Value::Null));
    }

    #[test]
    fn test_empty_window_keeps_schema() {
        let table = pitcher_profiles(&savant::empty_table(&[]).unwrap()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.num_columns(), 5 + MEANS.len());
    }
}
