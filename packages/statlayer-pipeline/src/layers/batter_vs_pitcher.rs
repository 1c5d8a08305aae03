//! Head-to-head batter/pitcher lines over the year before the run date.

use super::statcast::{self, FlagFn};
use crate::error::FetchError;
use crate::layer::{LayerContext, LayerOutput};
use statlayer_core::{derive, summarize, Derivation, Expr, Metric, Row, Table, TableError};
use tracing::info;

const WINDOW_DAYS: i64 = 365;
const HIT_EVENTS: &[&str] = &["single", "double", "triple", "home_run"];

fn description_has(row: Row<'_>, needle: &str) -> bool {
    row.get("description").as_str().is_some_and(|d| d.contains(needle))
}

const FLAGS: &[(&str, FlagFn)] = &[
    ("is_hit", |row| {
        Some(row.get("events").as_str().is_some_and(|e| HIT_EVENTS.contains(&e)))
    }),
    ("is_hr", |row| Some(statcast::event_is(row, "home_run"))),
    ("is_bb", |row| Some(description_has(row, "walk"))),
    ("is_k", |row| Some(description_has(row, "strikeout"))),
];

pub async fn fetch(ctx: &LayerContext) -> Result<LayerOutput, FetchError> {
    let (events, failures) = statcast::league_window(ctx, WINDOW_DAYS).await?;
    let table = matchup_lines(&events)?;
    info!("batter_vs_pitcher: {} matchups", table.num_rows());
    Ok(LayerOutput::new(table).with_failures(failures))
}

/// One row per (batter, pitcher) pair. `PA` counts tracked pitches; rates
/// are rounded to three places and null when the pair has none.
pub fn matchup_lines(events: &Table) -> Result<Table, TableError> {
    let events = events.filter(|row| {
        ["batter", "pitcher", "description"]
            .iter()
            .all(|c| !row.get(c).is_null())
    });
    let flagged = statcast::with_flags(&events, FLAGS)?;

    let summary = summarize(
        &flagged,
        &["batter", "pitcher"],
        &[
            Metric::max("player_name").named("Pitcher Name"),
            Metric::count("pitch_type").named("PA"),
            Metric::sum("is_hit").named("Hits"),
            Metric::sum("is_hr").named("HR"),
            Metric::sum("is_bb").named("BB"),
            Metric::sum("is_k").named("K"),
        ],
    )?;

    let col = Expr::col;
    let avg = col("Hits") / col("PA");
    let obp = (col("Hits") + col("BB")) / col("PA");
    let slg = (col("Hits") + Expr::lit(2.0) * col("HR")) / col("PA");
    let summary = derive(
        &summary,
        &[
            Derivation::new("AVG", avg.clone()).rounded(3),
            Derivation::new("OBP", obp.clone()).rounded(3),
            Derivation::new("SLG", slg.clone()).rounded(3),
            Derivation::new("OPS", obp + slg.clone()).rounded(3),
            Derivation::new("ISO", slg - avg).rounded(3),
            Derivation::new("K%", col("K") / col("PA")).rounded(3),
            Derivation::new("BB%", col("BB") / col("PA")).rounded(3),
        ],
    )?;
    summary.rename(&[("batter", "Batter ID"), ("pitcher", "Pitcher ID")])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{csv_table, savant};
    use pretty_assertions::assert_eq;
    use statlayer_core::Value;

    fn events() -> Table {
        csv_table(
            "batter,pitcher,player_name,pitch_type,description,events\n\
             1,10,\"Cole, Gerrit\",FF,hit_into_play,home_run\n\
             1,10,\"Cole, Gerrit\",SL,hit_into_play,single\n\
             1,10,\"Cole, Gerrit\",FF,called_strike,\n\
             1,10,\"Cole, Gerrit\",,ball,\n\
             1,20,\"Steele, Justin\",FF,,walk\n\
             2,10,\"Cole, Gerrit\",CH,swinging_strike,strikeout\n"
                .as_bytes(),
            savant::EVENT_COLUMNS,
            "test",
        )
        .unwrap()
    }

    #[test]
    fn test_matchup_line_rates() {
        let table = matchup_lines(&events()).unwrap();

        // the pitch without a description never forms a pair
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.value(0, "Batter ID"), Some(&Value::Int(1)));
        assert_eq!(table.value(0, "Pitcher ID"), Some(&Value::Int(10)));
        assert_eq!(table.value(0, "Pitcher Name"), Some(&Value::str("Cole, Gerrit")));
        assert_eq!(table.value(0, "PA"), Some(&Value::Int(3)));
        assert_eq!(table.value(0, "Hits"), Some(&Value::Int(2)));
        assert_eq!(table.value(0, "AVG"), Some(&Value::Float(0.667)));
        // (2 + 2 * 1) / 3
        assert_eq!(table.value(0, "SLG"), Some(&Value::Float(1.333)));
        assert_eq!(table.value(0, "ISO"), Some(&Value::Float(0.667)));
        assert_eq!(table.value(0, "OPS"), Some(&Value::Float(2.0)));

        assert_eq!(table.value(1, "Batter ID"), Some(&Value::Int(2)));
        assert_eq!(table.value(1, "K"), Some(&Value::Int(0)));
        assert_eq!(table.value(1, "K%"), Some(&Value::Float(0.0)));
    }
}
