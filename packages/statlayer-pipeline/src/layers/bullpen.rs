//! Relief-pitching aggregates per home team over the trailing year.

use super::statcast::{self, FlagFn, SWING_DESCRIPTIONS, WHIFF_DESCRIPTIONS};
use crate::error::FetchError;
use crate::layer::{LayerContext, LayerOutput};
use statlayer_core::{derive, summarize, Derivation, Expr, Metric, Table, TableError};
use std::collections::HashSet;
use tracing::info;

const WINDOW_DAYS: i64 = 365;

const MEANS: &[(&str, &str)] = &[
    ("launch_speed", "Avg EV"),
    ("launch_angle", "Avg LA"),
    ("estimated_woba_using_speedangle", "xwOBA"),
    ("estimated_ba_using_speedangle", "xBA"),
    ("release_speed", "Release Velo"),
    ("release_extension", "Release Extension"),
    ("release_spin_rate", "Spin Rate"),
];

const FLAGS: &[(&str, FlagFn)] = &[
    ("swing", |row| Some(statcast::description_in(row, SWING_DESCRIPTIONS))),
    ("whiff", |row| Some(statcast::description_in(row, WHIFF_DESCRIPTIONS))),
    ("k", |row| Some(statcast::event_is(row, "strikeout"))),
    ("bb", |row| Some(statcast::event_is(row, "walk"))),
    ("hr", |row| Some(statcast::event_is(row, "home_run"))),
    ("hard", |row| Some(statcast::hard_hit(row))),
];

pub async fn fetch(ctx: &LayerContext) -> Result<LayerOutput, FetchError> {
    let (events, failures) = statcast::league_window(ctx, WINDOW_DAYS).await?;
    let relief = relief_pitches(&events);
    info!(
        "bullpen: {} relief pitches of {}",
        relief.num_rows(),
        events.num_rows()
    );
    let table = bullpen_summary(&relief)?;
    Ok(LayerOutput::new(table).with_failures(failures))
}

/// Drop every pitch by a pitcher who ever faced the first batter of a
/// game, i.e. threw in the first inning with nobody out.
pub fn relief_pitches(events: &Table) -> Table {
    let starters: HashSet<i64> = events
        .rows()
        .filter(|row| {
            row.get("inning").as_i64() == Some(1) && row.get("outs_when_up").as_i64() == Some(0)
        })
        .filter_map(|row| row.get("pitcher").as_i64())
        .collect();
    events.filter(|row| {
        row.get("pitcher")
            .as_i64()
            .map_or(true, |p| !starters.contains(&p))
    })
}

/// One row per team. Rates are fractions; `PA` counts pitches.
pub fn bullpen_summary(relief: &Table) -> Result<Table, TableError> {
    let flagged = statcast::with_flags(relief, FLAGS)?;

    let mut metrics = vec![
        Metric::count("home_team").named("PA"),
        Metric::sum("swing").named("Swings"),
        Metric::sum("whiff").named("Whiffs"),
        Metric::sum("k").named("Ks"),
        Metric::sum("bb").named("BBs"),
        Metric::sum("hr").named("HRs"),
        Metric::sum("hard").named("HardHits"),
    ];
    metrics.extend(MEANS.iter().map(|(src, out)| Metric::mean(*src).named(*out)));
    let summary = summarize(&flagged, &["home_team"], &metrics)?;

    let col = Expr::col;
    let summary = derive(
        &summary,
        &[
            Derivation::new("Whiff%", col("Whiffs") / col("Swings")),
            Derivation::new("K%", col("Ks") / col("PA")),
            Derivation::new("BB%", col("BBs") / col("PA")),
            Derivation::new("HR/9", col("HRs") / (col("PA") / Expr::lit(3.0)) * Expr::lit(9.0)),
            Derivation::new("HardHit%", col("HardHits") / col("PA")),
        ],
    )?;
    let summary = summary.rename(&[("home_team", "Team")])?;

    let keep: Vec<&str> = ["Team", "PA", "Whiff%", "K%", "BB%", "HR/9", "HardHit%"]
        .into_iter()
        .chain(MEANS.iter().map(|(_, out)| *out))
        .collect();
    summary.select(&keep)
}
