//! Probable starting pitchers for a date, with each starter's pitch-level
//! profile over the trailing year.

use crate::error::FetchError;
use crate::fanout::{entity_fetch, EntityId, SubEntityTask};
use crate::layer::{LayerContext, LayerOutput};
use crate::sources::savant::{self, PITCHER_ID};
use crate::sources::stats::Schedule;
use crate::sources::{parse_timestamp, SavantClient, StatsClient};
use chrono::Duration;
use statlayer_core::{
    derive, summarize, Column, ColumnType, Derivation, Expr, Metric, Table, TableError, Value,
};
use std::collections::BTreeSet;
use tracing::info;

pub const SCOPE: &str = "pitcher";
const LOOKBACK_DAYS: i64 = 365;
const UNKNOWN_PITCHER: &str = "TBD";

/// Per-pitcher means: (event column, summary column, side-prefixed suffix).
const MEAN_STATS: &[(&str, &str, &str)] = &[
    ("release_speed", "Velo", "Velo"),
    ("release_spin_rate", "Spin", "Spin"),
    ("launch_speed", "HardHit", "Hard Hit %"),
    ("estimated_woba_using_speedangle", "xwOBA", "xwOBA"),
    ("estimated_ba_using_speedangle", "xBA", "xBA"),
    ("pfx_z", "VertBreak", "Vert Break"),
    ("pfx_x", "HorzBreak", "Horz Break"),
    ("release_extension", "ReleaseExtension", "Release Extension"),
    ("release_pos_x", "ReleasePosX", "Rel Pos X"),
    ("release_pos_z", "ReleasePosZ", "Rel Pos Z"),
];

const RATE_STATS: &[(&str, &str)] = &[("K %", "K %"), ("BB %", "BB %")];

pub async fn fetch(ctx: &LayerContext) -> Result<LayerOutput, FetchError> {
    let date = ctx.as_of();
    let schedule = StatsClient::new(ctx.config())?
        .schedule(date, "probablePitcher(note)")
        .await?;
    let matchups = matchups_table(&schedule)?;

    let pitcher_ids: BTreeSet<i64> = ["Away Pitcher ID", "Home Pitcher ID"]
        .iter()
        .filter_map(|c| matchups.column(c))
        .flat_map(|c| c.values().iter().filter_map(Value::as_i64))
        .collect();
    info!(
        "{} probable starters across {} games on {}",
        pitcher_ids.len(),
        matchups.num_rows(),
        date
    );

    let savant = SavantClient::new(ctx.config())?;
    let start = date - Duration::days(LOOKBACK_DAYS);
    let fetch = entity_fetch(move |entity| {
        let savant = savant.clone();
        async move {
            match entity {
                EntityId::Int(id) => savant.pitch_events(id, start, date).await,
                other => Err(FetchError::Unavailable(format!("not a pitcher id: {}", other))),
            }
        }
    });
    let tasks = pitcher_ids
        .into_iter()
        .map(|id| SubEntityTask::new(id, fetch.clone()).cached(ctx.entity_key(SCOPE, id)))
        .collect();
    let result = ctx.fan_out().run(tasks).await?;

    let events = if result.table.num_columns() == 0 {
        savant::empty_events()?
    } else {
        result.table
    };
    let summary = pitcher_summary(&events)?;
    let table = attach_side(&matchups, &summary, "Away")?;
    let table = attach_side(&table, &summary, "Home")?;

    Ok(LayerOutput::new(table).with_failures(result.failures))
}

/// One row per game with both probable pitchers announced.
pub fn matchups_table(schedule: &Schedule) -> Result<Table, TableError> {
    let mut rows = Vec::new();
    for game in schedule.games() {
        let (Some(away), Some(home)) = (
            game.teams.away.probable_pitcher.as_ref(),
            game.teams.home.probable_pitcher.as_ref(),
        ) else {
            continue;
        };
        let name = |p: &crate::sources::stats::PersonRef| {
            Value::str(p.full_name.as_deref().unwrap_or(UNKNOWN_PITCHER))
        };
        rows.push(vec![
            Value::Int(game.game_pk),
            game.game_date
                .as_deref()
                .and_then(parse_timestamp)
                .into(),
            Value::str(game.teams.away.team.name.as_str()),
            Value::str(game.teams.home.team.name.as_str()),
            name(away),
            Value::Int(away.id),
            name(home),
            Value::Int(home.id),
        ]);
    }
    Table::from_rows(
        &[
            ("GamePk", ColumnType::Int),
            ("Game Time (UTC)", ColumnType::Timestamp),
            ("Away Team", ColumnType::Str),
            ("Home Team", ColumnType::Str),
            ("Away Pitcher", ColumnType::Str),
            ("Away Pitcher ID", ColumnType::Int),
            ("Home Pitcher", ColumnType::Str),
            ("Home Pitcher ID", ColumnType::Int),
        ],
        rows,
    )
}

/// 1 when the plate appearance ended in `outcome`, 0 for any other
/// outcome, null for pitches that ended nothing.
fn outcome_flag(events: &Table, outcome: &str, name: &str) -> Result<Column, TableError> {
    let values = events
        .rows()
        .map(|row| match row.get("events").as_str() {
            Some(e) if e == outcome => Value::Int(1),
            Some(_) => Value::Int(0),
            None => Value::Null,
        })
        .collect();
    Column::new(name, ColumnType::Int, values)
}

/// Reduce pitch events to one row per pitcher.
///
/// `Pitches` counts pitches that ended a plate appearance; K % and BB % are
/// null when there are none.
pub fn pitcher_summary(events: &Table) -> Result<Table, TableError> {
    let events = events
        .with_column(outcome_flag(events, "strikeout", "K_flag")?)?
        .with_column(outcome_flag(events, "walk", "BB_flag")?)?;

    let mut metrics: Vec<Metric> = MEAN_STATS
        .iter()
        .map(|(source, out, _)| Metric::mean(*source).named(*out))
        .collect();
    metrics.push(Metric::sum("K_flag").named("K_cnt"));
    metrics.push(Metric::sum("BB_flag").named("BB_cnt"));
    metrics.push(Metric::count("events").named("Pitches"));

    let summary = summarize(&events, &[PITCHER_ID], &metrics)?;
    let summary = derive(
        &summary,
        &[
            Derivation::new("K %", Expr::pct(Expr::col("K_cnt"), Expr::col("Pitches"))),
            Derivation::new("BB %", Expr::pct(Expr::col("BB_cnt"), Expr::col("Pitches"))),
        ],
    )?;

    let keep: Vec<&str> = std::iter::once(PITCHER_ID)
        .chain(MEAN_STATS.iter().map(|(_, out, _)| *out))
        .chain(RATE_STATS.iter().map(|(out, _)| *out))
        .collect();
    summary.select(&keep)
}

/// Left-join the pitcher summary onto one side of the matchups, prefixing
/// every stat with the side.
pub fn attach_side(matchups: &Table, summary: &Table, side: &str) -> Result<Table, TableError> {
    let key = format!("{} Pitcher ID", side);
    let renamed: Vec<(String, String)> = std::iter::once((PITCHER_ID.to_string(), key.clone()))
        .chain(
            MEAN_STATS
                .iter()
                .map(|(_, out, suffix)| (out.to_string(), format!("{} {}", side, suffix))),
        )
        .chain(
            RATE_STATS
                .iter()
                .map(|(out, suffix)| (out.to_string(), format!("{} {}", side, suffix))),
        )
        .collect();
    let pairs: Vec<(&str, &str)> = renamed
        .iter()
        .map(|(from, to)| (from.as_str(), to.as_str()))
        .collect();
    matchups.left_join(&summary.rename(&pairs)?, &key, &key)
}
