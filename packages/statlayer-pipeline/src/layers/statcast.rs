//! Shared pieces of the pitch-level summary layers: the league-wide event
//! window, pulled as cached week-long chunks, and per-pitch indicator
//! columns.

use crate::checkpoint::CheckpointKey;
use crate::error::FetchError;
use crate::fanout::{entity_fetch, EntityFailure, EntityId, SubEntityTask};
use crate::layer::LayerContext;
use crate::sources::savant;
use crate::sources::SavantClient;
use chrono::{Duration, NaiveDate};
use statlayer_core::{Column, ColumnType, Row, Table, TableError, Value};
use tracing::info;

/// Chunk cache namespace. Shared by every layer so overlapping windows
/// fetch each chunk once per run date.
pub const WINDOW_NAMESPACE: &str = "statcast-window";
const CHUNK_DAYS: i64 = 7;

pub const SWING_DESCRIPTIONS: &[&str] = &[
    "swinging_strike",
    "foul",
    "foul_tip",
    "hit_into_play",
    "hit_into_play_score",
    "hit_into_play_no_out",
];
pub const WHIFF_DESCRIPTIONS: &[&str] = &["swinging_strike", "swinging_strike_blocked"];
pub const HARD_HIT_EV: f64 = 95.0;

/// Per-row predicate behind an indicator column. `None` leaves the cell null.
pub type FlagFn = fn(Row<'_>) -> Option<bool>;

/// Inclusive `[start, end]` windows of at most a week, counted back from
/// `end` so windows ending on the same day share chunk boundaries.
pub fn chunks(start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let mut out = Vec::new();
    let mut hi = end;
    while hi >= start {
        let lo = (hi - Duration::days(CHUNK_DAYS - 1)).max(start);
        out.push((lo, hi));
        hi = lo - Duration::days(1);
    }
    out.reverse();
    out
}

fn chunk_id(lo: NaiveDate, hi: NaiveDate) -> String {
    format!("{}_{}", lo.format("%Y-%m-%d"), hi.format("%Y-%m-%d"))
}

fn parse_chunk(id: &str) -> Option<(NaiveDate, NaiveDate)> {
    let (lo, hi) = id.split_once('_')?;
    Some((
        NaiveDate::parse_from_str(lo, "%Y-%m-%d").ok()?,
        NaiveDate::parse_from_str(hi, "%Y-%m-%d").ok()?,
    ))
}

/// Every league pitch in the `days` up to and including the run date.
/// A failed chunk leaves a gap reported as an entity failure.
pub async fn league_window(
    ctx: &LayerContext,
    days: i64,
) -> Result<(Table, Vec<EntityFailure>), FetchError> {
    let end = ctx.as_of();
    let start = end - Duration::days(days - 1);
    let savant = SavantClient::new(ctx.config())?;
    let fetch = entity_fetch(move |entity| {
        let savant = savant.clone();
        async move {
            match &entity {
                EntityId::Str(id) => match parse_chunk(id) {
                    Some((lo, hi)) => savant.league_events(lo, hi).await,
                    None => Err(FetchError::Unavailable(format!("not a date window: {}", id))),
                },
                other => Err(FetchError::Unavailable(format!("not a date window: {}", other))),
            }
        }
    });

    let windows = chunks(start, end);
    info!(
        "{}: league events {}..{} in {} chunks",
        ctx.layer(),
        start,
        end,
        windows.len()
    );
    let tasks = windows
        .into_iter()
        .map(|(lo, hi)| {
            let id = chunk_id(lo, hi);
            let key = CheckpointKey::entity(WINDOW_NAMESPACE, end, &id);
            SubEntityTask::new(id, fetch.clone()).cached(key)
        })
        .collect();
    let result = ctx.fan_out().run(tasks).await?;

    let table = if result.table.num_columns() == 0 {
        savant::empty_table(&[])?
    } else {
        result.table
    };
    Ok((table, result.failures))
}

/// Int 0/1 column from `pred`.
pub fn flag(events: &Table, name: &str, pred: FlagFn) -> Result<Column, TableError> {
    let values = events
        .rows()
        .map(|row| match pred(row) {
            Some(true) => Value::Int(1),
            Some(false) => Value::Int(0),
            None => Value::Null,
        })
        .collect();
    Column::new(name, ColumnType::Int, values)
}

/// Append one indicator column per `(name, predicate)`.
pub fn with_flags(events: &Table, flags: &[(&str, FlagFn)]) -> Result<Table, TableError> {
    flags
        .iter()
        .try_fold(events.clone(), |table, (name, pred)| {
            let column = flag(&table, name, *pred)?;
            table.with_column(column)
        })
}

pub fn description_in(row: Row<'_>, set: &[&str]) -> bool {
    row.get("description").as_str().is_some_and(|d| set.contains(&d))
}

pub fn event_is(row: Row<'_>, outcome: &str) -> bool {
    row.get("events").as_str() == Some(outcome)
}

/// Batted ball at or above the hard-hit exit velocity; false when no
/// ball was put in play.
pub fn hard_hit(row: Row<'_>) -> bool {
    row.get("launch_speed").as_f64().is_some_and(|ev| ev >= HARD_HIT_EV)
}
