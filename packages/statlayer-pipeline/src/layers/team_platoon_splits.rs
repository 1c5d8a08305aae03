//! Team hitting against left- and right-handed pitching.

use super::{stat_values, StatField};
use crate::error::FetchError;
use crate::fanout::{entity_fetch, SubEntityTask};
use crate::layer::{LayerContext, LayerOutput};
use crate::sources::stats::{StatsResponse, TeamRef};
use crate::sources::StatsClient;
use statlayer_core::{derive, ColumnType, Derivation, Expr, Table, TableError, Value};
use tracing::info;

pub const SCOPE: &str = "split";
pub const SPLITS: [&str; 2] = ["vsLHP", "vsRHP"];

const FIELDS: &[StatField] = &[
    ("PA", "plateAppearances", ColumnType::Int),
    ("AB", "atBats", ColumnType::Int),
    ("H", "hits", ColumnType::Int),
    ("2B", "doubles", ColumnType::Int),
    ("3B", "triples", ColumnType::Int),
    ("HR", "homeRuns", ColumnType::Int),
    ("R", "runs", ColumnType::Int),
    ("RBI", "rbi", ColumnType::Int),
    ("BB", "baseOnBalls", ColumnType::Int),
    ("SO", "strikeOuts", ColumnType::Int),
    ("HBP", "hitByPitch", ColumnType::Int),
    ("SB", "stolenBases", ColumnType::Int),
    ("CS", "caughtStealing", ColumnType::Int),
    ("GIDP", "groundIntoDoublePlay", ColumnType::Int),
    ("XBH", "extraBaseHits", ColumnType::Int),
    ("TB", "totalBases", ColumnType::Int),
    ("TOB", "timesOnBase", ColumnType::Int),
    ("LOB", "leftOnBase", ColumnType::Int),
    ("GO", "groundOuts", ColumnType::Int),
    ("AO", "airOuts", ColumnType::Int),
    ("AVG", "avg", ColumnType::Float),
    ("OBP", "obp", ColumnType::Float),
    ("SLG", "slg", ColumnType::Float),
    ("OPS", "ops", ColumnType::Float),
    ("BABIP", "babip", ColumnType::Float),
    ("P/PA", "pitchesPerPlateAppearance", ColumnType::Float),
    ("BB/K", "walksPerStrikeout", ColumnType::Float),
];

pub async fn fetch(ctx: &LayerContext) -> Result<LayerOutput, FetchError> {
    let stats = StatsClient::new(ctx.config())?;
    let teams = stats.teams().await?;

    let mut tasks = Vec::new();
    for team in &teams {
        for &season in &ctx.config().seasons {
            for split in SPLITS {
                let entity = format!("{}-{}-{}", team.id, season, split);
                let key = ctx.entity_key(SCOPE, &entity);
                let (stats, team) = (stats.clone(), team.clone());
                let fetch = entity_fetch(move |_| {
                    let (stats, team) = (stats.clone(), team.clone());
                    async move {
                        let response = stats.team_split_hitting(season, team.id, split).await?;
                        Ok::<_, FetchError>(split_table(&team, season, split, &response)?)
                    }
                });
                tasks.push(SubEntityTask::new(entity, fetch).cached(key));
            }
        }
    }
    info!(
        "team_platoon_splits: {} teams x {} seasons x {} splits",
        teams.len(),
        ctx.config().seasons.len(),
        SPLITS.len()
    );

    let result = ctx.fan_out().run(tasks).await?;
    let table = if result.table.num_columns() == 0 {
        split_table_empty()?
    } else {
        result.table
    };
    Ok(LayerOutput::new(with_rates(&table)?).with_failures(result.failures))
}

fn schema() -> Vec<(&'static str, ColumnType)> {
    let mut schema = vec![
        ("Team", ColumnType::Str),
        ("Season", ColumnType::Int),
        ("Split", ColumnType::Str),
    ];
    schema.extend(FIELDS.iter().map(|(column, _, ty)| (*column, *ty)));
    schema
}

fn split_table_empty() -> Result<Table, TableError> {
    Table::from_rows(&schema(), Vec::new())
}

/// Rows for one team, season and split. Splits with no plate appearances
/// are dropped.
pub fn split_table(
    team: &TeamRef,
    season: i32,
    split: &str,
    response: &StatsResponse,
) -> Result<Table, TableError> {
    let rows = response
        .splits()
        .iter()
        .map(|s| {
            let mut row = vec![
                Value::str(team.name.as_str()),
                Value::Int(season as i64),
                Value::str(split),
            ];
            row.extend(stat_values(&s.stat, FIELDS));
            row
        })
        .filter(|row| matches!(row[3], Value::Int(pa) if pa > 0))
        .collect();
    Table::from_rows(&schema(), rows)
}

pub fn with_rates(table: &Table) -> Result<Table, TableError> {
    derive(
        table,
        &[
            Derivation::new("K%", Expr::col("SO") / Expr::col("PA")),
            Derivation::new("BB%", Expr::col("BB") / Expr::col("PA")),
            Derivation::new("ISO", Expr::col("SLG") - Expr::col("AVG")),
        ],
    )
}
