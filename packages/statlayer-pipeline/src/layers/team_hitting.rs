//! Season hitting totals per team, with rate stats.

use super::{stat_values, StatField};
use crate::error::FetchError;
use crate::layer::{LayerContext, LayerOutput};
use crate::sources::stats::StatsResponse;
use crate::sources::StatsClient;
use statlayer_core::{derive, ColumnType, Derivation, Expr, Table, TableError, Value};
use tracing::info;

const FIELDS: &[StatField] = &[
    ("Plate Appearances", "plateAppearances", ColumnType::Int),
    ("At Bats", "atBats", ColumnType::Int),
    ("Runs", "runs", ColumnType::Int),
    ("RBI", "rbi", ColumnType::Int),
    ("Hits", "hits", ColumnType::Int),
    ("Doubles", "doubles", ColumnType::Int),
    ("Triples", "triples", ColumnType::Int),
    ("Home Runs", "homeRuns", ColumnType::Int),
    ("Strikeouts", "strikeOuts", ColumnType::Int),
    ("Walks", "baseOnBalls", ColumnType::Int),
    ("Hit By Pitch", "hitByPitch", ColumnType::Int),
    ("Sac Flies", "sacFlies", ColumnType::Int),
    ("Sac Bunts", "sacBunts", ColumnType::Int),
    ("Stolen Bases", "stolenBases", ColumnType::Int),
    ("Caught Stealing", "caughtStealing", ColumnType::Int),
    ("Ground Into DP", "groundIntoDoublePlay", ColumnType::Int),
    ("OBP", "obp", ColumnType::Float),
    ("SLG", "slg", ColumnType::Float),
    ("OPS", "ops", ColumnType::Float),
    ("AVG", "avg", ColumnType::Float),
    ("BABIP", "babip", ColumnType::Float),
    ("Total Bases", "totalBases", ColumnType::Int),
    ("Ground Outs", "groundOuts", ColumnType::Int),
    ("Air Outs", "airOuts", ColumnType::Int),
    ("Left On Base", "leftOnBase", ColumnType::Int),
];

const RATE_PLACES: u32 = 3;

pub async fn fetch(ctx: &LayerContext) -> Result<LayerOutput, FetchError> {
    let stats = StatsClient::new(ctx.config())?;
    let mut seasons = Vec::with_capacity(ctx.config().seasons.len());
    for &season in &ctx.config().seasons {
        let response = stats.team_season_hitting(season).await?;
        let table = season_table(season, &response)?;
        info!("team_hitting: {} teams for {}", table.num_rows(), season);
        seasons.push(table);
    }
    let table = Table::concat(&seasons)?;
    Ok(with_rates(&table)?.into())
}

/// One row per team split of a season response.
pub fn season_table(season: i32, response: &StatsResponse) -> Result<Table, TableError> {
    let mut schema = vec![("Season", ColumnType::Int), ("Team", ColumnType::Str)];
    schema.extend(FIELDS.iter().map(|(column, _, ty)| (*column, *ty)));

    let rows = response
        .splits()
        .iter()
        .map(|split| {
            let team = split
                .team
                .as_ref()
                .map(|t| Value::str(t.name.as_str()))
                .unwrap_or(Value::Null);
            let mut row = vec![Value::Int(season as i64), team];
            row.extend(stat_values(&split.stat, FIELDS));
            row
        })
        .collect();
    Table::from_rows(&schema, rows)
}

fn col(name: &str) -> Expr {
    Expr::col(name)
}

pub fn with_rates(table: &Table) -> Result<Table, TableError> {
    let rates = [
        Derivation::new("ISO", col("SLG") - col("AVG")),
        Derivation::new("K%", col("Strikeouts") / col("Plate Appearances")),
        Derivation::new("BB%", col("Walks") / col("Plate Appearances")),
        Derivation::new(
            "XBH%",
            (col("Doubles") + col("Triples") + col("Home Runs")) / col("Hits"),
        ),
        Derivation::new("GB/FB", col("Ground Outs") / col("Air Outs")),
        Derivation::new(
            "SB%",
            col("Stolen Bases") / (col("Stolen Bases") + col("Caught Stealing")),
        ),
        Derivation::new("HBP%", col("Hit By Pitch") / col("Plate Appearances")),
        Derivation::new("SacFly%", col("Sac Flies") / col("Plate Appearances")),
        Derivation::new("GIDP/PA", col("Ground Into DP") / col("Plate Appearances")),
        Derivation::new("RBI/PA", col("RBI") / col("Plate Appearances")),
        Derivation::new("R/PA", col("Runs") / col("Plate Appearances")),
    ];
    let rates: Vec<Derivation> = rates.into_iter().map(|d| d.rounded(RATE_PLACES)).collect();
    derive(table, &rates)
}
