//! Moneyline, spread and total prices per bookmaker.

use crate::error::FetchError;
use crate::layer::{LayerContext, LayerOutput};
use crate::sources::odds::OddsEvent;
use crate::sources::{parse_timestamp, OddsClient};
use statlayer_core::{derive, ColumnType, Derivation, Expr, Table, TableError, Value};
use tracing::info;

const COLUMNS: &[&str] = &[
    "GamePk",
    "Bookmaker",
    "MarketType",
    "TeamOrPlayer",
    "Odds",
    "ImpliedProb",
    "Line",
    "HomeTeam",
    "AwayTeam",
    "CommenceTime",
    "LastUpdate",
];

pub async fn fetch(ctx: &LayerContext) -> Result<LayerOutput, FetchError> {
    let events = OddsClient::new(ctx.config())?.odds().await?;
    let table = odds_table(&events)?;
    info!(
        "betting_odds: {} prices across {} games",
        table.num_rows(),
        events.len()
    );
    Ok(table.into())
}

/// One row per outcome price. Implied probability is `100 / price` to two
/// places, null for a missing or zero price.
pub fn odds_table(events: &[OddsEvent]) -> Result<Table, TableError> {
    let mut rows = Vec::new();
    for event in events {
        for book in &event.bookmakers {
            let bookmaker = book.title.clone().unwrap_or_else(|| book.key.clone());
            for market in &book.markets {
                for outcome in &market.outcomes {
                    rows.push(vec![
                        Value::str(event.id.as_str()),
                        Value::str(bookmaker.as_str()),
                        Value::str(market.key.as_str()),
                        Value::str(outcome.name.as_str()),
                        outcome.price.into(),
                        outcome.point.into(),
                        event.home_team.clone().into(),
                        event.away_team.clone().into(),
                        event.commence_time.as_deref().and_then(parse_timestamp).into(),
                        book.last_update.as_deref().and_then(parse_timestamp).into(),
                    ]);
                }
            }
        }
    }

    let prices = Table::from_rows(
        &[
            ("GamePk", ColumnType::Str),
            ("Bookmaker", ColumnType::Str),
            ("MarketType", ColumnType::Str),
            ("TeamOrPlayer", ColumnType::Str),
            ("Odds", ColumnType::Float),
            ("Line", ColumnType::Float),
            ("HomeTeam", ColumnType::Str),
            ("AwayTeam", ColumnType::Str),
            ("CommenceTime", ColumnType::Timestamp),
            ("LastUpdate", ColumnType::Timestamp),
        ],
        rows,
    )?;
    let priced = derive(
        &prices,
        &[Derivation::new("ImpliedProb", Expr::lit(100.0) / Expr::col("Odds")).rounded(2)],
    )?;
    priced.select(COLUMNS)
}
