//! Venue and weather for each game scheduled on a date.

use crate::error::FetchError;
use crate::layer::{LayerContext, LayerOutput};
use crate::sources::stats::{Schedule, Weather};
use crate::sources::{json_i64, parse_timestamp, StatsClient};
use statlayer_core::{ColumnType, Table, TableError, Value};
use tracing::info;

pub async fn fetch(ctx: &LayerContext) -> Result<LayerOutput, FetchError> {
    let schedule = StatsClient::new(ctx.config())?
        .schedule(ctx.as_of(), "venue,weather")
        .await?;
    let table = conditions_table(&schedule)?;
    info!("game_conditions: {} games on {}", table.num_rows(), ctx.as_of());
    Ok(table.into())
}

/// Split `"10 mph, Out To CF"` into speed and direction. Either part may
/// be missing.
pub fn parse_wind(wind: &str) -> (Option<i64>, Option<String>) {
    let (speed, direction) = match wind.split_once(',') {
        Some((speed, direction)) => (speed, Some(direction.trim())),
        None => (wind, None),
    };
    let speed = speed
        .trim()
        .trim_end_matches("mph")
        .trim()
        .parse::<i64>()
        .ok();
    let direction = direction.filter(|d| !d.is_empty()).map(str::to_string);
    (speed, direction)
}

fn wind_columns(weather: &Weather) -> (Value, Value, Value) {
    let (parsed_speed, parsed_direction) = weather
        .wind
        .as_deref()
        .map(parse_wind)
        .unwrap_or((None, None));
    let speed = match json_i64(weather.wind_speed.as_ref()) {
        Value::Null => parsed_speed.into(),
        speed => speed,
    };
    let direction = weather
        .wind_direction
        .clone()
        .or(parsed_direction)
        .into();
    (weather.wind.clone().into(), speed, direction)
}

pub fn conditions_table(schedule: &Schedule) -> Result<Table, TableError> {
    let rows = schedule
        .games()
        .map(|game| {
            let weather = game.weather.clone().unwrap_or_default();
            let (wind, speed, direction) = wind_columns(&weather);
            let venue = game.venue.as_ref();
            vec![
                Value::Int(game.game_pk),
                game.official_date.clone().into(),
                game.game_date.as_deref().and_then(parse_timestamp).into(),
                game.game_type.clone().into(),
                game.series_description.clone().into(),
                game.series_game_number.into(),
                game.double_header.clone().into(),
                venue.and_then(|v| v.name.clone()).into(),
                venue.and_then(|v| v.id).into(),
                Value::str(game.teams.home.team.name.as_str()),
                Value::str(game.teams.away.team.name.as_str()),
                weather.condition.clone().into(),
                json_i64(weather.temp.as_ref()),
                wind,
                speed,
                direction,
            ]
        })
        .collect();

    Table::from_rows(
        &[
            ("GamePk", ColumnType::Int),
            ("Official Date", ColumnType::Str),
            ("Game Time (UTC)", ColumnType::Timestamp),
            ("Game Type", ColumnType::Str),
            ("Series Description", ColumnType::Str),
            ("Series Game Number", ColumnType::Int),
            ("Doubleheader", ColumnType::Str),
            ("Venue", ColumnType::Str),
            ("Venue ID", ColumnType::Int),
            ("Home Team", ColumnType::Str),
            ("Away Team", ColumnType::Str),
            ("Condition", ColumnType::Str),
            ("Temp (F)", ColumnType::Int),
            ("Wind", ColumnType::Str),
            ("Wind Speed (mph)", ColumnType::Int),
            ("Wind Direction", ColumnType::Str),
        ],
        rows,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_wind() {
        assert_eq!(parse_wind("10 mph, Out To CF"), (Some(10), Some("Out To CF".to_string())));
        assert_eq!(parse_wind("0 mph, None"), (Some(0), Some("None".to_string())));
        assert_eq!(parse_wind("Calm"), (None, None));
        assert_eq!(parse_wind(""), (None, None));
    }

    #[test]
    fn test_conditions_table() {
        let schedule: Schedule = serde_json::from_value(json!({
            "dates": [{"games": [
                {
                    "gamePk": 745001,
                    "officialDate": "2024-04-01",
                    "gameDate": "2024-04-01T18:20:00Z",
                    "gameType": "R",
                    "seriesGameNumber": 1,
                    "doubleHeader": "N",
                    "venue": {"id": 17, "name": "Wrigley Field"},
                    "teams": {
                        "away": {"team": {"id": 121, "name": "New York Mets"}},
                        "home": {"team": {"id": 112, "name": "Chicago Cubs"}}
                    },
                    "weather": {"condition": "Cloudy", "temp": "48", "wind": "12 mph, In From RF"}
                },
                {
                    "gamePk": 745002,
                    "teams": {
                        "away": {"team": {"id": 1, "name": "A"}},
                        "home": {"team": {"id": 2, "name": "B"}}
                    }
                }
            ]}]
        }))
        .unwrap();

        let table = conditions_table(&schedule).unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.value(0, "Venue"), Some(&Value::str("Wrigley Field")));
        assert_eq!(table.value(0, "Temp (F)"), Some(&Value::Int(48)));
        assert_eq!(table.value(0, "Wind Speed (mph)"), Some(&Value::Int(12)));
        assert_eq!(table.value(0, "Wind Direction"), Some(&Value::str("In From RF")));
        assert_eq!(table.value(1, "Condition"), Some(&Value::Null));
        assert_eq!(table.value(1, "Venue ID"), Some(&Value::Null));
    }
}
