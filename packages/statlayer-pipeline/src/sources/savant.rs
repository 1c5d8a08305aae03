//! Pitch-level event feed (CSV search export).

use super::{csv_table, http::HttpClient};
use crate::config::PipelineConfig;
use crate::error::FetchError;
use chrono::NaiveDate;
use statlayer_core::{Column, ColumnType, Table, TableError, Value};

pub const PITCHER_ID: &str = "pitcher_id";
pub const BATTER_ID: &str = "batter_id";

/// Columns kept from the feed. Anything else in the export is dropped.
pub const EVENT_COLUMNS: &[(&str, ColumnType)] = &[
    ("game_date", ColumnType::Str),
    ("player_name", ColumnType::Str),
    ("batter", ColumnType::Int),
    ("pitcher", ColumnType::Int),
    ("home_team", ColumnType::Str),
    ("inning", ColumnType::Int),
    ("outs_when_up", ColumnType::Int),
    ("strikes", ColumnType::Int),
    ("pitch_type", ColumnType::Str),
    ("description", ColumnType::Str),
    ("events", ColumnType::Str),
    ("release_speed", ColumnType::Float),
    ("release_spin_rate", ColumnType::Float),
    ("launch_speed", ColumnType::Float),
    ("launch_angle", ColumnType::Float),
    ("estimated_woba_using_speedangle", ColumnType::Float),
    ("estimated_ba_using_speedangle", ColumnType::Float),
    ("pfx_z", ColumnType::Float),
    ("pfx_x", ColumnType::Float),
    ("plate_x", ColumnType::Float),
    ("plate_z", ColumnType::Float),
    ("sz_top", ColumnType::Float),
    ("sz_bot", ColumnType::Float),
    ("release_extension", ColumnType::Float),
    ("release_pos_x", ColumnType::Float),
    ("release_pos_z", ColumnType::Float),
];

/// Whose pitches a search returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerFilter {
    Pitcher(i64),
    Batter(i64),
    League,
}

#[derive(Clone)]
pub struct SavantClient {
    http: HttpClient,
}

impl SavantClient {
    pub fn new(config: &PipelineConfig) -> Result<Self, FetchError> {
        Ok(Self {
            http: HttpClient::new(
                &config.savant_url,
                config.fanout_concurrency,
                config.request_timeout(),
            )?,
        })
    }

    /// Regular-season pitches thrown by one pitcher between `start` and
    /// `end`, tagged with a `pitcher_id` column.
    pub async fn pitch_events(
        &self,
        pitcher_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Table, FetchError> {
        let body = self.search(PlayerFilter::Pitcher(pitcher_id), start, end).await?;
        events_table(pitcher_id, &body)
    }

    /// Regular-season pitches seen by one batter, tagged with `batter_id`.
    pub async fn batter_events(
        &self,
        batter_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Table, FetchError> {
        let body = self.search(PlayerFilter::Batter(batter_id), start, end).await?;
        tagged_events(BATTER_ID, batter_id, &body)
    }

    /// Every regular-season pitch league-wide in the window. The export
    /// is large; callers split long ranges into short windows.
    pub async fn league_events(&self, start: NaiveDate, end: NaiveDate) -> Result<Table, FetchError> {
        let body = self.search(PlayerFilter::League, start, end).await?;
        if body.trim().is_empty() {
            return Ok(empty_table(&[])?);
        }
        csv_table(body.as_bytes(), EVENT_COLUMNS, "savant")
    }

    async fn search(
        &self,
        filter: PlayerFilter,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<String, FetchError> {
        let mut query = vec![
            ("all", "true".to_string()),
            ("hfGT", "R|".to_string()),
            ("game_date_gt", start.format("%Y-%m-%d").to_string()),
            ("game_date_lt", end.format("%Y-%m-%d").to_string()),
            ("type", "details".to_string()),
        ];
        match filter {
            PlayerFilter::Pitcher(id) => {
                query.push(("player_type", "pitcher".to_string()));
                query.push(("pitchers_lookup[]", id.to_string()));
            }
            PlayerFilter::Batter(id) => {
                query.push(("player_type", "batter".to_string()));
                query.push(("batters_lookup[]", id.to_string()));
            }
            PlayerFilter::League => query.push(("player_type", "pitcher".to_string())),
        }
        self.http.get_text("/statcast_search/csv", &query).await
    }
}

/// Parse one pitcher's CSV export. A blank body is a pitcher with no
/// pitches in the window, not an error.
pub fn events_table(pitcher_id: i64, body: &str) -> Result<Table, FetchError> {
    tagged_events(PITCHER_ID, pitcher_id, body)
}

fn tagged_events(tag: &str, id: i64, body: &str) -> Result<Table, FetchError> {
    if body.trim().is_empty() {
        return Ok(empty_table(&[tag])?);
    }
    let events = csv_table(body.as_bytes(), EVENT_COLUMNS, "savant")?;
    let ids = Column::new(tag, ColumnType::Int, vec![Value::Int(id); events.num_rows()])?;
    Ok(events.with_column(ids)?)
}

/// Zero-row event table with the full column set, `pitcher_id` included.
pub fn empty_events() -> Result<Table, FetchError> {
    Ok(empty_table(&[PITCHER_ID])?)
}

/// Zero-row event table plus the given Int tag columns.
pub fn empty_table(tags: &[&str]) -> Result<Table, TableError> {
    let columns = EVENT_COLUMNS
        .iter()
        .map(|(name, ty)| Column::nulls(*name, *ty, 0))
        .chain(tags.iter().map(|t| Column::nulls(*t, ColumnType::Int, 0)))
        .collect();
    Table::with_row_count(columns, 0)
}
