//! How each of the day's hitters fares against the pitch types the
//! opposing probable starter actually throws.
//!
//! Three fan-outs: one boxscore per game for the hitters, one pitch mix
//! per opposing starter, one per-pitch-type overlay per hitter. Mixes and
//! overlays are cached per entity, so a rerun on the same date only pulls
//! what failed.

use super::statcast::{self, FlagFn, SWING_DESCRIPTIONS, WHIFF_DESCRIPTIONS};
use crate::error::FetchError;
use crate::fanout::{entity_fetch, EntityId, SubEntityTask};
use crate::layer::{LayerContext, LayerOutput};
use crate::sources::parse_timestamp;
use crate::sources::savant::{BATTER_ID, PITCHER_ID};
use crate::sources::stats::{Boxscore, ScheduleGame};
use crate::sources::{SavantClient, StatsClient};
use chrono::Duration;
use statlayer_core::{
    derive, summarize, Column, ColumnType, Derivation, Expr, Metric, Row, Table, TableError,
    Value,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::info;

pub const PITCHER_SCOPE: &str = "pitcher";
pub const BATTER_SCOPE: &str = "batter";
const LOOKBACK_DAYS: i64 = 365;
/// Pitch types thrown less often than this are ignored.
const MIN_SHARE: f64 = 0.05;
const TOP_PITCHES: usize = 3;
const PITCH_TYPE: &str = "Pitch Type";

const HITTER_SCHEMA: &[(&str, ColumnType)] = &[
    ("GamePk", ColumnType::Int),
    ("Game Time (UTC)", ColumnType::Timestamp),
    ("Team", ColumnType::Str),
    ("Batter", ColumnType::Str),
    ("Batter ID", ColumnType::Int),
    ("Opposing Pitcher ID", ColumnType::Int),
];

const MEANS: &[(&str, &str)] = &[
    ("estimated_woba_using_speedangle", "xwOBA"),
    ("estimated_ba_using_speedangle", "xBA"),
    ("launch_speed", "Avg EV"),
    ("launch_angle", "Avg LA"),
    ("release_speed", "release_speed"),
    ("release_pos_x", "release_pos_x"),
    ("release_pos_z", "release_pos_z"),
    ("pfx_x", "pfx_x"),
    ("pfx_z", "pfx_z"),
    ("plate_x", "plate_x"),
    ("plate_z", "plate_z"),
    ("sz_top", "sz_top"),
    ("sz_bot", "sz_bot"),
];

fn two_strikes(row: Row<'_>) -> bool {
    row.get("strikes").as_i64() == Some(2)
}

const FLAGS: &[(&str, FlagFn)] = &[
    ("Swings", |row| Some(statcast::description_in(row, SWING_DESCRIPTIONS))),
    ("Whiffs", |row| Some(statcast::description_in(row, WHIFF_DESCRIPTIONS))),
    ("Strikeouts", |row| Some(statcast::event_is(row, "strikeout"))),
    ("PutAwaySwings", |row| {
        Some(two_strikes(row) && statcast::description_in(row, &["swinging_strike"]))
    }),
    ("TwoStrikePitches", |row| Some(two_strikes(row))),
    ("HardHits", |row| Some(statcast::hard_hit(row))),
];

pub async fn fetch(ctx: &LayerContext) -> Result<LayerOutput, FetchError> {
    let date = ctx.as_of();
    let start = date - Duration::days(LOOKBACK_DAYS);
    let stats = StatsClient::new(ctx.config())?;
    let schedule = stats.schedule(date, "probablePitcher").await?;

    let games: HashMap<i64, ScheduleGame> = schedule
        .games()
        .filter(|g| {
            g.teams.home.probable_pitcher.is_some() || g.teams.away.probable_pitcher.is_some()
        })
        .map(|g| (g.game_pk, g.clone()))
        .collect();
    let game_pks: BTreeSet<i64> = games.keys().copied().collect();
    let games = Arc::new(games);
    let roster_fetch = entity_fetch(move |entity| {
        let stats = stats.clone();
        let games = games.clone();
        async move {
            let game = match &entity {
                EntityId::Int(pk) => games.get(pk),
                EntityId::Str(_) => None,
            }
            .ok_or_else(|| FetchError::Unavailable(format!("not a scheduled game: {}", entity)))?;
            let boxscore = stats.boxscore(game.game_pk).await?;
            Ok(hitters_table(game, &boxscore)?)
        }
    });
    let rosters = ctx
        .fan_out()
        .run(
            game_pks
                .into_iter()
                .map(|pk| SubEntityTask::new(pk, roster_fetch.clone()))
                .collect(),
        )
        .await?;
    let mut failures = rosters.failures;
    let hitters = rosters.table;

    let pitcher_ids = distinct_ids(&hitters, "Opposing Pitcher ID");
    let batter_ids = distinct_ids(&hitters, "Batter ID");
    info!(
        "batter_pitch_overlay: {} hitters facing {} starters on {}",
        batter_ids.len(),
        pitcher_ids.len(),
        date
    );

    let savant = SavantClient::new(ctx.config())?;
    let mix_savant = savant.clone();
    let mix_fetch = entity_fetch(move |entity| {
        let savant = mix_savant.clone();
        async move {
            let EntityId::Int(id) = entity else {
                return Err(FetchError::Unavailable(format!("not a pitcher id: {}", entity)));
            };
            let events = savant.pitch_events(id, start, date).await?;
            Ok(pitch_mix(&events)?)
        }
    });
    let mixes = ctx
        .fan_out()
        .run(
            pitcher_ids
                .into_iter()
                .map(|id| {
                    SubEntityTask::new(id, mix_fetch.clone())
                        .cached(ctx.entity_key(PITCHER_SCOPE, id))
                })
                .collect(),
        )
        .await?;
    failures.extend(mixes.failures);

    let overlay_fetch = entity_fetch(move |entity| {
        let savant = savant.clone();
        async move {
            let EntityId::Int(id) = entity else {
                return Err(FetchError::Unavailable(format!("not a batter id: {}", entity)));
            };
            let events = savant.batter_events(id, start, date).await?;
            Ok(batter_overlay(&events)?)
        }
    });
    let overlays = ctx
        .fan_out()
        .run(
            batter_ids
                .into_iter()
                .map(|id| {
                    SubEntityTask::new(id, overlay_fetch.clone())
                        .cached(ctx.entity_key(BATTER_SCOPE, id))
                })
                .collect(),
        )
        .await?;
    failures.extend(overlays.failures);

    let table = matchup_overlay(&hitters, &top_pitches(&mixes.table), &overlays.table)?;
    Ok(LayerOutput::new(table).with_failures(failures))
}

fn distinct_ids(table: &Table, column: &str) -> BTreeSet<i64> {
    table
        .column(column)
        .map(|c| c.values().iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default()
}

/// Every hitter with a batting line in the boxscore, paired with the
/// probable starter of the other side. A side facing an unannounced
/// starter contributes nobody.
pub fn hitters_table(game: &ScheduleGame, boxscore: &Boxscore) -> Result<Table, TableError> {
    let time: Value = game.game_date.as_deref().and_then(parse_timestamp).into();
    let sides = [
        (&boxscore.teams.away, &game.teams.away, &game.teams.home),
        (&boxscore.teams.home, &game.teams.home, &game.teams.away),
    ];
    let mut rows = Vec::new();
    for (roster, own, opponent) in sides {
        let Some(pitcher) = opponent.probable_pitcher.as_ref() else {
            continue;
        };
        for batter in roster.batters() {
            rows.push(vec![
                Value::Int(game.game_pk),
                time.clone(),
                Value::str(own.team.name.as_str()),
                batter.full_name.as_deref().into(),
                Value::Int(batter.id),
                Value::Int(pitcher.id),
            ]);
        }
    }
    Table::from_rows(HITTER_SCHEMA, rows)
}

/// Share of each pitch type in one pitcher's tagged events.
pub fn pitch_mix(events: &Table) -> Result<Table, TableError> {
    let counts = summarize(
        events,
        &[PITCHER_ID, "pitch_type"],
        &[Metric::count("pitch_type").named("Pitches")],
    )?;
    let totals = summarize(&counts, &[PITCHER_ID], &[Metric::sum("Pitches").named("Total")])?;
    let joined = counts.left_join(&totals, PITCHER_ID, PITCHER_ID)?;
    derive(
        &joined,
        &[Derivation::new("Share", Expr::col("Pitches") / Expr::col("Total"))],
    )
}

/// Each pitcher's most-thrown types above [`MIN_SHARE`], most frequent
/// first, at most [`TOP_PITCHES`].
pub fn top_pitches(mix: &Table) -> HashMap<i64, Vec<String>> {
    let mut shares: HashMap<i64, Vec<(f64, String)>> = HashMap::new();
    for row in mix.rows() {
        let (Some(pitcher), Some(pitch), Some(share)) = (
            row.get(PITCHER_ID).as_i64(),
            row.get("pitch_type").as_str(),
            row.get("Share").as_f64(),
        ) else {
            continue;
        };
        if share > MIN_SHARE {
            shares.entry(pitcher).or_default().push((share, pitch.to_string()));
        }
    }
    shares
        .into_iter()
        .map(|(pitcher, mut pitches)| {
            pitches.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
            pitches.truncate(TOP_PITCHES);
            (pitcher, pitches.into_iter().map(|(_, p)| p).collect())
        })
        .collect()
}

/// Reduce one batter's tagged events to a row per pitch type seen.
///
/// `PA` approximates plate appearances from swings and called third
/// strikes; every rate is null when its denominator is zero.
pub fn batter_overlay(events: &Table) -> Result<Table, TableError> {
    let events = events.filter(|row| !row.get("pitch_type").is_null());
    let flagged = statcast::with_flags(&events, FLAGS)?;

    let mut metrics: Vec<Metric> = FLAGS.iter().map(|(name, _)| Metric::sum(*name)).collect();
    metrics.extend(MEANS.iter().map(|(src, out)| Metric::mean(*src).named(*out)));
    let summary = summarize(&flagged, &[BATTER_ID, "pitch_type"], &metrics)?;

    let col = Expr::col;
    let summary = derive(
        &summary,
        &[
            Derivation::new("PA", col("Swings") + (col("Strikeouts") - col("Whiffs"))),
            Derivation::new("Whiff%", col("Whiffs") / col("Swings")),
            Derivation::new("K%", col("Strikeouts") / col("PA")),
            Derivation::new("PutAway%", col("PutAwaySwings") / col("TwoStrikePitches")),
            Derivation::new("HardHit%", col("HardHits") / col("PA")),
        ],
    )?;
    summary.rename(&[("pitch_type", PITCH_TYPE)])
}

/// One row per hitter and pitch type in the opposing starter's top mix,
/// for which the hitter has an overlay row.
pub fn matchup_overlay(
    hitters: &Table,
    top: &HashMap<i64, Vec<String>>,
    overlay: &Table,
) -> Result<Table, TableError> {
    let mut index: HashMap<(i64, &str), usize> = HashMap::new();
    for row in overlay.rows() {
        if let (Some(batter), Some(pitch)) =
            (row.get(BATTER_ID).as_i64(), row.get(PITCH_TYPE).as_str())
        {
            index.insert((batter, pitch), row.index());
        }
    }
    let stats: Vec<&Column> = overlay
        .columns()
        .iter()
        .filter(|c| c.name() != BATTER_ID && c.name() != PITCH_TYPE)
        .collect();

    let mut schema: Vec<(String, ColumnType)> = HITTER_SCHEMA
        .iter()
        .map(|(name, ty)| (name.to_string(), *ty))
        .collect();
    schema.push((PITCH_TYPE.to_string(), ColumnType::Str));
    schema.extend(stats.iter().map(|c| (c.name().to_string(), c.ty())));

    let mut rows = Vec::new();
    for hitter in hitters.rows() {
        let (Some(batter), Some(pitcher)) = (
            hitter.get("Batter ID").as_i64(),
            hitter.get("Opposing Pitcher ID").as_i64(),
        ) else {
            continue;
        };
        for pitch in top.get(&pitcher).into_iter().flatten() {
            let Some(&i) = index.get(&(batter, pitch.as_str())) else {
                continue;
            };
            let mut row: Vec<Value> = HITTER_SCHEMA
                .iter()
                .map(|(name, _)| hitter.get(name).clone())
                .collect();
            row.push(Value::str(pitch.as_str()));
            row.extend(stats.iter().map(|c| c.values()[i].clone()));
            rows.push(row);
        }
    }

    let schema: Vec<(&str, ColumnType)> = schema.iter().map(|(n, t)| (n.as_str(), *t)).collect();
    Table::from_rows(&schema, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::csv_table;
    use crate::sources::savant::EVENT_COLUMNS;
    use crate::sources::stats::Schedule;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tagged(csv: &str, tag: &str, id: i64) -> Table {
        let events = csv_table(csv.as_bytes(), EVENT_COLUMNS, "test").unwrap();
        let ids = Column::new(tag, ColumnType::Int, vec![Value::Int(id); events.num_rows()]);
        events.with_column(ids.unwrap()).unwrap()
    }

    fn game() -> ScheduleGame {
        let schedule: Schedule = serde_json::from_value(json!({
            "dates": [{"games": [{
                "gamePk": 7,
                "gameDate": "2024-04-01T17:05:00Z",
                "teams": {
                    "away": {"team": {"id": 1, "name": "Mets"},
                             "probablePitcher": {"id": 100}},
                    "home": {"team": {"id": 2, "name": "Cubs"}}
                }
            }]}]
        }))
        .unwrap();
        let game = schedule.games().next().unwrap().clone();
        game
    }

    #[test]
    fn test_hitters_face_the_other_sides_starter() {
        let boxscore: Boxscore = serde_json::from_value(json!({
            "teams": {
                "away": {"players": {
                    "ID11": {"person": {"id": 11, "fullName": "Mets Bat"},
                             "stats": {"batting": {}}}
                }},
                "home": {"players": {
                    "ID21": {"person": {"id": 21, "fullName": "Cubs Bat"},
                             "stats": {"batting": {}}},
                    "ID22": {"person": {"id": 22}, "stats": {"batting": {}}}
                }}
            }
        }))
        .unwrap();

        // the Cubs starter is unannounced, so Mets hitters are skipped
        let table = hitters_table(&game(), &boxscore).unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.value(0, "Team"), Some(&Value::str("Cubs")));
        assert_eq!(table.value(0, "Batter ID"), Some(&Value::Int(21)));
        assert_eq!(table.value(0, "Opposing Pitcher ID"), Some(&Value::Int(100)));
        assert_eq!(table.value(1, "Batter"), Some(&Value::Null));
    }

    #[test]
    fn test_top_pitches_drop_rare_types() {
        let mut csv = String::from("pitch_type\n");
        for (pitch, n) in [("FF", 50), ("SL", 25), ("CH", 12), ("CU", 9), ("KN", 4)] {
            for _ in 0..n {
                csv.push_str(pitch);
                csv.push('\n');
            }
        }
        let mix = pitch_mix(&tagged(&csv, PITCHER_ID, 100)).unwrap();
        let top = top_pitches(&mix);
        assert_eq!(top[&100], vec!["FF", "SL", "CH"]);

        let mut sparse = String::from("pitch_type\nFF\nFF\nFF\n");
        for _ in 0..97 {
            sparse.push_str("SI\n");
        }
        let top = top_pitches(&pitch_mix(&tagged(&sparse, PITCHER_ID, 200)).unwrap());
        assert_eq!(top[&200], vec!["SI"]);
    }

    #[test]
    fn test_batter_overlay_rates_by_pitch_type() {
        let events = tagged(
            "pitch_type,description,events,strikes,launch_speed\n\
             FF,swinging_strike,,0,\n\
             FF,foul,,1,\n\
             FF,swinging_strike,strikeout,2,\n\
             FF,hit_into_play,single,2,101.0\n\
             SL,ball,,0,\n\
             ,ball,,0,\n",
            BATTER_ID,
            21,
        );
        let overlay = batter_overlay(&events).unwrap();

        assert_eq!(overlay.num_rows(), 2);
        assert_eq!(overlay.value(0, PITCH_TYPE), Some(&Value::str("FF")));
        assert_eq!(overlay.value(0, "Swings"), Some(&Value::Int(4)));
        assert_eq!(overlay.value(0, "Whiffs"), Some(&Value::Int(2)));
        // 4 swings + (1 strikeout - 2 whiffs)
        assert_eq!(overlay.value(0, "PA"), Some(&Value::Float(3.0)));
        assert_eq!(overlay.value(0, "PutAway%"), Some(&Value::Float(0.5)));
        let hard = overlay.value(0, "HardHit%").unwrap().as_f64().unwrap();
        assert!((hard - 1.0 / 3.0).abs() < 1e-9);

        assert_eq!(overlay.value(1, PITCH_TYPE), Some(&Value::str("SL")));
        assert_eq!(overlay.value(1, "Whiff%"), Some(&Value::Null));
    }

    #[test]
    fn test_overlay_keeps_only_the_opposing_mix() {
        let hitters = Table::from_rows(
            HITTER_SCHEMA,
            vec![vec![
                Value::Int(7),
                Value::Null,
                Value::str("Cubs"),
                Value::str("Cubs Bat"),
                Value::Int(21),
                Value::Int(100),
            ]],
        )
        .unwrap();
        let overlay = batter_overlay(&tagged(
            "pitch_type,description\nFF,foul\nSL,swinging_strike\nCU,ball\n",
            BATTER_ID,
            21,
        ))
        .unwrap();
        let top = HashMap::from([(100, vec!["SL".to_string(), "FF".to_string()])]);

        let table = matchup_overlay(&hitters, &top, &overlay).unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.value(0, PITCH_TYPE), Some(&Value::str("SL")));
        assert_eq!(table.value(0, "Whiffs"), Some(&Value::Int(1)));
        assert_eq!(table.value(1, PITCH_TYPE), Some(&Value::str("FF")));
        assert_eq!(table.value(1, "Team"), Some(&Value::str("Cubs")));
        assert!(!table.has_column(BATTER_ID));

        // a starter with no usable mix filters every row
        let table = matchup_overlay(&hitters, &HashMap::new(), &overlay).unwrap();
        assert!(table.is_empty());
    }
}
