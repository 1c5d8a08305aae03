//! MLB stats API client and response shapes.

use super::http::HttpClient;
use crate::config::PipelineConfig;
use crate::error::FetchError;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

const SPORT_ID: &str = "1";
const REGULAR_SEASON: &str = "R";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub dates: Vec<ScheduleDate>,
}

impl Schedule {
    pub fn games(&self) -> impl Iterator<Item = &ScheduleGame> {
        self.dates.iter().flat_map(|d| d.games.iter())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleDate {
    #[serde(default)]
    pub games: Vec<ScheduleGame>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleGame {
    pub game_pk: i64,
    pub game_date: Option<String>,
    pub official_date: Option<String>,
    pub game_type: Option<String>,
    pub series_description: Option<String>,
    pub series_game_number: Option<i64>,
    pub double_header: Option<String>,
    pub teams: GameTeams,
    pub venue: Option<Venue>,
    pub weather: Option<Weather>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameTeams {
    pub away: GameSide,
    pub home: GameSide,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSide {
    pub team: TeamRef,
    pub probable_pitcher: Option<PersonRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamRef {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonRef {
    pub id: i64,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Venue {
    pub id: Option<i64>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Weather {
    pub condition: Option<String>,
    pub temp: Option<Json>,
    /// e.g. `"10 mph, Out To CF"`
    pub wind: Option<String>,
    pub wind_speed: Option<Json>,
    pub wind_direction: Option<String>,
}

/// Game boxscore; only the rosters are read.
#[derive(Debug, Clone, Deserialize)]
pub struct Boxscore {
    pub teams: BoxscoreTeams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoxscoreTeams {
    pub away: BoxscoreSide,
    pub home: BoxscoreSide,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoxscoreSide {
    /// Keyed `ID<person id>`
    #[serde(default)]
    pub players: BTreeMap<String, BoxscorePlayer>,
}

impl BoxscoreSide {
    /// Players carrying a batting stat line, in key order.
    pub fn batters(&self) -> impl Iterator<Item = &PersonRef> {
        self.players
            .values()
            .filter(|p| p.stats.get("batting").is_some_and(|b| !b.is_null()))
            .map(|p| &p.person)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoxscorePlayer {
    pub person: PersonRef,
    #[serde(default)]
    pub stats: Map<String, Json>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub stats: Vec<StatGroup>,
}

impl StatsResponse {
    /// Splits of the first stat group, which is the only one requested.
    pub fn splits(&self) -> &[StatSplit] {
        self.stats.first().map(|g| g.splits.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatGroup {
    #[serde(default)]
    pub splits: Vec<StatSplit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatSplit {
    pub season: Option<String>,
    pub team: Option<TeamRef>,
    /// Counting stats are numbers, rate stats are strings like `".250"`
    #[serde(default)]
    pub stat: Map<String, Json>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TeamsResponse {
    #[serde(default)]
    teams: Vec<TeamRef>,
}

#[derive(Clone)]
pub struct StatsClient {
    http: HttpClient,
}

impl StatsClient {
    pub fn new(config: &PipelineConfig) -> Result<Self, FetchError> {
        Ok(Self {
            http: HttpClient::new(
                &config.stats_api_url,
                config.fanout_concurrency,
                config.request_timeout(),
            )?,
        })
    }

    pub fn with_http(http: HttpClient) -> Self {
        Self { http }
    }

    /// Games scheduled on `date`, with the given hydrations.
    pub async fn schedule(&self, date: NaiveDate, hydrate: &str) -> Result<Schedule, FetchError> {
        self.http
            .get_json(
                "/api/v1/schedule",
                &[
                    ("sportId", SPORT_ID.to_string()),
                    ("date", date.format("%Y-%m-%d").to_string()),
                    ("hydrate", hydrate.to_string()),
                ],
            )
            .await
    }

    pub async fn boxscore(&self, game_pk: i64) -> Result<Boxscore, FetchError> {
        self.http
            .get_json(&format!("/api/v1/game/{}/boxscore", game_pk), &[])
            .await
    }

    pub async fn teams(&self) -> Result<Vec<TeamRef>, FetchError> {
        let response: TeamsResponse = self
            .http
            .get_json("/api/v1/teams", &[("sportId", SPORT_ID.to_string())])
            .await?;
        Ok(response.teams)
    }

    /// Regular-season hitting totals, one split per team.
    pub async fn team_season_hitting(&self, season: i32) -> Result<StatsResponse, FetchError> {
        self.http
            .get_json(
                "/api/v1/teams/stats",
                &[
                    ("stats", "season".to_string()),
                    ("group", "hitting".to_string()),
                    ("gameType", REGULAR_SEASON.to_string()),
                    ("sportIds", SPORT_ID.to_string()),
                    ("season", season.to_string()),
                ],
            )
            .await
    }

    /// One team's season hitting against one pitcher hand (`vsLHP`/`vsRHP`).
    pub async fn team_split_hitting(
        &self,
        season: i32,
        team_id: i64,
        split: &str,
    ) -> Result<StatsResponse, FetchError> {
        self.http
            .get_json(
                "/api/v1/stats",
                &[
                    ("stats", "season".to_string()),
                    ("group", "hitting".to_string()),
                    ("season", season.to_string()),
                    ("teamId", team_id.to_string()),
                    ("sportId", SPORT_ID.to_string()),
                    ("split", split.to_string()),
                    ("gameType", REGULAR_SEASON.to_string()),
                ],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schedule_parses_sparse_games() {
        let raw = json!({
            "dates": [{
                "games": [{
                    "gamePk": 745001,
                    "gameDate": "2024-04-01T18:20:00Z",
                    "teams": {
                        "away": {"team": {"id": 121, "name": "New York Mets"}},
                        "home": {
                            "team": {"id": 112, "name": "Chicago Cubs"},
                            "probablePitcher": {"id": 543037, "fullName": "Justin Steele"}
                        }
                    },
                    "weather": {"condition": "Sunny", "temp": "64", "wind": "8 mph, In From LF"}
                }]
            }]
        });

        let schedule: Schedule = serde_json::from_value(raw).unwrap();
        let game = schedule.games().next().unwrap();
        assert_eq!(game.game_pk, 745001);
        assert!(game.teams.away.probable_pitcher.is_none());
        assert_eq!(
            game.teams.home.probable_pitcher.as_ref().unwrap().id,
            543037
        );
        assert!(game.venue.is_none());
    }

    #[test]
    fn test_boxscore_batters_skip_bench_arms() {
        let raw = json!({
            "teams": {
                "away": {"players": {
                    "ID1": {"person": {"id": 1, "fullName": "Lead Off"},
                            "stats": {"batting": {"atBats": 4}, "pitching": {}}},
                    "ID2": {"person": {"id": 2, "fullName": "Bullpen Arm"},
                            "stats": {"pitching": {"outs": 3}}},
                    "ID3": {"person": {"id": 3, "fullName": "No Stats"}}
                }},
                "home": {}
            }
        });

        let boxscore: Boxscore = serde_json::from_value(raw).unwrap();
        let ids: Vec<i64> = boxscore.teams.away.batters().map(|p| p.id).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(boxscore.teams.home.batters().count(), 0);
    }

    #[test]
    fn test_empty_stats_response() {
        let response: StatsResponse = serde_json::from_value(json!({"stats": []})).unwrap();
        assert!(response.splits().is_empty());
    }
}
