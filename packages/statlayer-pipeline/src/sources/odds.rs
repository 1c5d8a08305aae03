//! Sportsbook odds API.

use super::http::HttpClient;
use crate::config::PipelineConfig;
use crate::error::FetchError;
use serde::Deserialize;

pub const API_KEY_ENV: &str = "ODDS_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct OddsEvent {
    pub id: String,
    pub commence_time: Option<String>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    #[serde(default)]
    pub bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Bookmaker {
    pub key: String,
    pub title: Option<String>,
    pub last_update: Option<String>,
    #[serde(default)]
    pub markets: Vec<Market>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Market {
    pub key: String,
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Outcome {
    pub name: String,
    pub price: Option<f64>,
    pub point: Option<f64>,
}

#[derive(Clone)]
pub struct OddsClient {
    http: HttpClient,
    api_key: String,
}

impl std::fmt::Debug for OddsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OddsClient")
            .field("base_url", &self.http.base_url())
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl OddsClient {
    pub fn new(config: &PipelineConfig) -> Result<Self, FetchError> {
        let api_key = config
            .odds_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(FetchError::MissingCredential(API_KEY_ENV))?;
        Ok(Self {
            http: HttpClient::new(&config.odds_api_url, 1, config.request_timeout())?,
            api_key,
        })
    }

    /// Upcoming games with decimal prices for moneyline, spread and total.
    pub async fn odds(&self) -> Result<Vec<OddsEvent>, FetchError> {
        self.http
            .get_json(
                "/v4/sports/baseball_mlb/odds",
                &[
                    ("apiKey", self.api_key.clone()),
                    ("regions", "us".to_string()),
                    ("markets", "h2h,spreads,totals".to_string()),
                    ("oddsFormat", "decimal".to_string()),
                ],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_credential_error() {
        let config = PipelineConfig::default();
        assert_eq!(
            OddsClient::new(&config).unwrap_err(),
            FetchError::MissingCredential(API_KEY_ENV)
        );

        let blank = PipelineConfig {
            odds_api_key: Some("  ".to_string()),
            ..PipelineConfig::default()
        };
        assert!(OddsClient::new(&blank).is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let config = PipelineConfig {
            odds_api_key: Some("secret-key".to_string()),
            ..PipelineConfig::default()
        };
        let client = OddsClient::new(&config).unwrap();
        assert!(!format!("{:?}", client).contains("secret-key"));
    }
}
