//! The concrete source layers.
//!
//! Every source is one variant of [`StatsLayer`], a closed set dispatched
//! through the single [`LayerFetch`] contract. Names, arity and identity
//! columns live on the enum so the registry is built from one table.

pub mod batter_pitch_overlay;
pub mod batter_statcast;
pub mod batter_vs_pitcher;
pub mod betting_odds;
pub mod bullpen;
pub mod game_conditions;
pub mod pitch_arsenal;
pub mod pitcher_statcast;
pub mod probable_starters;
pub mod statcast;
pub mod team_hitting;
pub mod team_platoon_splits;

use crate::error::{FetchError, Result};
use crate::layer::{LayerArity, LayerContext, LayerDescriptor, LayerFetch, LayerOutput, LayerRegistry};
use crate::sources::{json_f64, json_i64};
use async_trait::async_trait;
use serde_json::{Map, Value as Json};
use statlayer_core::{ColumnType, Value};
use statlayer_storage::IdentitySpec;
use std::fmt;
use std::sync::Arc;

/// Output column, stats API key, type.
pub(crate) type StatField = (&'static str, &'static str, ColumnType);

/// Read `fields` out of one stat object, in order.
pub(crate) fn stat_values(stat: &Map<String, Json>, fields: &[StatField]) -> Vec<Value> {
    fields
        .iter()
        .map(|(_, key, ty)| match ty {
            ColumnType::Int => json_i64(stat.get(*key)),
            _ => json_f64(stat.get(*key)),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatsLayer {
    ProbableStarters,
    TeamHitting,
    TeamPlatoonSplits,
    GameConditions,
    BettingOdds,
    PitchArsenal,
    BatterPitchOverlay,
    PitcherStatcast,
    Bullpen,
    BatterVsPitcher,
    BatterStatcast,
}

impl StatsLayer {
    pub const ALL: [StatsLayer; 11] = [
        StatsLayer::ProbableStarters,
        StatsLayer::TeamHitting,
        StatsLayer::TeamPlatoonSplits,
        StatsLayer::GameConditions,
        StatsLayer::BettingOdds,
        StatsLayer::PitchArsenal,
        StatsLayer::BatterPitchOverlay,
        StatsLayer::PitcherStatcast,
        StatsLayer::Bullpen,
        StatsLayer::BatterVsPitcher,
        StatsLayer::BatterStatcast,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StatsLayer::ProbableStarters => "probable_starters",
            StatsLayer::TeamHitting => "team_hitting",
            StatsLayer::TeamPlatoonSplits => "team_platoon_splits",
            StatsLayer::GameConditions => "game_conditions",
            StatsLayer::BettingOdds => "betting_odds",
            StatsLayer::PitchArsenal => "pitch_arsenal",
            StatsLayer::BatterPitchOverlay => "batter_pitch_overlay",
            StatsLayer::PitcherStatcast => "pitcher_statcast",
            StatsLayer::Bullpen => "bullpen",
            StatsLayer::BatterVsPitcher => "batter_vs_pitcher",
            StatsLayer::BatterStatcast => "batter_statcast",
        }
    }

    pub fn arity(&self) -> LayerArity {
        match self {
            StatsLayer::ProbableStarters
            | StatsLayer::GameConditions
            | StatsLayer::BatterPitchOverlay
            | StatsLayer::Bullpen
            | StatsLayer::BatterVsPitcher => LayerArity::DateArg,
            _ => LayerArity::ZeroArg,
        }
    }

    pub fn identity_columns(&self) -> &'static [&'static str] {
        match self {
            StatsLayer::ProbableStarters | StatsLayer::GameConditions => &["GamePk"],
            StatsLayer::TeamHitting => &["Season", "Team"],
            StatsLayer::TeamPlatoonSplits => &["Team", "Season", "Split"],
            StatsLayer::BettingOdds => &["GamePk", "Bookmaker", "MarketType", "TeamOrPlayer"],
            StatsLayer::PitchArsenal => &["Player ID", "Pitch Type"],
            StatsLayer::BatterPitchOverlay => &["GamePk", "Batter ID", "Pitch Type"],
            StatsLayer::PitcherStatcast => &["Pitcher ID"],
            StatsLayer::Bullpen => &["Team"],
            StatsLayer::BatterVsPitcher => &["Batter ID", "Pitcher ID"],
            StatsLayer::BatterStatcast => &["Batter ID"],
        }
    }

    pub fn descriptor(self) -> Result<LayerDescriptor> {
        let identity = IdentitySpec::new(self.identity_columns().iter().copied())?;
        Ok(LayerDescriptor::new(self.name(), self.arity(), Arc::new(self)).with_identity(identity))
    }
}

impl fmt::Display for StatsLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[async_trait]
impl LayerFetch for StatsLayer {
    async fn fetch(&self, ctx: &LayerContext) -> std::result::Result<LayerOutput, FetchError> {
        match self {
            StatsLayer::ProbableStarters => probable_starters::fetch(ctx).await,
            StatsLayer::TeamHitting => team_hitting::fetch(ctx).await,
            StatsLayer::TeamPlatoonSplits => team_platoon_splits::fetch(ctx).await,
            StatsLayer::GameConditions => game_conditions::fetch(ctx).await,
            StatsLayer::BettingOdds => betting_odds::fetch(ctx).await,
            StatsLayer::PitchArsenal => pitch_arsenal::fetch(ctx).await,
            StatsLayer::BatterPitchOverlay => batter_pitch_overlay::fetch(ctx).await,
            StatsLayer::PitcherStatcast => pitcher_statcast::fetch(ctx).await,
            StatsLayer::Bullpen => bullpen::fetch(ctx).await,
            StatsLayer::BatterVsPitcher => batter_vs_pitcher::fetch(ctx).await,
            StatsLayer::BatterStatcast => batter_statcast::fetch(ctx).await,
        }
    }
}

/// Registry holding every source layer, in [`StatsLayer::ALL`] order.
pub fn default_registry() -> Result<LayerRegistry> {
    let mut registry = LayerRegistry::new();
    for layer in StatsLayer::ALL {
        registry.register(layer.descriptor()?)?;
    }
    Ok(registry)
}
