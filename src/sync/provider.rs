use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::models::MatchStatus;

/// A team as named by the data source.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedTeam {
    pub external_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedMatch {
    pub external_id: i64,
    pub kickoff: DateTime<Utc>,
    pub home: FeedTeam,
    pub away: FeedTeam,
    pub status: MatchStatus,
    pub home_goals: Option<i32>,
    pub away_goals: Option<i32>,
    /// Expected goals, only present for played matches
    pub xg: Option<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedPlayer {
    pub external_id: i64,
    pub name: String,
    /// Team display name; players are attached to teams by name
    pub team_title: String,
    pub position: String,
    pub games: i32,
    pub goals: i32,
    pub assists: i32,
    pub shots: i32,
    pub xg: f64,
    pub xa: f64,
}

/// Normalized snapshot of one league season.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feed {
    pub teams: Vec<FeedTeam>,
    pub matches: Vec<FeedMatch>,
    pub players: Vec<FeedPlayer>,
    /// Records dropped because they failed to parse
    pub rejected: usize,
}

/// Trait that every match/team/player data source must implement.
#[async_trait]
pub trait FeedProvider: Send + Sync {
    /// Fetch and normalize the full season snapshot.
    async fn fetch_feed(&self) -> Result<Feed>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
