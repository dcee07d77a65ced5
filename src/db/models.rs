use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Lifecycle of a match, collapsed from whatever vocabulary the source uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    /// Not yet played
    Scheduled,
    /// Not yet played, kickoff confirmed
    Timed,
    /// Played, scores final
    Finished,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "SCHEDULED",
            MatchStatus::Timed => "TIMED",
            MatchStatus::Finished => "FINISHED",
        }
    }

    pub fn parse(s: &str) -> Result<MatchStatus, StoreError> {
        match s {
            "SCHEDULED" => Ok(MatchStatus::Scheduled),
            "TIMED" => Ok(MatchStatus::Timed),
            "FINISHED" => Ok(MatchStatus::Finished),
            other => Err(StoreError::UnknownStatus(other.to_string())),
        }
    }

    pub fn is_finished(self) -> bool {
        self == MatchStatus::Finished
    }
}

impl ToSql for MatchStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MatchStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        MatchStatus::parse(s).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// A club, with its season record as last recomputed by the sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    /// ID assigned by the external data source
    pub external_id: i64,
    pub name: String,
    pub short_name: String,
    pub logo_url: Option<String>,
    pub matches_played: i32,
    pub wins: i32,
    pub draws: i32,
    pub losses: i32,
    pub goals_for: i32,
    pub goals_against: i32,
    pub points: i32,
    pub xg_for: f64,
    pub xg_against: f64,
}

/// Season counters for one player, as delivered by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub external_id: i64,
    pub team_id: i64,
    pub name: String,
    pub position: String,
    pub games: i32,
    pub goals: i32,
    pub assists: i32,
    pub shots: i32,
    /// Expected goals
    pub xg: f64,
    /// Expected assists
    pub xa: f64,
}

/// A match as written by the sync.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMatch {
    pub external_id: i64,
    pub kickoff: DateTime<Utc>,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub status: MatchStatus,
}

/// A played match with both scores and, if recorded, its xG pair.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedMatch {
    pub match_id: i64,
    pub kickoff: DateTime<Utc>,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_score: i32,
    pub away_score: i32,
    pub home_xg: Option<f64>,
    pub away_xg: Option<f64>,
}

/// An upcoming match together with the names of both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub match_id: i64,
    pub kickoff: DateTime<Utc>,
    pub status: MatchStatus,
    pub home_team_id: i64,
    pub home_team: String,
    pub home_logo: Option<String>,
    pub away_team_id: i64,
    pub away_team: String,
    pub away_logo: Option<String>,
}

/// The single current prediction for a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub match_id: i64,
    /// `None` means a draw is predicted
    pub predicted_winner_id: Option<i64>,
    /// Always equal to `predicted_winner_id.is_none()`
    pub is_draw: bool,
    /// 0.5 (no edge) ..= 0.95
    pub confidence: f64,
    pub analysis_content: String,
    pub ai_commentary: Option<String>,
}

impl Prediction {
    /// True when both rows carry the same call and the same analysis text,
    /// ignoring commentary.
    pub fn same_forecast(&self, other: &Prediction) -> bool {
        self.match_id == other.match_id
            && self.predicted_winner_id == other.predicted_winner_id
            && self.is_draw == other.is_draw
            && self.confidence.to_bits() == other.confidence.to_bits()
            && self.analysis_content == other.analysis_content
    }
}

/// Season record derived from the full set of finished matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StandingsRow {
    pub matches_played: i32,
    pub wins: i32,
    pub draws: i32,
    pub losses: i32,
    pub goals_for: i32,
    pub goals_against: i32,
    pub points: i32,
    pub xg_for: f64,
    pub xg_against: f64,
}
