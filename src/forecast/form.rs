use std::fmt;

use serde::Serialize;

use super::MatchRepository;
use crate::db::models::FinishedMatch;
use crate::error::StoreError;

/// Number of recent matches that make up a team's form.
pub const DEFAULT_LOOKBACK: usize = 5;

/// Result of one match from a single team's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchResult {
    Win,
    Draw,
    Loss,
}

impl MatchResult {
    fn from_goals(goals_for: i32, goals_against: i32) -> MatchResult {
        match goals_for.cmp(&goals_against) {
            std::cmp::Ordering::Greater => MatchResult::Win,
            std::cmp::Ordering::Equal => MatchResult::Draw,
            std::cmp::Ordering::Less => MatchResult::Loss,
        }
    }

    pub fn points(self) -> i32 {
        match self {
            MatchResult::Win => 3,
            MatchResult::Draw => 1,
            MatchResult::Loss => 0,
        }
    }

    pub fn token(self) -> char {
        match self {
            MatchResult::Win => 'W',
            MatchResult::Draw => 'D',
            MatchResult::Loss => 'L',
        }
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Aggregate of a team's last few finished matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormSummary {
    pub matches_considered: usize,
    pub points: i32,
    pub goals_for: i32,
    pub goals_against: i32,
    pub xg_for: f64,
    pub xg_against: f64,
    /// Most recent first
    pub trail: Vec<MatchResult>,
}

impl FormSummary {
    /// No finished matches to judge the team by.
    pub fn is_empty(&self) -> bool {
        self.matches_considered == 0
    }

    /// Trail rendered as space-separated tokens, e.g. `"W W D L W"`.
    pub fn trail_string(&self) -> String {
        self.trail
            .iter()
            .map(|r| r.token().to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Fold a team's matches (newest first) into a form summary. Matches the team
/// did not play in are ignored.
pub fn summarize_form(team_id: i64, matches: &[FinishedMatch]) -> FormSummary {
    let mut form = FormSummary::default();

    for m in matches {
        let (goals_for, goals_against, xg_for, xg_against) = if m.home_team_id == team_id {
            (m.home_score, m.away_score, m.home_xg, m.away_xg)
        } else if m.away_team_id == team_id {
            (m.away_score, m.home_score, m.away_xg, m.home_xg)
        } else {
            continue;
        };

        let result = MatchResult::from_goals(goals_for, goals_against);
        form.matches_considered += 1;
        form.points += result.points();
        form.goals_for += goals_for;
        form.goals_against += goals_against;
        form.xg_for += xg_for.unwrap_or(0.0);
        form.xg_against += xg_against.unwrap_or(0.0);
        form.trail.push(result);
    }

    form
}

/// Load the team's last `lookback` finished matches and summarise them.
pub fn compute_form<R: MatchRepository + ?Sized>(
    repo: &R,
    team_id: i64,
    lookback: usize,
) -> Result<FormSummary, StoreError> {
    let matches = repo.find_team_results(team_id, lookback)?;
    Ok(summarize_form(team_id, &matches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn played(home: i64, away: i64, hs: i32, aws: i32, xg: Option<(f64, f64)>) -> FinishedMatch {
        FinishedMatch {
            match_id: 0,
            kickoff: Utc.with_ymd_and_hms(2025, 9, 1, 15, 0, 0).unwrap(),
            home_team_id: home,
            away_team_id: away,
            home_score: hs,
            away_score: aws,
            home_xg: xg.map(|x| x.0),
            away_xg: xg.map(|x| x.1),
        }
    }

    #[test]
    fn test_orientation_is_resolved_per_match() {
        let matches = vec![
            played(1, 2, 2, 0, Some((1.5, 0.4))), // home win
            played(3, 1, 1, 1, Some((0.9, 1.1))), // away draw
            played(4, 1, 3, 1, None),             // away loss, no stats
        ];
        let form = summarize_form(1, &matches);

        assert_eq!(form.matches_considered, 3);
        assert_eq!(form.points, 4);
        assert_eq!(form.goals_for, 4);
        assert_eq!(form.goals_against, 4);
        assert_relative_eq!(form.xg_for, 2.6, epsilon = 1e-9);
        assert_relative_eq!(form.xg_against, 1.3, epsilon = 1e-9);
        assert_eq!(
            form.trail,
            vec![MatchResult::Win, MatchResult::Draw, MatchResult::Loss]
        );
        assert_eq!(form.trail_string(), "W D L");
    }

    #[test]
    fn test_no_matches_gives_an_empty_summary() {
        let form = summarize_form(9, &[]);
        assert!(form.is_empty());
        assert_eq!(form, FormSummary::default());
        assert_eq!(form.trail_string(), "");
    }

    #[test]
    fn test_matches_without_the_team_are_ignored() {
        let form = summarize_form(7, &[played(1, 2, 1, 0, None)]);
        assert!(form.is_empty());
    }

    #[test]
    fn test_compute_form_respects_the_lookback() {
        let (db, home, away) = crate::db::tests::seeded(8);
        let form = compute_form(&db, away, DEFAULT_LOOKBACK).unwrap();
        assert_eq!(form.matches_considered, 5);
        assert_eq!(form.points, 0);
        assert_eq!(form.goals_for, 5);
        assert_eq!(form.goals_against, 10);
        assert_relative_eq!(form.xg_against, 9.0, epsilon = 1e-9);

        let form = compute_form(&db, home, 3).unwrap();
        assert_eq!(form.trail_string(), "W W W");
    }
}
