pub mod logos;
pub mod provider;
pub mod standings;
pub mod understat;

pub use provider::{Feed, FeedProvider};
pub use understat::Understat;

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::db::models::{NewMatch, Player};
use crate::db::Database;
use crate::error::StoreError;

/// Counts from one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub teams: usize,
    pub matches: usize,
    pub players: usize,
    /// Records rejected by the parser or the store
    pub skipped: usize,
    pub crests: usize,
}

/// Write a parsed feed into the store, then rebuild the standings.
///
/// A record the store refuses is skipped; errors that leave the store
/// unusable abort the run.
pub fn apply_feed(db: &Database, feed: &Feed) -> Result<SyncReport, StoreError> {
    let mut report = SyncReport {
        skipped: feed.rejected,
        ..Default::default()
    };

    // external id → internal id (None if the store refused it),
    // display name → internal id
    let mut by_external: HashMap<i64, Option<i64>> = HashMap::new();
    let mut by_name: HashMap<String, i64> = HashMap::new();

    let match_sides = feed.matches.iter().flat_map(|m| [&m.home, &m.away]);
    for team in feed.teams.iter().chain(match_sides) {
        if by_external.contains_key(&team.external_id) {
            continue;
        }
        let stored = db.upsert_team(team.external_id, &team.name);
        let id = keep_or_skip(stored, "team", team.external_id, &mut report.skipped)?;
        by_external.insert(team.external_id, id);
        if let Some(id) = id {
            by_name.insert(team.name.clone(), id);
            report.teams += 1;
        }
    }

    let team_id = |external_id: i64| by_external.get(&external_id).copied().flatten();
    for m in &feed.matches {
        let (Some(home_team_id), Some(away_team_id)) =
            (team_id(m.home.external_id), team_id(m.away.external_id))
        else {
            warn!("Skipping match {}: a side was not stored", m.external_id);
            report.skipped += 1;
            continue;
        };
        let record = NewMatch {
            external_id: m.external_id,
            kickoff: m.kickoff,
            home_team_id,
            away_team_id,
            home_score: m.home_goals,
            away_score: m.away_goals,
            status: m.status,
        };
        let stored = db.upsert_match(&record).and_then(|match_id| match m.xg {
            Some((home_xg, away_xg)) if m.status.is_finished() => {
                db.upsert_match_stat(match_id, home_xg, away_xg)
            }
            _ => Ok(()),
        });
        if keep_or_skip(stored, "match", m.external_id, &mut report.skipped)?.is_some() {
            report.matches += 1;
        }
    }

    for p in &feed.players {
        let Some(&team_id) = by_name.get(&p.team_title) else {
            report.skipped += 1;
            continue;
        };
        let player = Player {
            external_id: p.external_id,
            team_id,
            name: p.name.clone(),
            position: p.position.clone(),
            games: p.games,
            goals: p.goals,
            assists: p.assists,
            shots: p.shots,
            xg: p.xg,
            xa: p.xa,
        };
        let stored = db.upsert_player(&player);
        if keep_or_skip(stored, "player", p.external_id, &mut report.skipped)?.is_some() {
            report.players += 1;
        }
    }

    let table = standings::recompute_standings(&db.finished_matches()?);
    db.write_standings(&table)?;
    report.crests = logos::apply_logos(db)?;

    Ok(report)
}

/// Pass a stored record through, count and log a refused one, and stop on
/// errors that leave the store unusable.
fn keep_or_skip<T>(
    stored: Result<T, StoreError>,
    what: &str,
    external_id: i64,
    skipped: &mut usize,
) -> Result<Option<T>, StoreError> {
    match stored {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!("Skipping {} {}: {}", what, external_id, e);
            *skipped += 1;
            Ok(None)
        }
    }
}

/// Fetch from the provider and apply the result.
pub async fn run_sync(provider: &dyn FeedProvider, db: &Database) -> Result<SyncReport> {
    let feed = provider
        .fetch_feed()
        .await
        .with_context(|| format!("{} fetch failed", provider.name()))?;
    if feed.matches.is_empty() {
        anyhow::bail!("{} returned no matches", provider.name());
    }

    let report = apply_feed(db, &feed).context("Failed to store feed")?;
    info!(
        "Sync from {}: {} teams, {} matches, {} players, {} skipped",
        provider.name(),
        report.teams,
        report.matches,
        report.players,
        report.skipped
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StaticFeed(Feed);

    #[async_trait]
    impl FeedProvider for StaticFeed {
        async fn fetch_feed(&self) -> Result<Feed> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    fn sample_feed() -> Feed {
        understat::parse_league_data(&understat::tests::sample_payload())
    }

    #[test]
    fn test_feed_lands_in_the_store_with_standings() {
        let db = Database::open_in_memory().unwrap();
        let report = apply_feed(&db, &sample_feed()).unwrap();
        assert_eq!(report.teams, 2);
        assert_eq!(report.matches, 3);
        assert_eq!(report.players, 2);
        assert_eq!(report.skipped, 4);
        assert_eq!(report.crests, 2);

        let table = db.list_teams().unwrap();
        let arsenal = table.iter().find(|t| t.name == "Arsenal").unwrap();
        assert_eq!(
            (arsenal.matches_played, arsenal.wins, arsenal.draws, arsenal.points),
            (2, 1, 1, 4)
        );
        assert_eq!((arsenal.goals_for, arsenal.goals_against), (3, 2));
        assert!((arsenal.xg_for - 1.85).abs() < 1e-9);
        assert_eq!(table[0].name, "Arsenal");

        assert_eq!(db.fixture_ids().unwrap().len(), 1);
        assert_eq!(db.players_by_team(arsenal.id).unwrap()[0].name, "Bukayo Saka");
    }

    #[test]
    fn test_applying_the_same_feed_twice_does_not_double_count() {
        let db = Database::open_in_memory().unwrap();
        apply_feed(&db, &sample_feed()).unwrap();
        let before = db.list_teams().unwrap();
        apply_feed(&db, &sample_feed()).unwrap();
        let after = db.list_teams().unwrap();
        assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(&after) {
            assert_eq!((b.points, b.goals_for), (a.points, a.goals_for));
        }
        assert_eq!(db.finished_matches().unwrap().len(), 2);
    }

    #[test]
    fn test_players_of_unknown_teams_are_skipped() {
        let db = Database::open_in_memory().unwrap();
        let mut feed = sample_feed();
        feed.players[0].team_title = "Arsenal,Chelsea".into();
        let report = apply_feed(&db, &feed).unwrap();
        assert_eq!(report.players, 1);
        assert_eq!(report.skipped, 5);
    }

    #[test]
    fn test_refused_records_are_counted_and_fatal_errors_stop() {
        let mut skipped = 0;
        let kept = keep_or_skip(Ok(7), "team", 83, &mut skipped).unwrap();
        assert_eq!((kept, skipped), (Some(7), 0));

        let refused: Result<i64, StoreError> = Err(StoreError::UnknownStatus("POSTPONED".into()));
        let kept = keep_or_skip(refused, "team", 83, &mut skipped).unwrap();
        assert_eq!((kept, skipped), (None, 1));

        let lost: Result<i64, StoreError> = Err(StoreError::Poisoned);
        assert!(keep_or_skip(lost, "team", 83, &mut skipped).is_err());
        assert_eq!(skipped, 1);
    }

    #[tokio::test]
    async fn test_run_sync_rejects_an_empty_feed() {
        let db = Database::open_in_memory().unwrap();
        let err = run_sync(&StaticFeed(Feed::default()), &db).await.unwrap_err();
        assert!(err.to_string().contains("no matches"));

        let report = run_sync(&StaticFeed(sample_feed()), &db).await.unwrap();
        assert_eq!(report.matches, 3);
    }
}
