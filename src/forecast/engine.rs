use serde::Serialize;
use tracing::{debug, info, warn};

use super::form::{compute_form, DEFAULT_LOOKBACK};
use super::predictor::forecast_fixture;
use super::squad::{top_players, DEFAULT_KEY_PLAYERS};
use super::MatchRepository;
use crate::db::models::Fixture;
use crate::error::{ForecastError, StoreError};

/// What happened to a single fixture during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureOutcome {
    /// A new or changed prediction was stored.
    Written,
    /// The stored prediction already matched the recomputation.
    Unchanged,
    /// One side has no finished matches; nothing was touched.
    InsufficientData,
}

/// Tally of one prediction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub fixtures: usize,
    /// Fixtures that hold a current prediction after the pass
    pub generated: usize,
    /// Of those, predictions whose content changed
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Turns form and squads into one stored prediction per upcoming fixture.
///
/// Commentary attached to a stored prediction survives recomputation only if
/// the new prediction is identical to the old one; otherwise it is dropped.
pub struct PredictionEngine<R> {
    repo: R,
    lookback: usize,
    key_players: usize,
}

impl<R: MatchRepository> PredictionEngine<R> {
    pub fn new(repo: R) -> Self {
        PredictionEngine {
            repo,
            lookback: DEFAULT_LOOKBACK,
            key_players: DEFAULT_KEY_PLAYERS,
        }
    }

    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn with_key_players(mut self, key_players: usize) -> Self {
        self.key_players = key_players;
        self
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Recompute and store the prediction for one not-yet-finished fixture.
    ///
    /// Sufficiency of both sides' form is established before anything is
    /// written, so a fixture that cannot be predicted keeps whatever
    /// prediction it already had.
    pub fn predict_fixture(&self, fixture: &Fixture) -> Result<FixtureOutcome, ForecastError> {
        if fixture.status.is_finished() {
            return Err(ForecastError::AlreadyFinished(fixture.match_id));
        }
        if fixture.home_team_id == fixture.away_team_id {
            return Err(ForecastError::SameTeam {
                match_id: fixture.match_id,
                team_id: fixture.home_team_id,
            });
        }

        let home_form = compute_form(&self.repo, fixture.home_team_id, self.lookback)?;
        let away_form = compute_form(&self.repo, fixture.away_team_id, self.lookback)?;
        if home_form.is_empty() || away_form.is_empty() {
            debug!(
                "Insufficient form for {} vs {} (home {} / away {} matches)",
                fixture.home_team,
                fixture.away_team,
                home_form.matches_considered,
                away_form.matches_considered
            );
            return Ok(FixtureOutcome::InsufficientData);
        }

        let home_squad = top_players(&self.repo, fixture.home_team_id, self.key_players)?;
        let away_squad = top_players(&self.repo, fixture.away_team_id, self.key_players)?;

        let Some(draft) = forecast_fixture(fixture, &home_form, &away_form, &home_squad, &away_squad)
        else {
            return Ok(FixtureOutcome::InsufficientData);
        };
        let prediction = draft.prediction;

        if let Some(old) = self.repo.find_prediction_by_match(fixture.match_id)? {
            if old.same_forecast(&prediction) {
                debug!("Prediction for match {} unchanged", fixture.match_id);
                return Ok(FixtureOutcome::Unchanged);
            }
            if old.ai_commentary.is_some() {
                debug!("Dropping stale commentary for match {}", fixture.match_id);
            }
        }

        self.repo.replace_prediction(&prediction)?;
        debug!(
            "Predicted {} vs {}: {:?} at {:.2} (diff {:+.3})",
            fixture.home_team,
            fixture.away_team,
            draft.verdict.outcome,
            draft.verdict.confidence,
            draft.diff
        );
        Ok(FixtureOutcome::Written)
    }

    /// Predict every fixture that has not finished yet.
    ///
    /// Each fixture stands alone: a row that fails to load or predict is
    /// logged and counted, and the pass carries on. Only errors that make the
    /// store itself unusable abort the pass.
    pub fn run_prediction_pass(&self) -> Result<PassSummary, ForecastError> {
        let ids = self.repo.find_fixture_ids()?;
        info!("Found {} upcoming fixtures to analyse", ids.len());

        let mut summary = PassSummary {
            fixtures: ids.len(),
            ..Default::default()
        };

        for match_id in ids {
            let outcome = self
                .repo
                .find_fixture(match_id)
                .map_err(ForecastError::from)
                .and_then(|fixture| match fixture {
                    Some(fixture) => self.predict_fixture(&fixture),
                    // removed since the id list was read
                    None => Ok(FixtureOutcome::InsufficientData),
                });
            match outcome {
                Ok(FixtureOutcome::Written) => {
                    summary.generated += 1;
                    summary.written += 1;
                }
                Ok(FixtureOutcome::Unchanged) => summary.generated += 1,
                Ok(FixtureOutcome::InsufficientData) => summary.skipped += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Skipping match {}: {}", match_id, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Prediction pass done: {} generated ({} written), {} skipped, {} failed",
            summary.generated, summary.written, summary.skipped, summary.failed
        );
        Ok(summary)
    }

    /// The stored analysis for a match, if it has a prediction.
    pub fn render_analysis_document(&self, match_id: i64) -> Result<Option<String>, StoreError> {
        Ok(self
            .repo
            .find_prediction_by_match(match_id)?
            .map(|p| p.analysis_content))
    }

    /// Drop the stored prediction for a match. Returns whether one existed.
    pub fn discard_prediction(&self, match_id: i64) -> Result<bool, StoreError> {
        self.repo.delete_prediction_by_match(match_id)
    }

    /// Predict a single match by id, if it is still upcoming.
    pub fn predict_match(&self, match_id: i64) -> Result<Option<FixtureOutcome>, ForecastError> {
        match self.repo.find_fixture(match_id)? {
            Some(fixture) if !fixture.status.is_finished() => {
                self.predict_fixture(&fixture).map(Some)
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{FinishedMatch, MatchStatus, NewMatch, Player, Prediction};
    use crate::db::tests::{insert_raw_match, seeded};
    use crate::db::Database;
    use chrono::{TimeZone, Utc};

    fn add_fixture(db: &Database, home: i64, away: i64, external_id: i64) -> i64 {
        db.upsert_match(&NewMatch {
            external_id,
            kickoff: Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap(),
            home_team_id: home,
            away_team_id: away,
            home_score: None,
            away_score: None,
            status: MatchStatus::Scheduled,
        })
        .unwrap()
    }

    #[test]
    fn test_pass_writes_one_prediction_per_fixture() {
        let (db, home, away) = seeded(5);
        let match_id = add_fixture(&db, home, away, 900);
        let engine = PredictionEngine::new(db.clone());

        let summary = engine.run_prediction_pass().unwrap();
        assert_eq!(summary.fixtures, 1);
        assert_eq!(summary.generated, 1);
        assert_eq!(summary.written, 1);

        let p = db.prediction_by_match(match_id).unwrap().unwrap();
        assert_eq!(p.predicted_winner_id, Some(home));
        assert!(!p.is_draw);
        assert!((0.5..=0.95).contains(&p.confidence));
        assert!(p.analysis_content.contains("Arsenal to win"));
        assert!(p.ai_commentary.is_none());
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let (db, home, away) = seeded(5);
        let match_id = add_fixture(&db, home, away, 900);
        let engine = PredictionEngine::new(db.clone());

        engine.run_prediction_pass().unwrap();
        let first = db.prediction_by_match(match_id).unwrap().unwrap();
        let summary = engine.run_prediction_pass().unwrap();
        let second = db.prediction_by_match(match_id).unwrap().unwrap();

        assert_eq!(summary.generated, 1);
        assert_eq!(summary.written, 0);
        assert_eq!(first, second);
        assert_eq!(first.confidence.to_bits(), second.confidence.to_bits());
    }

    #[test]
    fn test_commentary_survives_only_an_unchanged_prediction() {
        let (db, home, away) = seeded(5);
        let match_id = add_fixture(&db, home, away, 900);
        let engine = PredictionEngine::new(db.clone());

        engine.run_prediction_pass().unwrap();
        db.set_commentary(match_id, Some("Arsenal edge it.")).unwrap();
        engine.run_prediction_pass().unwrap();
        let p = db.prediction_by_match(match_id).unwrap().unwrap();
        assert_eq!(p.ai_commentary.as_deref(), Some("Arsenal edge it."));

        // A new key player changes the analysis text.
        db.upsert_player(&Player {
            external_id: 1,
            team_id: home,
            name: "Saka".into(),
            position: "F".into(),
            games: 5,
            goals: 3,
            assists: 1,
            shots: 12,
            xg: 2.4,
            xa: 0.9,
        })
        .unwrap();
        let outcome = engine.predict_match(match_id).unwrap();
        assert_eq!(outcome, Some(FixtureOutcome::Written));
        let p = db.prediction_by_match(match_id).unwrap().unwrap();
        assert!(p.ai_commentary.is_none());
        assert!(p.analysis_content.contains("Arsenal: Saka (3 goals, 1 assist, xG 2.40)"));
    }

    #[test]
    fn test_team_without_history_is_skipped_and_existing_prediction_kept() {
        let (db, home, _away) = seeded(5);
        let newcomer = db.upsert_team(3, "Sunderland").unwrap();
        let match_id = add_fixture(&db, newcomer, home, 901);
        let engine = PredictionEngine::new(db.clone());

        let summary = engine.run_prediction_pass().unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.generated, 0);
        assert!(db.prediction_by_match(match_id).unwrap().is_none());

        let earlier = Prediction {
            match_id,
            predicted_winner_id: None,
            is_draw: true,
            confidence: 0.55,
            analysis_content: "earlier".into(),
            ai_commentary: None,
        };
        db.replace_prediction(&earlier).unwrap();
        engine.run_prediction_pass().unwrap();
        assert_eq!(db.prediction_by_match(match_id).unwrap(), Some(earlier));
    }

    #[test]
    fn test_a_malformed_fixture_does_not_stop_the_pass() {
        let (db, home, away) = seeded(5);
        add_fixture(&db, home, home, 902);
        let good = add_fixture(&db, home, away, 903);
        let engine = PredictionEngine::new(db.clone());

        let summary = engine.run_prediction_pass().unwrap();
        assert_eq!(summary.fixtures, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.generated, 1);
        assert!(db.prediction_by_match(good).unwrap().is_some());
    }

    #[test]
    fn test_undecodable_fixture_rows_are_counted_not_fatal() {
        let (db, home, away) = seeded(5);
        let good = add_fixture(&db, home, away, 904);
        insert_raw_match(&db, 905, home, away, "2026-03-02T15:00:00+00:00", "POSTPONED");
        insert_raw_match(&db, 906, away, home, "next saturday", "SCHEDULED");
        let engine = PredictionEngine::new(db.clone());

        let summary = engine.run_prediction_pass().unwrap();
        assert_eq!(summary.fixtures, 3);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.generated, 1);
        assert!(db.prediction_by_match(good).unwrap().is_some());
    }

    /// Delegates to the database but loses its connection when loading fixtures.
    struct LostConnection(Database);

    impl MatchRepository for LostConnection {
        fn find_team_results(
            &self,
            team_id: i64,
            limit: usize,
        ) -> Result<Vec<FinishedMatch>, StoreError> {
            self.0.find_team_results(team_id, limit)
        }
        fn find_players_by_team(&self, team_id: i64) -> Result<Vec<Player>, StoreError> {
            self.0.find_players_by_team(team_id)
        }
        fn find_fixture_ids(&self) -> Result<Vec<i64>, StoreError> {
            self.0.find_fixture_ids()
        }
        fn find_fixture(&self, _match_id: i64) -> Result<Option<Fixture>, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn find_prediction_by_match(&self, match_id: i64) -> Result<Option<Prediction>, StoreError> {
            self.0.find_prediction_by_match(match_id)
        }
        fn delete_prediction_by_match(&self, match_id: i64) -> Result<bool, StoreError> {
            self.0.delete_prediction_by_match(match_id)
        }
        fn replace_prediction(&self, prediction: &Prediction) -> Result<(), StoreError> {
            self.0.replace_prediction(prediction)
        }
    }

    #[test]
    fn test_fatal_store_errors_abort_the_pass() {
        let (db, home, away) = seeded(5);
        add_fixture(&db, home, away, 900);
        add_fixture(&db, away, home, 901);
        let engine = PredictionEngine::new(LostConnection(db.clone()));

        let err = engine.run_prediction_pass().unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, ForecastError::Store(StoreError::Poisoned)));
    }

    #[test]
    fn test_finished_matches_are_refused() {
        let (db, _home, _away) = seeded(1);
        let engine = PredictionEngine::new(db.clone());
        let fixture = Fixture {
            match_id: 1,
            kickoff: Utc::now(),
            status: MatchStatus::Finished,
            home_team_id: 1,
            home_team: "A".into(),
            home_logo: None,
            away_team_id: 2,
            away_team: "B".into(),
            away_logo: None,
        };
        assert!(matches!(
            engine.predict_fixture(&fixture),
            Err(ForecastError::AlreadyFinished(1))
        ));
        assert_eq!(engine.predict_match(1).unwrap(), None);
    }

    #[test]
    fn test_analysis_document_is_the_stored_text() {
        let (db, home, away) = seeded(5);
        let match_id = add_fixture(&db, home, away, 900);
        let engine = PredictionEngine::new(db.clone()).with_key_players(2);
        assert_eq!(engine.render_analysis_document(match_id).unwrap(), None);

        engine.run_prediction_pass().unwrap();
        let doc = engine.render_analysis_document(match_id).unwrap().unwrap();
        assert!(doc.starts_with("Match: Arsenal vs Chelsea"));
        assert!(doc.contains("AVAILABLE PLAYERS"));

        assert!(engine.discard_prediction(match_id).unwrap());
        assert_eq!(engine.render_analysis_document(match_id).unwrap(), None);
    }

    #[test]
    fn test_lookback_limits_the_form_window() {
        let (db, home, away) = seeded(8);
        let match_id = add_fixture(&db, home, away, 900);
        let engine = PredictionEngine::new(db.clone()).with_lookback(3);
        engine.run_prediction_pass().unwrap();
        let doc = engine.render_analysis_document(match_id).unwrap().unwrap();
        assert!(doc.contains("Arsenal form (last 3): W W W"));
    }
}
